use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Bounded exponential backoff for transient chat-completions failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Whether a failed response deserves another attempt.
    ///
    /// Auth and missing-model statuses never do. Other statuses retry when
    /// they are transient or the body reads like overload or rate limiting.
    pub fn should_retry_status(&self, status: u16, body: &str) -> bool {
        match status {
            401 | 403 | 404 | 422 => false,
            408 | 429 | 500..=599 => true,
            _ => transient_body_pattern().is_match(body),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

fn transient_body_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused")
            .expect("retry regex must compile")
    })
}
