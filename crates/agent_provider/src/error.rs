use std::fmt;

/// Coarse category of a model-call failure, used for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Authentication,
    RateLimit,
    ModelNotFound,
    Timeout,
    Network,
    Other,
}

impl ProviderErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::ModelNotFound => "model_not_found",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Other => "other",
        }
    }
}

/// Failure raised by a provider while opening or consuming a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds an error whose kind is inferred from the message text.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_message(&message);
        Self { kind, message }
    }

    #[must_use]
    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Human-readable one-liner suitable for the console.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind {
            ProviderErrorKind::Authentication => {
                "Authentication error: your API key is invalid or missing.".to_string()
            }
            ProviderErrorKind::RateLimit => {
                "Rate limit error: provider is throttling you. Try again later or switch models."
                    .to_string()
            }
            ProviderErrorKind::ModelNotFound => {
                "Model not found: check the configured model name.".to_string()
            }
            ProviderErrorKind::Timeout => {
                "Request timed out: increase the request timeout or try again.".to_string()
            }
            ProviderErrorKind::Network => {
                format!("Network error: could not reach the model provider ({})", self.message)
            }
            ProviderErrorKind::Other => format!("Model request failed: {}", self.message),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ProviderError {}

fn classify_message(message: &str) -> ProviderErrorKind {
    let lowered = message.to_ascii_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    if contains_any(&[
        "authentication",
        "unauthorized",
        "api key not valid",
        "api_key_invalid",
        "invalid api key",
        "401",
    ]) {
        ProviderErrorKind::Authentication
    } else if contains_any(&["rate limit", "ratelimit", "rate_limit", "resource_exhausted", "429"]) {
        ProviderErrorKind::RateLimit
    } else if contains_any(&["model not found", "model_not_found", "notfounderror"]) {
        ProviderErrorKind::ModelNotFound
    } else if contains_any(&["timeout", "timed out"]) {
        ProviderErrorKind::Timeout
    } else if contains_any(&["connection", "dns", "network", "unreachable"]) {
        ProviderErrorKind::Network
    } else {
        ProviderErrorKind::Other
    }
}
