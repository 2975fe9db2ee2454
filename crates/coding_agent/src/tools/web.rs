use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde_json::{json, Value};
use url::{Host, Url};

use super::{cap_chars, ToolArgs, ToolContext, ToolError, ToolSchema, ToolSpec};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_SEARCH_RESULTS: u64 = 5;
const MAX_SEARCH_RESULTS: u64 = 10;
const DEFAULT_FETCH_MAX_CHARS: u64 = 8000;
const DEFAULT_FETCH_TIMEOUT_SECS: f64 = 20.0;
const MAX_FETCH_TIMEOUT_SECS: f64 = 300.0;
const MAX_REDIRECTS: usize = 5;
const TRUNCATION_MARKER: &str = "\n...[truncated]...";

pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "web_search",
            description: "Search the web and return result titles, URLs, and snippets.",
            mutating: false,
            schema: ToolSchema::object()
                .string("query", "Search query.")
                .integer("max_results", "Maximum number of results (1-10).")
                .default_value(json!(DEFAULT_SEARCH_RESULTS))
                .required(&["query"]),
            handler: web_search,
        },
        ToolSpec {
            name: "web_fetch",
            description: "Fetch a web page over http(s) and return its readable text content.",
            mutating: false,
            schema: ToolSchema::object()
                .string("url", "Absolute http(s) URL to fetch.")
                .integer("max_chars", "Maximum characters of text to return.")
                .default_value(json!(DEFAULT_FETCH_MAX_CHARS))
                .minimum(200)
                .number("timeout_seconds", "Request timeout in seconds.")
                .default_value(json!(DEFAULT_FETCH_TIMEOUT_SECS))
                .required(&["url"]),
            handler: web_fetch,
        },
    ]
}

fn user_agent() -> String {
    format!("coding-agent/{}", env!("CARGO_PKG_VERSION"))
}

fn web_search(_ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let query = args.required_str("query")?.trim();
    let max_results = args
        .u64_or("max_results", DEFAULT_SEARCH_RESULTS)
        .clamp(1, MAX_SEARCH_RESULTS);

    let client = Client::builder()
        .user_agent(user_agent())
        .timeout(Duration::from_secs_f64(DEFAULT_FETCH_TIMEOUT_SECS))
        .build()
        .map_err(network_error)?;
    let body = client
        .get(SEARCH_ENDPOINT)
        .query(&[("q", query)])
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(network_error)?;

    let limit = usize::try_from(max_results).unwrap_or(usize::MAX);
    let results: Vec<Value> = parse_search_results(&body)
        .into_iter()
        .take(limit)
        .map(|hit| json!({"title": hit.title, "url": hit.url, "snippet": hit.snippet}))
        .collect();

    Ok(json!({ "query": query, "results": results }))
}

fn web_fetch(_ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let raw_url = args.required_str("url")?.trim();
    let max_chars = usize::try_from(args.u64_or("max_chars", DEFAULT_FETCH_MAX_CHARS))
        .unwrap_or(usize::MAX);
    let timeout = args
        .f64("timeout_seconds")
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
        .min(MAX_FETCH_TIMEOUT_SECS);

    let url = Url::parse(raw_url)
        .map_err(|error| ToolError::Validation(format!("Invalid URL {raw_url}: {error}")))?;
    check_fetch_target(&url).map_err(ToolError::Validation)?;

    let client = Client::builder()
        .user_agent(user_agent())
        .timeout(Duration::from_secs_f64(timeout))
        .redirect(redirect_policy())
        .build()
        .map_err(network_error)?;
    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(network_error)?;

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().map_err(network_error)?;

    let text = if content_type.contains("html") || looks_like_html(&body) {
        html_to_text(&body)
    } else {
        clean_text(&body)
    };

    Ok(json!({
        "url": final_url,
        "content_type": content_type,
        "text": cap_chars(&text, max_chars, TRUNCATION_MARKER),
    }))
}

fn network_error(error: reqwest::Error) -> ToolError {
    if error.is_timeout() {
        ToolError::Timeout(format!("Request timed out: {error}"))
    } else {
        ToolError::Network(error.to_string())
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("too many redirects (>{MAX_REDIRECTS})"));
        }
        match check_fetch_target(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(reason) => attempt.error(reason),
        }
    })
}

/// Refuses non-http(s) schemes and hosts that point back into the local network.
///
/// Hostnames are judged by name only; no DNS lookup happens here.
pub(crate) fn check_fetch_target(url: &Url) -> Result<(), String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "Only http and https URLs are allowed; got {}",
            url.scheme()
        ));
    }

    let blocked = match url.host() {
        None => return Err(format!("URL has no host: {url}")),
        Some(Host::Domain(domain)) => is_blocked_domain(domain),
        Some(Host::Ipv4(address)) => is_blocked_ipv4(address),
        Some(Host::Ipv6(address)) => is_blocked_ipv6(address),
    };
    if blocked {
        return Err(format!("Refusing to fetch local or private address: {url}"));
    }
    Ok(())
}

fn is_blocked_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost"
        || domain.ends_with(".localhost")
        || domain.ends_with(".local")
        || domain.ends_with(".internal")
}

fn is_blocked_ipv4(address: Ipv4Addr) -> bool {
    address.is_loopback()
        || address.is_private()
        || address.is_link_local()
        || address.is_unspecified()
        || address.is_broadcast()
}

fn is_blocked_ipv6(address: Ipv6Addr) -> bool {
    if let Some(mapped) = address.to_ipv4_mapped() {
        return is_blocked_ipv4(mapped);
    }
    let first = address.segments()[0];
    address.is_loopback()
        || address.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

fn result_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
            .expect("valid result link regex")
    })
}

fn result_snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|div|td)>"#)
            .expect("valid result snippet regex")
    })
}

fn parse_search_results(html: &str) -> Vec<SearchHit> {
    let snippets: Vec<String> = result_snippet_re()
        .captures_iter(html)
        .map(|captures| inline_text(&captures[1]))
        .collect();

    result_link_re()
        .captures_iter(html)
        .enumerate()
        .filter_map(|(index, captures)| {
            let url = decode_result_url(&decode_entities(&captures[1]))?;
            Some(SearchHit {
                title: inline_text(&captures[2]),
                url,
                snippet: snippets.get(index).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Unwraps DuckDuckGo's `/l/?uddg=<target>` redirect links.
fn decode_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    if let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "uddg") {
        return Some(target.into_owned());
    }
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"))
}

fn dropped_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(script|style|noscript|nav|footer|header|aside)\b[^>]*>.*?</(script|style|noscript|nav|footer|header|aside)>",
        )
        .expect("valid dropped block regex")
    })
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)<\s*(br|/p|/div|/li|/tr|/h[1-6]|/section|/article|/pre|/blockquote|/table)\b[^>]*>",
        )
        .expect("valid block break regex")
    })
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"))
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(512).collect::<String>().to_ascii_lowercase();
    head.contains("<html") || head.contains("<!doctype html")
}

/// Reduces an HTML document to readable plain text.
pub(crate) fn html_to_text(html: &str) -> String {
    let text = comment_re().replace_all(html, "");
    let text = dropped_block_re().replace_all(&text, "");
    let text = block_break_re().replace_all(&text, "\n");
    let text = tag_re().replace_all(&text, "");
    clean_text(&decode_entities(&text))
}

fn inline_text(fragment: &str) -> String {
    let text = tag_re().replace_all(fragment, "");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses horizontal whitespace per line and squeezes blank-line runs.
fn clean_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 || lines.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(collapsed);
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> Result<(), String> {
        check_fetch_target(&Url::parse(url).expect("url"))
    }

    #[test]
    fn fetch_target_rejects_local_and_non_http_urls() {
        assert!(target("https://example.com/page").is_ok());
        assert!(target("http://93.184.216.34/").is_ok());

        for blocked in [
            "ftp://example.com/",
            "file:///etc/passwd",
            "http://localhost:8080/",
            "http://api.localhost/",
            "http://printer.local/",
            "http://metadata.internal/",
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://192.168.0.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/",
            "http://[::1]/",
            "http://[fe80::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:127.0.0.1]/",
        ] {
            assert!(target(blocked).is_err(), "{blocked} should be refused");
        }
    }

    #[test]
    fn html_is_reduced_to_readable_text() {
        let html = "<html><head><style>body{}</style><script>var x = 1;</script></head>\
                    <body><nav>menu</nav><h1>Title</h1><p>Fish &amp; chips&nbsp;today</p>\
                    <!-- hidden --><p>Second   paragraph</p><footer>foot</footer></body></html>";

        assert_eq!(html_to_text(html), "Title\nFish & chips today\nSecond paragraph");
    }

    #[test]
    fn entities_decode_named_and_numeric_forms() {
        assert_eq!(decode_entities("a &lt;b&gt; &#39;c&#x27; &bogus; &"), "a <b> 'c' &bogus; &");
    }

    #[test]
    fn search_results_unwrap_redirect_links() {
        let html = r#"
            <div class="result">
              <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">The <b>Rust</b> Language</a>
              <a class="result__snippet" href="x">A language empowering <b>everyone</b>.</a>
            </div>
            <div class="result">
              <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
              <a class="result__snippet" href="y">Learn Rust.</a>
            </div>"#;

        let hits = parse_search_results(html);

        assert_eq!(
            hits,
            vec![
                SearchHit {
                    title: "The Rust Language".to_string(),
                    url: "https://www.rust-lang.org/".to_string(),
                    snippet: "A language empowering everyone.".to_string(),
                },
                SearchHit {
                    title: "The Book".to_string(),
                    url: "https://doc.rust-lang.org/book/".to_string(),
                    snippet: "Learn Rust.".to_string(),
                },
            ]
        );
    }
}
