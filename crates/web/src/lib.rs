//! Layers 2 and 3: HTTP fingerprinting and directory probing
//!
//! Both layers share the same client discipline: no redirect following, no
//! certificate verification, per-operation deadlines from the config, and
//! 4xx/5xx treated as data rather than failures.

mod dir_prober;
mod http_detector;
pub mod rules;

pub use dir_prober::DirectoryProber;
pub use http_detector::HttpFingerprinter;

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use trishula_common::{ScanConfig, ScanError};

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

const TITLE_MAX_CHARS: usize = 200;

/// Broad accept header sent with every probe.
const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// First `<title>` of an HTML body, whitespace-collapsed and capped.
pub(crate) fn extract_title(body: &str) -> Option<String> {
    let caps = TITLE_RE.captures(body)?;
    let title = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(TITLE_MAX_CHARS).collect())
}

/// Probe client: redirects reported rather than chased, certificates never
/// verified.
pub(crate) fn build_client(
    config: &Arc<ScanConfig>,
    timeout: Duration,
) -> Result<reqwest::Client, ScanError> {
    reqwest::Client::builder()
        .user_agent(config.http_user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| ScanError::Internal(format!("http client construction: {e}")))
}

/// Tolerant Content-Length parse: garbage is treated as absent.
pub(crate) fn content_length_of(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_extraction_collapses_whitespace() {
        let body = "<html><head><TITLE>\n  Admin \t Console\n</TITLE></head></html>";
        assert_eq!(extract_title(body).as_deref(), Some("Admin Console"));
    }

    #[test]
    fn title_spans_lines_and_is_capped() {
        let long = format!("<title>{}</title>", "word ".repeat(200));
        let title = extract_title(&long).unwrap();
        assert!(title.chars().count() <= 200);
    }

    #[test]
    fn missing_or_empty_title_is_none() {
        assert!(extract_title("<html><body>no title</body></html>").is_none());
        assert!(extract_title("<title>   </title>").is_none());
    }
}
