//! Unsubscribe candidate extraction from message headers and bodies

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::error::UnsubError;
use crate::models::{CandidateKind, CandidateOrigin, Message, UnsubscribeCandidate};

/// Anchor elements in an HTML body: captures href and visible text
static ANCHOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
});

/// Unsubscribe-indicative tokens for body anchors
///
/// The `remove` token matches sender-removal links some bulk mailers use
/// instead of the word "unsubscribe".
static UNSUB_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(unsubscribe|opt[-_\s]?out|manage[-_\s]?preferences|update[-_\s]?subscription|remove)").unwrap()
});

/// Valid mail address, used for mailto: targets
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Inner markup stripped from anchor text before token matching
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Candidates extracted from one message
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<UnsubscribeCandidate>,
    /// Header tokens that failed URI validation and were dropped
    pub malformed: usize,
}

/// Extracts unsubscribe candidates from a message
///
/// Extraction never fails: malformed input yields zero candidates, and bad
/// header tokens are dropped and counted rather than aborting the message.
pub struct UnsubscribeExtractor;

impl UnsubscribeExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all unsubscribe candidates from one message
    ///
    /// Header candidates take strict priority: the HTML body is only
    /// scanned when no List-Unsubscribe target parses, which keeps
    /// promotional boilerplate links from shadowing the real mechanism.
    pub fn extract(&self, message: &Message) -> Extraction {
        let mut extraction = self.extract_from_headers(message);

        if extraction.candidates.is_empty() {
            extraction
                .candidates
                .extend(self.extract_from_body(message));
        }

        debug!(
            message_id = %message.id,
            candidates = extraction.candidates.len(),
            dropped = extraction.malformed,
            "extraction complete"
        );

        extraction
    }

    /// Parse List-Unsubscribe (and the RFC 8058 List-Unsubscribe-Post
    /// companion) into candidates
    fn extract_from_headers(&self, message: &Message) -> Extraction {
        let mut extraction = Extraction::default();

        // RFC 8058: the Post header alongside an HTTP target upgrades the
        // action to a fixed-body POST instead of a followed link
        let one_click = message.headers.contains("List-Unsubscribe-Post");

        for value in message.headers.get_all("List-Unsubscribe") {
            for token in tokenize_header_value(value) {
                match classify_target(&token, one_click) {
                    Ok((kind, target)) => {
                        extraction.candidates.push(UnsubscribeCandidate {
                            message_id: message.id.clone(),
                            kind,
                            target,
                            origin: CandidateOrigin::Header,
                        });
                    }
                    Err(e) => {
                        // Recovered locally: the token is dropped and
                        // counted, the message is still processed
                        debug!(message_id = %message.id, error = %e, "dropping header token");
                        extraction.malformed += 1;
                    }
                }
            }
        }

        extraction
    }

    /// Scan HTML body anchors for unsubscribe-looking links
    fn extract_from_body(&self, message: &Message) -> Vec<UnsubscribeCandidate> {
        let Some(html) = message.body_html.as_deref() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for capture in ANCHOR_PATTERN.captures_iter(html) {
            let href = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let text = capture.get(2).map(|m| m.as_str()).unwrap_or_default();
            let visible_text = TAG_PATTERN.replace_all(text, " ");

            if !UNSUB_TOKEN_PATTERN.is_match(href) && !UNSUB_TOKEN_PATTERN.is_match(&visible_text)
            {
                continue;
            }

            if !is_valid_http_url(href) {
                continue;
            }

            // The same link often appears several times in one message
            if !seen.insert(href.to_string()) {
                continue;
            }

            candidates.push(UnsubscribeCandidate {
                message_id: message.id.clone(),
                kind: CandidateKind::HttpGet,
                target: href.to_string(),
                origin: CandidateOrigin::BodyScan,
            });
        }

        candidates
    }
}

impl Default for UnsubscribeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a List-Unsubscribe header value into its comma-separated targets
///
/// Best-effort split-and-trim, not a grammar: angle brackets are stripped
/// when present, empty tokens are skipped, and anything left is handed to
/// URI validation. One bad token never fails the whole header.
fn tokenize_header_value(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| {
            token
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .trim()
                .to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Classify a header token as a mailto or HTTP candidate
///
/// Fails with a parse error for tokens that flunk basic URI validation.
fn classify_target(
    token: &str,
    one_click: bool,
) -> std::result::Result<(CandidateKind, String), UnsubError> {
    let lower = token.to_lowercase();

    if let Some(rest) = lower.strip_prefix("mailto:") {
        let address = rest.split('?').next().unwrap_or_default();
        if EMAIL_PATTERN.is_match(address) {
            // Preserve the original casing and query for the executor
            return Ok((CandidateKind::Mailto, token.to_string()));
        }
        return Err(UnsubError::Parse(format!("invalid mailto address: {}", token)));
    }

    if lower.starts_with("http://") || lower.starts_with("https://") {
        if is_valid_http_url(token) {
            let kind = if one_click {
                CandidateKind::HttpPostOneClick
            } else {
                CandidateKind::HttpGet
            };
            return Ok((kind, token.to_string()));
        }
        return Err(UnsubError::Parse(format!("invalid http target: {}", token)));
    }

    Err(UnsubError::Parse(format!(
        "unsupported unsubscribe target: {}",
        token
    )))
}

/// Check that a string parses as an absolute http(s) URL with a host
fn is_valid_http_url(candidate: &str) -> bool {
    match reqwest::Url::parse(candidate) {
        Ok(url) => {
            (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some()
        }
        Err(_) => false,
    }
}
