use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Case-insensitive header multi-map
///
/// Header names are folded to lowercase on insert; a name may carry more
/// than one value (e.g. repeated List-Unsubscribe headers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Headers {
    entries: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for a header name, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    /// All values for a header name (empty slice when absent)
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_lowercase())
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }
}

impl Headers {
    /// Build a header map from (name, value) pairs
    pub fn from_pairs<S, V, I>(pairs: I) -> Self
    where
        S: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (S, V)>,
    {
        let mut headers = Headers::new();
        for (name, value) in pairs {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// One mailbox message as fetched for a single run
///
/// Immutable after fetch; owned by the pipeline for the run's duration and
/// discarded afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub headers: Headers,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// How an unsubscribe action is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateKind {
    /// GET request to an http(s) URL
    HttpGet,
    /// RFC 8058 one-click: fixed-body POST to an http(s) URL
    HttpPostOneClick,
    /// Mail composed and sent to an address
    Mailto,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::HttpGet => "http-get",
            CandidateKind::HttpPostOneClick => "http-post-one-click",
            CandidateKind::Mailto => "mailto",
        }
    }
}

/// Where a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateOrigin {
    /// List-Unsubscribe / List-Unsubscribe-Post headers
    Header,
    /// Anchor elements in the HTML body
    BodyScan,
}

/// A single extracted unsubscribe action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeCandidate {
    pub message_id: String,
    pub kind: CandidateKind,
    pub target: String,
    pub origin: CandidateOrigin,
}

impl UnsubscribeCandidate {
    /// Preference rank for representative selection
    ///
    /// One-click POST beats header GET beats body-scan GET beats mailto.
    /// Explicit rank function rather than ordering on the enums themselves:
    /// the rank mixes kind and origin.
    pub fn rank(&self) -> u8 {
        match (self.kind, self.origin) {
            (CandidateKind::HttpPostOneClick, _) => 3,
            (CandidateKind::HttpGet, CandidateOrigin::Header) => 2,
            (CandidateKind::HttpGet, CandidateOrigin::BodyScan) => 1,
            (CandidateKind::Mailto, _) => 0,
        }
    }
}

/// All messages from one sender, with the single action chosen for them
///
/// Invariant: exactly one representative candidate per group, and every
/// member message id maps to the same sender key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderGroup {
    pub sender_key: String,
    pub sender_name: String,
    pub representative: UnsubscribeCandidate,
    pub message_ids: Vec<String>,
}

/// Result kind of one group's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Success,
    Failed,
    SkippedDryRun,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failed => "failed",
            OutcomeKind::SkippedDryRun => "skipped-dry-run",
        }
    }
}

/// Outcome of executing one sender group's representative action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub sender_key: String,
    pub kind: OutcomeKind,
    /// Human-readable method + target that was (or would have been) sent
    pub action: String,
    /// Terminal HTTP status, when the action was an HTTP request
    pub status: Option<u16>,
    /// Error detail for failed outcomes
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// What actually happened to a group's messages after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppliedDisposition {
    None,
    Trashed,
    Deleted,
}

impl AppliedDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppliedDisposition::None => "none",
            AppliedDisposition::Trashed => "trashed",
            AppliedDisposition::Deleted => "deleted",
        }
    }
}
