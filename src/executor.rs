//! Unsubscribe execution with dry-run safety and bounded retry

use tracing::{debug, warn};

use crate::config::{ExecutionMode, HttpConfig};
use crate::error::Result;
use crate::models::{CandidateKind, ExecutionOutcome, OutcomeKind, SenderGroup};
use crate::store::MessageStore;

/// Fixed request body mandated by RFC 8058 for one-click unsubscribes
const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";

/// Browser-like User-Agent; some unsubscribe endpoints reject obvious bots
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const DEFAULT_MAIL_SUBJECT: &str = "unsubscribe";
const DEFAULT_MAIL_BODY: &str = "Please remove this address from your mailing list.";

/// Result of one outward attempt, before the retry decision
struct AttemptError {
    status: Option<u16>,
    message: String,
    transient: bool,
}

/// Executes a sender group's representative action
///
/// In dry-run mode no network or mail side effect ever happens. In live
/// mode each group gets exactly one outward action, retried at most once
/// and only on transient failure; a 4xx answer is a definitive rejection.
pub struct UnsubscribeExecutor<'a> {
    http: reqwest::Client,
    store: &'a dyn MessageStore,
    mode: ExecutionMode,
}

impl<'a> UnsubscribeExecutor<'a> {
    pub fn new(
        store: &'a dyn MessageStore,
        mode: ExecutionMode,
        http_config: &HttpConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(http_config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(http_config.max_redirects))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { http, store, mode })
    }

    /// Execute one group's representative action and report the outcome
    ///
    /// Never returns an error: failures are data, captured in the outcome
    /// so one bad endpoint cannot abort the remaining groups.
    pub async fn execute(&self, group: &SenderGroup) -> ExecutionOutcome {
        let candidate = &group.representative;
        let action = describe_action(candidate.kind, &candidate.target);

        if self.mode == ExecutionMode::DryRun {
            debug!(sender = %group.sender_key, action = %action, "dry run, skipping");
            return ExecutionOutcome {
                sender_key: group.sender_key.clone(),
                kind: OutcomeKind::SkippedDryRun,
                action,
                status: None,
                error: None,
            };
        }

        let result = match candidate.kind {
            CandidateKind::HttpPostOneClick | CandidateKind::HttpGet => {
                self.http_with_retry(candidate.kind, &candidate.target).await
            }
            CandidateKind::Mailto => self.send_with_retry(&candidate.target).await,
        };

        match result {
            Ok(status) => {
                debug!(sender = %group.sender_key, action = %action, "unsubscribe succeeded");
                ExecutionOutcome {
                    sender_key: group.sender_key.clone(),
                    kind: OutcomeKind::Success,
                    action,
                    status,
                    error: None,
                }
            }
            Err(attempt) => {
                warn!(
                    sender = %group.sender_key,
                    action = %action,
                    error = %attempt.message,
                    "unsubscribe failed"
                );
                ExecutionOutcome {
                    sender_key: group.sender_key.clone(),
                    kind: OutcomeKind::Failed,
                    action,
                    status: attempt.status,
                    error: Some(attempt.message),
                }
            }
        }
    }

    /// Issue the HTTP action, retrying once on transient failure
    async fn http_with_retry(
        &self,
        kind: CandidateKind,
        target: &str,
    ) -> std::result::Result<Option<u16>, AttemptError> {
        match self.http_attempt(kind, target).await {
            Ok(status) => Ok(status),
            Err(attempt) if attempt.transient => {
                warn!(url = %target, error = %attempt.message, "transient failure, retrying once");
                self.http_attempt(kind, target).await
            }
            Err(attempt) => Err(attempt),
        }
    }

    async fn http_attempt(
        &self,
        kind: CandidateKind,
        target: &str,
    ) -> std::result::Result<Option<u16>, AttemptError> {
        let request = match kind {
            CandidateKind::HttpPostOneClick => self
                .http
                .post(target)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(ONE_CLICK_BODY),
            _ => self.http.get(target),
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    Ok(Some(status.as_u16()))
                } else {
                    Err(AttemptError {
                        status: Some(status.as_u16()),
                        message: format!("HTTP {}", status.as_u16()),
                        // 5xx resolves on its own; 4xx is a definitive answer
                        transient: status.is_server_error(),
                    })
                }
            }
            Err(e) => Err(AttemptError {
                status: None,
                message: e.to_string(),
                transient: e.is_timeout() || e.is_connect(),
            }),
        }
    }

    /// Compose and send the mailto unsubscribe from the user's own account
    async fn send_with_retry(
        &self,
        target: &str,
    ) -> std::result::Result<Option<u16>, AttemptError> {
        let (address, subject, body) = match parse_mailto(target) {
            Some(parts) => parts,
            None => {
                return Err(AttemptError {
                    status: None,
                    message: format!("unparseable mailto target: {}", target),
                    transient: false,
                })
            }
        };

        match self.store.send(&address, &subject, &body).await {
            Ok(()) => Ok(None),
            Err(e) if e.is_transient() => {
                warn!(to = %address, error = %e, "transient send failure, retrying once");
                self.store
                    .send(&address, &subject, &body)
                    .await
                    .map(|_| None)
                    .map_err(|e| AttemptError {
                        status: None,
                        message: e.to_string(),
                        transient: true,
                    })
            }
            Err(e) => Err(AttemptError {
                status: None,
                message: e.to_string(),
                transient: false,
            }),
        }
    }
}

/// Human-readable method + target, used for dry-run annotation and the report
pub fn describe_action(kind: CandidateKind, target: &str) -> String {
    match kind {
        CandidateKind::HttpPostOneClick => format!("POST {}", target),
        CandidateKind::HttpGet => format!("GET {}", target),
        CandidateKind::Mailto => format!("SEND {}", target),
    }
}

/// Split a mailto: target into address, subject and body
///
/// Honors `subject` and `body` query parameters (percent-decoded); anything
/// else in the query is ignored.
pub fn parse_mailto(target: &str) -> Option<(String, String, String)> {
    let url = reqwest::Url::parse(target).ok()?;
    if url.scheme() != "mailto" {
        return None;
    }

    let address = url.path().to_string();
    if address.is_empty() || !address.contains('@') {
        return None;
    }

    let mut subject = DEFAULT_MAIL_SUBJECT.to_string();
    let mut body = DEFAULT_MAIL_BODY.to_string();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "subject" => subject = value.into_owned(),
            "body" => body = value.into_owned(),
            _ => {}
        }
    }

    Some((address, subject, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnsubError;
    use crate::models::{CandidateOrigin, UnsubscribeCandidate};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store stub that counts send calls and panics on mailbox mutation
    #[derive(Default)]
    struct StubStore {
        send_calls: AtomicUsize,
        fail_sends: usize,
        fail_transient: bool,
    }

    #[async_trait]
    impl crate::store::MessageStore for StubStore {
        async fn search(&self, _query: &str, _max: usize) -> crate::error::Result<Vec<String>> {
            panic!("search must not be called by the executor");
        }

        async fn fetch(&self, _id: &str) -> crate::error::Result<crate::models::Message> {
            panic!("fetch must not be called by the executor");
        }

        async fn fetch_batch(
            &self,
            _ids: Vec<String>,
            _on_progress: crate::store::ProgressCallback,
        ) -> crate::error::Result<Vec<crate::models::Message>> {
            panic!("fetch_batch must not be called by the executor");
        }

        async fn trash(&self, _ids: &[String]) -> crate::error::Result<()> {
            panic!("trash must not be called by the executor");
        }

        async fn delete(&self, _ids: &[String]) -> crate::error::Result<()> {
            panic!("delete must not be called by the executor");
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> crate::error::Result<()> {
            let call = self.send_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_sends {
                if self.fail_transient {
                    Err(UnsubError::Collaborator {
                        message: "HTTP 503: Service Unavailable".to_string(),
                        transient: true,
                    })
                } else {
                    Err(UnsubError::collaborator("invalid recipient"))
                }
            } else {
                Ok(())
            }
        }
    }

    fn group_with(kind: CandidateKind, target: &str) -> SenderGroup {
        SenderGroup {
            sender_key: "promo@shop.com".to_string(),
            sender_name: "Shop".to_string(),
            representative: UnsubscribeCandidate {
                message_id: "m1".to_string(),
                kind,
                target: target.to_string(),
                origin: CandidateOrigin::Header,
            },
            message_ids: vec!["m1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_dry_run_skips_http_without_any_side_effect() {
        let store = StubStore::default();
        let executor = UnsubscribeExecutor::new(
            &store,
            ExecutionMode::DryRun,
            &HttpConfig::default(),
        )
        .unwrap();

        let group = group_with(CandidateKind::HttpPostOneClick, "https://shop.com/u");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::SkippedDryRun);
        assert_eq!(outcome.action, "POST https://shop.com/u");
        assert_eq!(outcome.status, None);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_skips_mailto_without_sending() {
        let store = StubStore::default();
        let executor =
            UnsubscribeExecutor::new(&store, ExecutionMode::DryRun, &HttpConfig::default())
                .unwrap();

        let group = group_with(CandidateKind::Mailto, "mailto:out@shop.com");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::SkippedDryRun);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_mailto_sends_once() {
        let store = StubStore::default();
        let executor =
            UnsubscribeExecutor::new(&store, ExecutionMode::Live, &HttpConfig::default())
                .unwrap();

        let group = group_with(CandidateKind::Mailto, "mailto:out@shop.com");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_mailto_retries_transient_send_once() {
        let store = StubStore {
            fail_sends: 1,
            fail_transient: true,
            ..Default::default()
        };
        let executor =
            UnsubscribeExecutor::new(&store, ExecutionMode::Live, &HttpConfig::default())
                .unwrap();

        let group = group_with(CandidateKind::Mailto, "mailto:out@shop.com");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_live_mailto_permanent_failure_not_retried() {
        let store = StubStore {
            fail_sends: usize::MAX,
            fail_transient: false,
            ..Default::default()
        };
        let executor =
            UnsubscribeExecutor::new(&store, ExecutionMode::Live, &HttpConfig::default())
                .unwrap();

        let group = group_with(CandidateKind::Mailto, "mailto:out@shop.com");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.error.as_deref().unwrap().contains("invalid recipient"));
    }

    #[tokio::test]
    async fn test_live_unparseable_mailto_fails_cleanly() {
        let store = StubStore::default();
        let executor =
            UnsubscribeExecutor::new(&store, ExecutionMode::Live, &HttpConfig::default())
                .unwrap();

        let group = group_with(CandidateKind::Mailto, "mailto:?");
        let outcome = executor.execute(&group).await;

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(store.send_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parse_mailto_plain_address() {
        let (address, subject, body) = parse_mailto("mailto:out@shop.com").unwrap();
        assert_eq!(address, "out@shop.com");
        assert_eq!(subject, DEFAULT_MAIL_SUBJECT);
        assert_eq!(body, DEFAULT_MAIL_BODY);
    }

    #[test]
    fn test_parse_mailto_with_query_overrides() {
        let (address, subject, body) =
            parse_mailto("mailto:out@shop.com?subject=Stop%20mail&body=now").unwrap();
        assert_eq!(address, "out@shop.com");
        assert_eq!(subject, "Stop mail");
        assert_eq!(body, "now");
    }

    #[test]
    fn test_parse_mailto_rejects_non_mailto() {
        assert!(parse_mailto("https://shop.com/u").is_none());
        assert!(parse_mailto("mailto:").is_none());
    }

    #[test]
    fn test_describe_action() {
        assert_eq!(
            describe_action(CandidateKind::HttpGet, "https://x.com/u"),
            "GET https://x.com/u"
        );
        assert_eq!(
            describe_action(CandidateKind::Mailto, "mailto:a@x.com"),
            "SEND mailto:a@x.com"
        );
    }
}
