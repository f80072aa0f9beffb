//! Post-unsubscribe disposition of the originating messages

use tracing::{debug, info};

use crate::config::DispositionPolicy;
use crate::error::Result;
use crate::models::{AppliedDisposition, ExecutionOutcome};
use crate::store::MessageStore;

/// Applies the configured disposition to a group's messages
///
/// Disposition only ever follows a successful unsubscribe: a failed or
/// simulated attempt must not hide the original messages.
pub struct DispositionApplier<'a> {
    store: &'a dyn MessageStore,
    policy: DispositionPolicy,
}

impl<'a> DispositionApplier<'a> {
    pub fn new(store: &'a dyn MessageStore, policy: DispositionPolicy) -> Self {
        Self { store, policy }
    }

    /// Apply the policy to the group's messages, returning what was done
    ///
    /// A mailbox mutation failure surfaces as a collaborator error; the
    /// caller isolates it per group.
    pub async fn apply(
        &self,
        outcome: &ExecutionOutcome,
        message_ids: &[String],
    ) -> Result<AppliedDisposition> {
        if !outcome.is_success() {
            debug!(
                sender = %outcome.sender_key,
                outcome = outcome.kind.as_str(),
                "no disposition without a successful unsubscribe"
            );
            return Ok(AppliedDisposition::None);
        }

        match self.policy {
            DispositionPolicy::Keep => Ok(AppliedDisposition::None),
            DispositionPolicy::Trash => {
                self.store.trash(message_ids).await?;
                info!(
                    sender = %outcome.sender_key,
                    count = message_ids.len(),
                    "moved messages to trash"
                );
                Ok(AppliedDisposition::Trashed)
            }
            DispositionPolicy::Delete => {
                self.store.delete(message_ids).await?;
                info!(
                    sender = %outcome.sender_key,
                    count = message_ids.len(),
                    "permanently deleted messages"
                );
                Ok(AppliedDisposition::Deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnsubError;
    use crate::models::OutcomeKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        trashed: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        fail_mutations: bool,
    }

    #[async_trait]
    impl MessageStore for RecordingStore {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _id: &str) -> Result<crate::models::Message> {
            Err(UnsubError::collaborator("not implemented"))
        }

        async fn fetch_batch(
            &self,
            _ids: Vec<String>,
            _on_progress: crate::store::ProgressCallback,
        ) -> Result<Vec<crate::models::Message>> {
            Ok(Vec::new())
        }

        async fn trash(&self, ids: &[String]) -> Result<()> {
            if self.fail_mutations {
                return Err(UnsubError::collaborator("trash failed"));
            }
            self.trashed.lock().unwrap().extend_from_slice(ids);
            Ok(())
        }

        async fn delete(&self, ids: &[String]) -> Result<()> {
            if self.fail_mutations {
                return Err(UnsubError::collaborator("delete failed"));
            }
            self.deleted.lock().unwrap().extend_from_slice(ids);
            Ok(())
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
            Ok(())
        }
    }

    fn outcome(kind: OutcomeKind) -> ExecutionOutcome {
        ExecutionOutcome {
            sender_key: "promo@shop.com".to_string(),
            kind,
            action: "GET https://shop.com/u".to_string(),
            status: Some(200),
            error: None,
        }
    }

    fn ids() -> Vec<String> {
        vec!["m1".to_string(), "m2".to_string()]
    }

    #[tokio::test]
    async fn test_keep_policy_never_mutates() {
        let store = RecordingStore::default();
        let applier = DispositionApplier::new(&store, DispositionPolicy::Keep);

        let applied = applier.apply(&outcome(OutcomeKind::Success), &ids()).await.unwrap();

        assert_eq!(applied, AppliedDisposition::None);
        assert!(store.trashed.lock().unwrap().is_empty());
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trash_policy_on_success() {
        let store = RecordingStore::default();
        let applier = DispositionApplier::new(&store, DispositionPolicy::Trash);

        let applied = applier.apply(&outcome(OutcomeKind::Success), &ids()).await.unwrap();

        assert_eq!(applied, AppliedDisposition::Trashed);
        assert_eq!(*store.trashed.lock().unwrap(), ids());
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_policy_on_success() {
        let store = RecordingStore::default();
        let applier = DispositionApplier::new(&store, DispositionPolicy::Delete);

        let applied = applier.apply(&outcome(OutcomeKind::Success), &ids()).await.unwrap();

        assert_eq!(applied, AppliedDisposition::Deleted);
        assert_eq!(*store.deleted.lock().unwrap(), ids());
    }

    #[tokio::test]
    async fn test_no_disposition_for_failed_outcome() {
        let store = RecordingStore::default();
        let applier = DispositionApplier::new(&store, DispositionPolicy::Delete);

        let applied = applier.apply(&outcome(OutcomeKind::Failed), &ids()).await.unwrap();

        assert_eq!(applied, AppliedDisposition::None);
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_disposition_for_dry_run_outcome() {
        let store = RecordingStore::default();
        let applier = DispositionApplier::new(&store, DispositionPolicy::Trash);

        let applied = applier
            .apply(&outcome(OutcomeKind::SkippedDryRun), &ids())
            .await
            .unwrap();

        assert_eq!(applied, AppliedDisposition::None);
        assert!(store.trashed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_failure_surfaces_as_error() {
        let store = RecordingStore {
            fail_mutations: true,
            ..Default::default()
        };
        let applier = DispositionApplier::new(&store, DispositionPolicy::Trash);

        let result = applier.apply(&outcome(OutcomeKind::Success), &ids()).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("trash failed"));
    }
}
