use std::sync::Arc;

use log::{debug, error, warn};

use crate::model::{common::election::ElectionId, db::audit::AuditLogEntry};

use super::store::StoreError;

/// Append-only storage for ledger interaction records.
#[rocket::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an entry. Appending an entry whose attempt ID is already present
    /// succeeds without writing anything.
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// All entries for an election, oldest first.
    async fn entries_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// Records every ledger attempt. A failed append never changes the outcome of
/// the cast that produced it.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append `entry`, returning whether it was recorded.
    pub async fn record(&self, entry: AuditLogEntry) -> bool {
        match self.sink.append(&entry).await {
            Ok(()) => {
                debug!(
                    "Audited attempt {} for voter {}: {:?}",
                    entry.attempt_id, entry.payload.voter_id, entry.payload.outcome
                );
                true
            }
            Err(e) if entry.payload.outcome.needs_reconciliation() => {
                error!(
                    "Failed to audit attempt {} (tx {:?}, hash {}), which needs reconciliation: {e}",
                    entry.attempt_id, entry.tx_hash, entry.payload.vote_hash
                );
                false
            }
            Err(e) => {
                warn!(
                    "Failed to audit attempt {} (tx {:?}): {e}",
                    entry.attempt_id, entry.tx_hash
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::oid::ObjectId;

    use crate::model::db::audit::{AttemptId, AttemptOutcome, AttemptPayload};
    use crate::vote::{
        hasher::{hash_vote, UniquenessSalt},
        memory::MemoryStore,
    };

    fn entry(request: &ObjectId, attempt: u32) -> AuditLogEntry {
        let salt = UniquenessSalt::generate();
        let payload = AttemptPayload {
            voter_id: 1,
            election_id: 10,
            candidate_id: 100,
            vote_hash: hash_vote(1, 100, 10, &salt),
            salt,
            attempt,
            outcome: AttemptOutcome::Committed,
        };
        AuditLogEntry::store_vote(
            AttemptId::new(request, attempt),
            Some("0x01".to_string()),
            payload,
        )
    }

    #[rocket::async_test]
    async fn appends_are_idempotent_per_attempt() {
        let store = Arc::new(MemoryStore::seeded());
        let log = AuditLog::new(store.clone());
        let request = ObjectId::new();

        let first = entry(&request, 1);
        assert!(log.record(first.clone()).await);
        assert!(log.record(first).await);
        assert!(log.record(entry(&request, 2)).await);

        let entries = store.entries_for_election(10).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[rocket::async_test]
    async fn failed_append_is_reported_not_raised() {
        let store = Arc::new(MemoryStore::seeded());
        store.fail_audit_appends(true);
        let log = AuditLog::new(store.clone());

        assert!(!log.record(entry(&ObjectId::new(), 1)).await);
        assert!(store.entries_for_election(10).await.unwrap().is_empty());
    }
}
