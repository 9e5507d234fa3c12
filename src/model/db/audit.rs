use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime},
    options::FindOptions,
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        election::{CandidateId, ElectionId},
        voter::VoterId,
    },
    mongodb::{is_duplicate_key_error, Coll},
};
use crate::vote::{
    audit::AuditSink,
    hasher::{UniquenessSalt, VoteHash},
    store::StoreError,
};

/// The only ledger action this system performs.
pub const STORE_VOTE_ACTION: &str = "storeVote";

/// Identifies one ledger attempt: the cast request it belongs to, and its
/// attempt number within that request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new(request: &ObjectId, attempt: u32) -> Self {
        Self(format!("{}-{attempt}", request.to_hex()))
    }
}

impl Display for AttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a single ledger attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Anchored and persisted.
    Committed,
    /// The ledger could not be reached to submit.
    SubmitFailed { reason: String },
    /// Submitted, but no confirmation arrived in time. May still land.
    ConfirmTimedOut { reason: String },
    /// The ledger refused the submission or the transaction reverted.
    Rejected { reason: String },
    /// Anchored, but a vote already existed for the pair.
    DuplicateAfterConfirm,
    /// Anchored, but the vote could not be persisted.
    PersistenceFailed { reason: String },
    /// Anchored, but it is unknown whether the vote was persisted.
    PersistenceUnknown { reason: String },
}

impl AttemptOutcome {
    /// Did the ledger confirm this attempt's transaction?
    pub fn ledger_confirmed(&self) -> bool {
        matches!(
            self,
            Self::Committed
                | Self::DuplicateAfterConfirm
                | Self::PersistenceFailed { .. }
                | Self::PersistenceUnknown { .. }
        )
    }

    /// Does this outcome leave the ledger and the vote store disagreeing?
    pub fn needs_reconciliation(&self) -> bool {
        self.ledger_confirmed() && *self != Self::Committed
    }
}

/// Everything needed to recompute and trace the anchored hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPayload {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub vote_hash: VoteHash,
    pub salt: UniquenessSalt,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// An append-only record of one ledger interaction. Never modified or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Appends are keyed by attempt, so replaying one is harmless.
    #[serde(rename = "_id")]
    pub attempt_id: AttemptId,
    pub action: String,
    /// Ledger transaction, if the attempt got far enough to have one.
    pub tx_hash: Option<String>,
    pub payload: AttemptPayload,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn store_vote(
        attempt_id: AttemptId,
        tx_hash: Option<String>,
        payload: AttemptPayload,
    ) -> Self {
        Self {
            attempt_id,
            action: STORE_VOTE_ACTION.to_string(),
            tx_hash,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[rocket::async_trait]
impl AuditSink for Database {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        match Coll::<AuditLogEntry>::from_db(self)
            .insert_one(entry, None)
            .await
        {
            Ok(_) => Ok(()),
            // Already recorded.
            Err(err) if is_duplicate_key_error(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn entries_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "timestamp": 1 }).build();
        let entries = Coll::<AuditLogEntry>::from_db(self)
            .find(doc! { "payload.election_id": election_id }, options)
            .await?
            .try_collect()
            .await?;
        Ok(entries)
    }
}
