//! The ledger that anchors vote hashes, and the client that bounds every
//! interaction with it.

use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::time::timeout;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hasher::VoteHash;

/// Handle on a submitted but not yet confirmed ledger write (a transaction hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingHandle(pub String);

/// Where a confirmed vote hash lives on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReference {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// The answer to a confirmation wait. A timeout says nothing about whether the
/// write eventually lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(LedgerReference),
    TimedOut,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Ledger unreachable: {0}")]
    Unavailable(String),
    #[error("Ledger refused submission: {0}")]
    Rejected(String),
}

/// An external append-only store exposing `storeVote(hash)`.
#[rocket::async_trait]
pub trait Ledger: Send + Sync {
    async fn submit(&self, hash: &VoteHash) -> Result<PendingHandle, SubmitError>;

    async fn confirm(&self, handle: &PendingHandle, timeout: Duration) -> Confirmation;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transient; `pending` is set if a submission may still confirm.
    #[error("Ledger unavailable: {reason}")]
    Unavailable {
        reason: String,
        pending: Option<PendingHandle>,
    },
    /// Terminal; the ledger actively refused.
    #[error("Ledger rejected submission: {reason}")]
    Rejected {
        reason: String,
        pending: Option<PendingHandle>,
    },
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn pending(&self) -> Option<&PendingHandle> {
        match self {
            Self::Unavailable { pending, .. } | Self::Rejected { pending, .. } => pending.as_ref(),
        }
    }
}

/// Wraps a [`Ledger`] so that neither phase can hang: submission and the
/// confirmation wait each run under their own deadline.
#[derive(Clone)]
pub struct LedgerClient {
    ledger: Arc<dyn Ledger>,
    submit_timeout: Duration,
    confirm_timeout: Duration,
}

impl LedgerClient {
    pub fn new(ledger: Arc<dyn Ledger>, submit_timeout: Duration, confirm_timeout: Duration) -> Self {
        Self {
            ledger,
            submit_timeout,
            confirm_timeout,
        }
    }

    /// Phase one: hand the hash to the ledger.
    pub async fn submit(&self, hash: &VoteHash) -> Result<PendingHandle, LedgerError> {
        match timeout(self.submit_timeout, self.ledger.submit(hash)).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(SubmitError::Unavailable(reason))) => Err(LedgerError::Unavailable {
                reason,
                pending: None,
            }),
            Ok(Err(SubmitError::Rejected(reason))) => Err(LedgerError::Rejected {
                reason,
                pending: None,
            }),
            Err(_) => Err(LedgerError::Unavailable {
                reason: format!("submission timed out after {:?}", self.submit_timeout),
                pending: None,
            }),
        }
    }

    /// Phase two: wait, boundedly, for the submission to be finalized.
    pub async fn await_confirmation(
        &self,
        handle: &PendingHandle,
    ) -> Result<LedgerReference, LedgerError> {
        let confirmation = timeout(
            self.confirm_timeout,
            self.ledger.confirm(handle, self.confirm_timeout),
        )
        .await
        .unwrap_or(Confirmation::TimedOut);
        match confirmation {
            Confirmation::Confirmed(reference) => Ok(reference),
            Confirmation::TimedOut => Err(LedgerError::Unavailable {
                reason: format!("confirmation timed out after {:?}", self.confirm_timeout),
                pending: Some(handle.clone()),
            }),
            Confirmation::Rejected(reason) => Err(LedgerError::Rejected {
                reason,
                pending: Some(handle.clone()),
            }),
        }
    }
}
