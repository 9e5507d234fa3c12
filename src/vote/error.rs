use thiserror::Error;

use crate::model::common::{
    election::{CandidateId, ElectionId},
    voter::VoterId,
};

use super::store::StoreError;

/// Why a cast request did not produce a recorded vote.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("Voter {0} does not exist or is not active")]
    InvalidVoter(VoterId),
    #[error("Candidate {candidate_id} is not standing in election {election_id}")]
    InvalidCandidate {
        candidate_id: CandidateId,
        election_id: ElectionId,
    },
    #[error("Election {0} is not open")]
    ElectionNotOpen(ElectionId),
    #[error("Voter {voter_id} has already voted in election {election_id}")]
    AlreadyVoted {
        voter_id: VoterId,
        election_id: ElectionId,
    },
    #[error("Ledger unavailable after {attempts} attempt(s): {reason}")]
    LedgerUnavailable { attempts: u32, reason: String },
    #[error("Ledger rejected the vote: {0}")]
    LedgerRejected(String),
    #[error("Vote anchored in transaction {tx_hash} but could not be recorded: {reason}")]
    ReconciliationRequired { tx_hash: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CastError {
    /// Stable machine-readable name for API clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidVoter(_) => "invalid_voter",
            Self::InvalidCandidate { .. } => "invalid_candidate",
            Self::ElectionNotOpen(_) => "election_not_open",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::LedgerUnavailable { .. } => "ledger_unavailable",
            Self::LedgerRejected(_) => "ledger_rejected",
            Self::ReconciliationRequired { .. } => "reconciliation_required",
            Self::Store(_) => "store_unavailable",
        }
    }
}
