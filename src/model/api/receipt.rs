use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        election::{CandidateId, ElectionId},
        voter::VoterId,
    },
    db::vote::Vote,
};
use crate::vote::hasher::VoteHash;

/// Proof handed to a voter whose vote was anchored and recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    /// The digest anchored on the ledger.
    pub vote_hash: VoteHash,
    /// The ledger transaction that anchored it.
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
}

impl From<&Vote> for VoteReceipt {
    fn from(vote: &Vote) -> Self {
        Self {
            voter_id: vote.voter_id,
            election_id: vote.election_id,
            candidate_id: vote.candidate_id,
            vote_hash: vote.vote_hash,
            tx_hash: vote.tx_hash.clone(),
            block_number: vote.block_number,
        }
    }
}

/// Returned when a vote was anchored but we cannot tell whether it was recorded.
/// The voter's slot stays claimed until support resolves `reservation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerification {
    /// Token of the reservation to resolve.
    pub reservation: String,
    pub vote_hash: VoteHash,
    pub tx_hash: String,
    pub message: String,
}
