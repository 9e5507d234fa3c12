use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        election::{CandidateId, ElectionId},
        voter::VoterId,
    },
    db::{
        audit::{AttemptId, AttemptOutcome, AuditLogEntry},
        reservation::{Reservation, ReservationState},
        vote::Vote,
    },
};
use crate::vote::hasher::VoteHash;

/// A recorded vote, as it appears in a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub vote_hash: VoteHash,
    pub tx_hash: Option<String>,
}

impl From<Vote> for VoteSummary {
    fn from(vote: Vote) -> Self {
        let vote = vote.vote;
        Self {
            voter_id: vote.voter_id,
            election_id: vote.election_id,
            candidate_id: vote.candidate_id,
            vote_hash: vote.vote_hash,
            tx_hash: vote.tx_hash,
        }
    }
}

/// A ledger attempt, as it appears in a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub attempt_id: AttemptId,
    pub voter_id: VoterId,
    pub vote_hash: VoteHash,
    pub tx_hash: Option<String>,
    pub outcome: AttemptOutcome,
}

impl From<AuditLogEntry> for AuditSummary {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            attempt_id: entry.attempt_id,
            voter_id: entry.payload.voter_id,
            vote_hash: entry.payload.vote_hash,
            tx_hash: entry.tx_hash,
            outcome: entry.payload.outcome,
        }
    }
}

/// A claim that has not been committed, as it appears in a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub token: String,
    pub voter_id: VoterId,
    pub state: ReservationState,
}

impl From<Reservation> for ReservationSummary {
    fn from(reservation: Reservation) -> Self {
        Self {
            token: reservation.token.to_hex(),
            voter_id: reservation.voter_id,
            state: reservation.state,
        }
    }
}

/// Everything needed to check an election's vote store against its audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub election_id: ElectionId,
    pub votes: Vec<VoteSummary>,
    pub audit: Vec<AuditSummary>,
    pub reservations: Vec<ReservationSummary>,
}
