//! Interfaces to the durable stores the commit protocol reads and writes.
//!
//! Production implementations live beside the document types in
//! [`crate::model::db`]; every store is implemented for [`mongodb::Database`].

use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    api::results::CandidateTally,
    common::{
        election::{CandidateId, ElectionId},
        voter::{VoterId, VoterStatus},
    },
    db::{
        election::{Candidate, Election},
        vote::{NewVote, Vote},
        voter::Voter,
    },
};

/// A store could not be reached or refused the operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The outcome of a write that is protected by a uniqueness constraint.
#[derive(Debug)]
pub enum InsertOutcome<T> {
    /// The write landed.
    Inserted(T),
    /// The uniqueness constraint refused the write.
    Conflict,
    /// The write definitely did not land.
    Failed(StoreError),
    /// The write may or may not have landed.
    Unknown(StoreError),
}

/// Read access to registered voters, plus the status mutations owned by the
/// registration workflow.
#[rocket::async_trait]
pub trait VoterStore: Send + Sync {
    async fn get_voter(&self, id: VoterId) -> Result<Option<Voter>, StoreError>;

    async fn get_voter_by_email(&self, email: &str) -> Result<Option<Voter>, StoreError>;

    /// Returns false if no such voter exists.
    async fn set_voter_status(&self, id: VoterId, status: VoterStatus)
        -> Result<bool, StoreError>;
}

/// Read access to elections and their candidates.
#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    async fn get_election(&self, id: ElectionId) -> Result<Option<Election>, StoreError>;

    async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError>;

    async fn candidates_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Candidate>, StoreError>;
}

/// The durable record of committed votes.
#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Insert a vote. A second vote for the same (voter, election) pair, or a
    /// repeated vote hash, is a [`InsertOutcome::Conflict`].
    async fn try_insert_vote(&self, vote: &NewVote) -> InsertOutcome<Vote>;

    async fn find_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<Option<Vote>, StoreError>;

    async fn votes_for_election(&self, election_id: ElectionId) -> Result<Vec<Vote>, StoreError>;
}

/// Read-only aggregation of votes, consumed by reporting.
#[rocket::async_trait]
pub trait ResultQuery: Send + Sync {
    /// Vote counts for every candidate in the election, including those with
    /// no votes, highest count first.
    async fn tally(&self, election_id: ElectionId) -> Result<Vec<CandidateTally>, StoreError>;
}
