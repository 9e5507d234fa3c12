//! Decides whether a voter may vote for a candidate in an election, right now.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::model::{
    common::election::{CandidateId, ElectionId},
    db::{
        election::{Candidate, Election},
        voter::Voter,
    },
};

use super::{
    error::CastError,
    orchestrator::CastRequest,
    store::{ElectionStore, VoterStore},
};

/// The voter must exist and be active.
pub fn check_voter(request: &CastRequest, voter: Option<&Voter>) -> Result<(), CastError> {
    match voter {
        Some(voter) if voter.is_active() => Ok(()),
        _ => Err(CastError::InvalidVoter(request.voter_id)),
    }
}

/// The election must exist, be open, and `now` must fall inside its window.
pub fn check_election(
    election_id: ElectionId,
    election: Option<&Election>,
    now: DateTime<Utc>,
) -> Result<(), CastError> {
    match election {
        Some(election) if election.is_open_at(now) => Ok(()),
        _ => Err(CastError::ElectionNotOpen(election_id)),
    }
}

/// The candidate must exist and stand in the requested election.
pub fn check_candidate(
    candidate_id: CandidateId,
    election_id: ElectionId,
    candidate: Option<&Candidate>,
) -> Result<(), CastError> {
    match candidate {
        Some(candidate) if candidate.election_id == election_id => Ok(()),
        _ => Err(CastError::InvalidCandidate {
            candidate_id,
            election_id,
        }),
    }
}

/// Checks eligibility against fresh reads every time; nothing is cached, so a
/// voter rejected or an election closed a moment ago is seen immediately.
#[derive(Clone)]
pub struct EligibilityGate {
    voters: Arc<dyn VoterStore>,
    elections: Arc<dyn ElectionStore>,
}

impl EligibilityGate {
    pub fn new(voters: Arc<dyn VoterStore>, elections: Arc<dyn ElectionStore>) -> Self {
        Self { voters, elections }
    }

    pub async fn check_eligible(
        &self,
        request: &CastRequest,
        now: DateTime<Utc>,
    ) -> Result<(), CastError> {
        let voter = self.voters.get_voter(request.voter_id).await?;
        check_voter(request, voter.as_ref())?;

        let election = self.elections.get_election(request.election_id).await?;
        check_election(request.election_id, election.as_ref(), now)?;

        let candidate = self.elections.get_candidate(request.candidate_id).await?;
        check_candidate(request.candidate_id, request.election_id, candidate.as_ref())?;

        debug!(
            "Voter {} is eligible to vote for {} in election {}",
            request.voter_id, request.candidate_id, request.election_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::vote::memory::MemoryStore;

    fn gate() -> EligibilityGate {
        let store = Arc::new(MemoryStore::seeded());
        EligibilityGate::new(store.clone(), store)
    }

    fn request(voter_id: u32, election_id: u32, candidate_id: u32) -> CastRequest {
        CastRequest {
            voter_id,
            election_id,
            candidate_id,
        }
    }

    #[rocket::async_test]
    async fn active_voter_in_open_election() {
        assert!(gate()
            .check_eligible(&request(1, 10, 100), Utc::now())
            .await
            .is_ok());
    }

    #[rocket::async_test]
    async fn inactive_or_unknown_voters_are_refused() {
        let gate = gate();
        for voter in [2, 3, 99] {
            assert!(matches!(
                gate.check_eligible(&request(voter, 10, 100), Utc::now()).await,
                Err(CastError::InvalidVoter(v)) if v == voter
            ));
        }
    }

    #[rocket::async_test]
    async fn election_must_be_open() {
        let gate = gate();
        for (election, candidate) in [(11, 110), (12, 120), (99, 100)] {
            assert!(matches!(
                gate.check_eligible(&request(1, election, candidate), Utc::now()).await,
                Err(CastError::ElectionNotOpen(e)) if e == election
            ));
        }
    }

    #[rocket::async_test]
    async fn outside_the_window_is_not_open() {
        let gate = gate();
        // The example election runs from a day ago until a day from now.
        let before = Utc::now() - Duration::days(2);
        let after = Utc::now() + Duration::days(2);
        for now in [before, after] {
            assert!(matches!(
                gate.check_eligible(&request(1, 10, 100), now).await,
                Err(CastError::ElectionNotOpen(10))
            ));
        }
    }

    #[rocket::async_test]
    async fn candidate_must_stand_in_the_election() {
        let gate = gate();
        for candidate in [110, 999] {
            assert!(matches!(
                gate.check_eligible(&request(1, 10, candidate), Utc::now()).await,
                Err(CastError::InvalidCandidate { candidate_id, election_id: 10 })
                    if candidate_id == candidate
            ));
        }
    }

    #[test]
    fn window_edges_are_inclusive() {
        let election = Election::open_example();
        assert!(check_election(10, Some(&election), election.start_time).is_ok());
        assert!(check_election(10, Some(&election), election.end_time).is_ok());
    }
}
