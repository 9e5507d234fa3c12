//! Exactly-once claims on (voter, election) pairs.

use std::sync::Arc;

use log::{debug, error, warn};
use mongodb::bson::oid::ObjectId;

use crate::model::{
    common::{election::ElectionId, voter::VoterId},
    db::reservation::{Reservation, ReservationState},
};

use super::{
    error::CastError,
    store::{StoreError, VoteStore},
};

/// The result of trying to claim a (voter, election) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    /// Someone else holds, or has committed, the pair.
    Conflict,
}

/// Durable storage for reservations. `try_reserve` must be atomic: of any
/// number of concurrent calls for the same pair, at most one is `Reserved`.
#[rocket::async_trait]
pub trait ReservationStore: Send + Sync {
    async fn try_reserve(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Drop a claim. Committed claims are left alone.
    async fn release(&self, token: &ObjectId) -> Result<(), StoreError>;

    async fn settle(&self, token: &ObjectId, state: ReservationState) -> Result<(), StoreError>;

    async fn get_reservation(&self, token: &ObjectId) -> Result<Option<Reservation>, StoreError>;

    /// Held and unresolved claims for an election.
    async fn unsettled_reservations(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Reservation>, StoreError>;
}

/// Guarantees at most one in-flight or committed vote per (voter, election).
#[derive(Clone)]
pub struct DuplicateGuard {
    reservations: Arc<dyn ReservationStore>,
    votes: Arc<dyn VoteStore>,
}

impl DuplicateGuard {
    pub fn new(reservations: Arc<dyn ReservationStore>, votes: Arc<dyn VoteStore>) -> Self {
        Self {
            reservations,
            votes,
        }
    }

    /// Claim the pair, or fail with [`CastError::AlreadyVoted`].
    pub async fn reserve(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<Reservation, CastError> {
        let already_voted = CastError::AlreadyVoted {
            voter_id,
            election_id,
        };
        // Cheap rejection for the common repeat case; the reservation insert
        // is what actually serializes concurrent casts.
        if self.votes.find_vote(voter_id, election_id).await?.is_some() {
            debug!("Voter {voter_id} already has a vote in election {election_id}");
            return Err(already_voted);
        }
        match self.reservations.try_reserve(voter_id, election_id).await? {
            ReserveOutcome::Reserved(reservation) => {
                debug!(
                    "Reserved voter {voter_id} in election {election_id} as {}",
                    reservation.token
                );
                Ok(reservation)
            }
            ReserveOutcome::Conflict => {
                debug!("Voter {voter_id} already holds a reservation in election {election_id}");
                Err(already_voted)
            }
        }
    }

    /// Give the pair back so the voter can try again.
    pub async fn release(&self, reservation: &Reservation) {
        if let Err(e) = self.reservations.release(&reservation.token).await {
            error!(
                "Failed to release reservation {} for voter {} in election {}: {e}",
                reservation.token, reservation.voter_id, reservation.election_id
            );
        }
    }

    /// Make the claim permanent once the vote is durably recorded.
    pub async fn commit(&self, reservation: &Reservation) {
        // The vote's own unique index still blocks duplicates if this fails.
        if let Err(e) = self
            .reservations
            .settle(&reservation.token, ReservationState::Committed)
            .await
        {
            warn!(
                "Failed to mark reservation {} committed: {e}",
                reservation.token
            );
        }
    }

    /// Keep the claim until someone checks whether the vote landed.
    pub async fn hold_unresolved(&self, reservation: &Reservation) {
        if let Err(e) = self
            .reservations
            .settle(&reservation.token, ReservationState::Unresolved)
            .await
        {
            error!(
                "Failed to mark reservation {} unresolved: {e}",
                reservation.token
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::vote::memory::MemoryStore;

    fn guard(store: &Arc<MemoryStore>) -> DuplicateGuard {
        DuplicateGuard::new(store.clone(), store.clone())
    }

    #[rocket::async_test]
    async fn second_reservation_conflicts() {
        let store = Arc::new(MemoryStore::seeded());
        let guard = guard(&store);

        let reservation = guard.reserve(1, 10).await.unwrap();
        assert_eq!(reservation.state, ReservationState::Held);
        assert!(matches!(
            guard.reserve(1, 10).await,
            Err(CastError::AlreadyVoted {
                voter_id: 1,
                election_id: 10
            })
        ));
        // Other elections are independent.
        assert!(guard.reserve(1, 11).await.is_ok());
    }

    #[rocket::async_test]
    async fn released_pair_can_be_reserved_again() {
        let store = Arc::new(MemoryStore::seeded());
        let guard = guard(&store);

        let reservation = guard.reserve(1, 10).await.unwrap();
        guard.release(&reservation).await;
        assert!(guard.reserve(1, 10).await.is_ok());
    }

    #[rocket::async_test]
    async fn committed_pair_survives_release() {
        let store = Arc::new(MemoryStore::seeded());
        let guard = guard(&store);

        let reservation = guard.reserve(1, 10).await.unwrap();
        guard.commit(&reservation).await;
        guard.release(&reservation).await;

        let stored = store
            .get_reservation(&reservation.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, ReservationState::Committed);
        assert!(guard.reserve(1, 10).await.is_err());
    }

    #[rocket::async_test]
    async fn unresolved_pair_stays_claimed() {
        let store = Arc::new(MemoryStore::seeded());
        let guard = guard(&store);

        let reservation = guard.reserve(1, 10).await.unwrap();
        guard.hold_unresolved(&reservation).await;

        let unsettled = store.unsettled_reservations(10).await.unwrap();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].state, ReservationState::Unresolved);
        assert!(guard.reserve(1, 10).await.is_err());
    }
}
