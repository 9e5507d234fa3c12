use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{election::ElectionId, voter::VoterId},
    mongodb::{is_duplicate_key_error, Coll},
};
use crate::vote::{
    guard::{ReservationStore, ReserveOutcome},
    store::StoreError,
};

/// States of a claim on a (voter, election) pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// A cast is in flight.
    Held,
    /// The vote was persisted; the claim is permanent.
    Committed,
    /// Persistence was ambiguous; kept until someone checks the vote store.
    Unresolved,
}

impl From<ReservationState> for Bson {
    fn from(state: ReservationState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

/// An atomic claim on a (voter, election) pair, as stored in the database.
/// A unique index on the pair makes the insert the serialization point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Opaque token identifying this claim.
    #[serde(rename = "_id")]
    pub token: ObjectId,
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub state: ReservationState,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    /// A fresh, held claim.
    pub fn new(voter_id: VoterId, election_id: ElectionId) -> Self {
        Self {
            token: ObjectId::new(),
            voter_id,
            election_id,
            state: ReservationState::Held,
            reserved_at: Utc::now(),
        }
    }
}

#[rocket::async_trait]
impl ReservationStore for Database {
    async fn try_reserve(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<ReserveOutcome, StoreError> {
        let reservation = Reservation::new(voter_id, election_id);
        match Coll::<Reservation>::from_db(self)
            .insert_one(&reservation, None)
            .await
        {
            Ok(_) => Ok(ReserveOutcome::Reserved(reservation)),
            Err(err) if is_duplicate_key_error(&err) => Ok(ReserveOutcome::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn release(&self, token: &ObjectId) -> Result<(), StoreError> {
        // Committed claims are permanent.
        let filter = doc! {
            "_id": *token,
            "state": { "$ne": ReservationState::Committed },
        };
        Coll::<Reservation>::from_db(self)
            .delete_one(filter, None)
            .await?;
        Ok(())
    }

    async fn settle(&self, token: &ObjectId, state: ReservationState) -> Result<(), StoreError> {
        let update = doc! {
            "$set": { "state": state }
        };
        Coll::<Reservation>::from_db(self)
            .update_one(doc! { "_id": *token }, update, None)
            .await?;
        Ok(())
    }

    async fn get_reservation(&self, token: &ObjectId) -> Result<Option<Reservation>, StoreError> {
        let reservation = Coll::<Reservation>::from_db(self)
            .find_one(doc! { "_id": *token }, None)
            .await?;
        Ok(reservation)
    }

    async fn unsettled_reservations(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let filter = doc! {
            "election_id": election_id,
            "state": { "$ne": ReservationState::Committed },
        };
        let reservations = Coll::<Reservation>::from_db(self)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        Ok(reservations)
    }
}
