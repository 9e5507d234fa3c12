use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    mongodb::{id_filter, Coll},
};
use crate::vote::store::{ElectionStore, StoreError};

/// An election, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Election name.
    pub name: String,
    /// Election status.
    pub status: ElectionStatus,
    /// Election start time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Election end time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
}

impl Election {
    /// Is the election accepting votes at the given instant?
    /// Both ends of the window are inclusive.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ElectionStatus::Open && self.start_time <= now && now <= self.end_time
    }
}

/// A candidate standing in exactly one election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: CandidateId,
    /// The election this candidate stands in.
    pub election_id: ElectionId,
    pub name: String,
    pub description: String,
}

#[rocket::async_trait]
impl ElectionStore for Database {
    async fn get_election(&self, id: ElectionId) -> Result<Option<Election>, StoreError> {
        let election = Coll::<Election>::from_db(self)
            .find_one(id_filter(id), None)
            .await?;
        Ok(election)
    }

    async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError> {
        let candidate = Coll::<Candidate>::from_db(self)
            .find_one(id_filter(id), None)
            .await?;
        Ok(candidate)
    }

    async fn candidates_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Candidate>, StoreError> {
        let candidates = Coll::<Candidate>::from_db(self)
            .find(doc! { "election_id": election_id }, None)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    #[test]
    fn window_bounds_are_inclusive() {
        let election = Election::open_example();
        assert!(election.is_open_at(election.start_time));
        assert!(election.is_open_at(election.end_time));
        assert!(!election.is_open_at(election.start_time - Duration::milliseconds(1)));
        assert!(!election.is_open_at(election.end_time + Duration::milliseconds(1)));
    }

    #[test]
    fn status_must_be_open() {
        let mut election = Election::open_example();
        let now = Utc::now();
        assert!(election.is_open_at(now));
        election.status = ElectionStatus::Closed;
        assert!(!election.is_open_at(now));
        election.status = ElectionStatus::Scheduled;
        assert!(!election.is_open_at(now));
    }
}
