use mongodb::{bson::doc, Database};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::voter::{VoterId, VoterStatus},
    mongodb::{id_filter, Coll},
};
use crate::vote::store::{StoreError, VoterStore};

/// A registered voter, as stored in the database.
///
/// The commit protocol only ever reads a snapshot of this; registration owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: VoterId,
    pub first_name: String,
    pub last_name: String,
    /// Unique contact address.
    pub email: String,
    /// Registration status.
    pub status: VoterStatus,
}

impl Voter {
    /// Only active voters may cast votes.
    pub fn is_active(&self) -> bool {
        self.status == VoterStatus::Active
    }
}

#[rocket::async_trait]
impl VoterStore for Database {
    async fn get_voter(&self, id: VoterId) -> Result<Option<Voter>, StoreError> {
        let voter = Coll::<Voter>::from_db(self)
            .find_one(id_filter(id), None)
            .await?;
        Ok(voter)
    }

    async fn get_voter_by_email(&self, email: &str) -> Result<Option<Voter>, StoreError> {
        let voter = Coll::<Voter>::from_db(self)
            .find_one(doc! { "email": email }, None)
            .await?;
        Ok(voter)
    }

    async fn set_voter_status(
        &self,
        id: VoterId,
        status: VoterStatus,
    ) -> Result<bool, StoreError> {
        let update = doc! {
            "$set": { "status": status }
        };
        let result = Coll::<Voter>::from_db(self)
            .update_one(id_filter(id), update, None)
            .await?;
        Ok(result.matched_count == 1)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Voter {
        pub fn active_example() -> Self {
            Self {
                id: 1,
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.org".to_string(),
                status: VoterStatus::Active,
            }
        }

        pub fn pending_example() -> Self {
            Self {
                id: 2,
                first_name: "Charles".to_string(),
                last_name: "Babbage".to_string(),
                email: "charles@example.org".to_string(),
                status: VoterStatus::Pending,
            }
        }

        pub fn rejected_example() -> Self {
            Self {
                id: 3,
                first_name: "Mallory".to_string(),
                last_name: "Moriarty".to_string(),
                email: "mallory@example.org".to_string(),
                status: VoterStatus::Rejected,
            }
        }
    }
}
