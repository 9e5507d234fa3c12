use serde::{Deserialize, Serialize};

use crate::model::{
    common::voter::{VoterId, VoterStatus},
    db::voter::Voter,
};

/// What the API reveals about a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDescription {
    pub id: VoterId,
    pub email: String,
    pub status: VoterStatus,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id,
            email: voter.email,
            status: voter.status,
        }
    }
}
