use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Our voter IDs are integers.
pub type VoterId = u32;

/// States in the voter registration lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterStatus {
    /// Registered, awaiting approval.
    Pending,
    /// Approved; the only status allowed to vote.
    Active,
    /// Registration refused.
    Rejected,
}

impl From<VoterStatus> for Bson {
    fn from(status: VoterStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
