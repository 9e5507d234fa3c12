mod state;

pub use state::ElectionStatus;

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are integers.
pub type CandidateId = u32;
