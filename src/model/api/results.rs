use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    db::election::{Candidate, Election},
};

/// Number of votes recorded for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub name: String,
    pub description: String,
    pub vote_count: u64,
}

impl CandidateTally {
    /// Pair every candidate with its count (zero if absent), highest count
    /// first and ties broken by candidate ID.
    pub fn rank(candidates: Vec<Candidate>, counts: &HashMap<CandidateId, u64>) -> Vec<Self> {
        let mut tallies = candidates
            .into_iter()
            .map(|candidate| Self {
                vote_count: counts.get(&candidate.id).copied().unwrap_or(0),
                candidate_id: candidate.id,
                name: candidate.name,
                description: candidate.description,
            })
            .collect::<Vec<_>>();
        tallies.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then(a.candidate_id.cmp(&b.candidate_id))
        });
        tallies
    }
}

/// Results of an election as served to reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub name: String,
    pub status: ElectionStatus,
    pub candidates: Vec<CandidateTally>,
}

impl ElectionResults {
    pub fn new(election: Election, candidates: Vec<CandidateTally>) -> Self {
        Self {
            election_id: election.id,
            name: election.name,
            status: election.status,
            candidates,
        }
    }
}
