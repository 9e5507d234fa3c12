use std::collections::HashMap;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use log::warn;
use mongodb::{
    bson::{doc, from_document, oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::results::CandidateTally,
    common::{
        election::{CandidateId, ElectionId},
        voter::VoterId,
    },
    mongodb::{is_ambiguous_write_error, is_duplicate_key_error, Coll},
};
use crate::vote::{
    hasher::VoteHash,
    ledger::LedgerReference,
    store::{ElectionStore, InsertOutcome, ResultQuery, StoreError, VoteStore},
};

/// Core vote data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    /// The digest anchored on the ledger.
    pub vote_hash: VoteHash,
    /// Ledger transaction that anchored `vote_hash`.
    pub tx_hash: Option<String>,
    /// Block the anchoring transaction was mined in, if the ledger reports one.
    pub block_number: Option<u64>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl VoteCore {
    /// A vote whose hash has been confirmed on the ledger.
    pub fn anchored(
        voter_id: VoterId,
        election_id: ElectionId,
        candidate_id: CandidateId,
        vote_hash: VoteHash,
        reference: &LedgerReference,
    ) -> Self {
        Self {
            voter_id,
            election_id,
            candidate_id,
            vote_hash,
            tx_hash: Some(reference.tx_hash.clone()),
            block_number: reference.block_number,
            created_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID. Votes are never modified or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

/// One row of the per-candidate vote count aggregation.
#[derive(Debug, Deserialize)]
struct CandidateCount {
    #[serde(rename = "_id")]
    candidate_id: CandidateId,
    count: u64,
}

#[rocket::async_trait]
impl VoteStore for Database {
    async fn try_insert_vote(&self, vote: &NewVote) -> InsertOutcome<Vote> {
        match Coll::<NewVote>::from_db(self).insert_one(vote, None).await {
            Ok(result) => match result.inserted_id.as_object_id() {
                Some(id) => InsertOutcome::Inserted(Vote {
                    id,
                    vote: vote.clone(),
                }),
                // The driver generates ObjectIds, so this means something odd
                // happened after the write landed.
                None => InsertOutcome::Unknown(StoreError::Unavailable(format!(
                    "unexpected inserted ID {}",
                    result.inserted_id
                ))),
            },
            Err(err) if is_duplicate_key_error(&err) => InsertOutcome::Conflict,
            Err(err) if is_ambiguous_write_error(&err) => InsertOutcome::Unknown(err.into()),
            Err(err) => InsertOutcome::Failed(err.into()),
        }
    }

    async fn find_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<Option<Vote>, StoreError> {
        let filter = doc! {
            "voter_id": voter_id,
            "election_id": election_id,
        };
        let vote = Coll::<Vote>::from_db(self).find_one(filter, None).await?;
        Ok(vote)
    }

    async fn votes_for_election(&self, election_id: ElectionId) -> Result<Vec<Vote>, StoreError> {
        let votes = Coll::<Vote>::from_db(self)
            .find(doc! { "election_id": election_id }, None)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }
}

#[rocket::async_trait]
impl ResultQuery for Database {
    async fn tally(&self, election_id: ElectionId) -> Result<Vec<CandidateTally>, StoreError> {
        let pipeline = [
            doc! { "$match": { "election_id": election_id } },
            doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
        ];
        let mut counts = HashMap::new();
        let mut cursor = Coll::<Vote>::from_db(self).aggregate(pipeline, None).await?;
        while let Some(row) = cursor.try_next().await? {
            match from_document::<CandidateCount>(row) {
                Ok(row) => {
                    counts.insert(row.candidate_id, row.count);
                }
                Err(e) => warn!("Skipping malformed tally row for election {election_id}: {e}"),
            }
        }

        let candidates = self.candidates_for_election(election_id).await?;
        Ok(CandidateTally::rank(candidates, &counts))
    }
}
