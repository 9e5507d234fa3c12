use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use crate::model::db::{
    audit::AuditLogEntry,
    election::{Candidate, Election},
    reservation::Reservation,
    vote::{NewVote, Vote},
    voter::Voter,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Filter matching the document with the given integer `_id`.
pub fn id_filter(id: u32) -> Document {
    doc! { "_id": id }
}

// Voter collection
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}

// Election collections
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}

const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Reservation collection
const RESERVATIONS: &str = "reservations";
impl MongoCollection for Reservation {
    const NAME: &'static str = RESERVATIONS;
}

// Audit log collection
const AUDIT_LOG: &str = "audit_log";
impl MongoCollection for AuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique indexes on `votes` and `reservations` are what make the
/// one-vote-per-election guarantee hold under concurrency.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Voter collection.
    let voter_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique.clone())
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Vote collection.
    let votes = Coll::<Vote>::from_db(db);
    let vote_pair_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(unique.clone())
        .build();
    let vote_hash_index = IndexModel::builder()
        .keys(doc! {"vote_hash": 1})
        .options(unique.clone())
        .build();
    votes
        .create_indexes([vote_pair_index, vote_hash_index], None)
        .await?;

    // Reservation collection.
    let reservation_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(unique)
        .build();
    Coll::<Reservation>::from_db(db)
        .create_index(reservation_index, None)
        .await?;

    // Audit log collection.
    let audit_index = IndexModel::builder()
        .keys(doc! {"payload.election_id": 1})
        .build();
    Coll::<AuditLogEntry>::from_db(db)
        .create_index(audit_index, None)
        .await?;

    Ok(())
}
