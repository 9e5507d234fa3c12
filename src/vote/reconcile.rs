//! Cross-checks the vote store against the audit log and the reservation
//! table, and settles reservations left by ambiguous writes or abandoned
//! casts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{
        dump::{AuditSummary, LedgerDump, ReservationSummary, VoteSummary},
        receipt::VoteReceipt,
    },
    common::election::ElectionId,
    db::{audit::AttemptOutcome, reservation::ReservationState},
};

use super::{
    audit::AuditSink,
    guard::ReservationStore,
    hasher::VoteHash,
    store::{StoreError, VoteStore},
};

/// Every disagreement found between the stores for one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub election_id: ElectionId,
    pub votes_checked: usize,
    /// Votes with no ledger reference.
    pub unanchored_votes: Vec<VoteSummary>,
    /// Votes with no matching committed audit entry.
    pub unaudited_votes: Vec<VoteSummary>,
    /// Confirmed ledger writes that no vote carries.
    pub orphaned_anchors: Vec<AuditSummary>,
    /// Attempts whose confirmation timed out. They may have landed later.
    pub unconfirmed_submissions: Vec<AuditSummary>,
    pub unresolved_reservations: Vec<ReservationSummary>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.unanchored_votes.is_empty()
            && self.unaudited_votes.is_empty()
            && self.orphaned_anchors.is_empty()
            && self.unresolved_reservations.is_empty()
    }
}

/// Compute the report for a dump. Pure, so the offline tool can share it.
pub fn reconcile(dump: &LedgerDump) -> ReconciliationReport {
    let committed = dump
        .audit
        .iter()
        .filter(|entry| entry.outcome == AttemptOutcome::Committed)
        .map(|entry| (entry.vote_hash, entry.tx_hash.as_deref()))
        .collect::<HashSet<(VoteHash, Option<&str>)>>();
    let recorded = dump
        .votes
        .iter()
        .map(|vote| vote.vote_hash)
        .collect::<HashSet<_>>();

    let unanchored_votes = dump
        .votes
        .iter()
        .filter(|vote| vote.tx_hash.is_none())
        .cloned()
        .collect();
    let unaudited_votes = dump
        .votes
        .iter()
        .filter(|vote| !committed.contains(&(vote.vote_hash, vote.tx_hash.as_deref())))
        .cloned()
        .collect();
    let orphaned_anchors = dump
        .audit
        .iter()
        .filter(|entry| entry.outcome.ledger_confirmed() && !recorded.contains(&entry.vote_hash))
        .cloned()
        .collect();
    let unconfirmed_submissions = dump
        .audit
        .iter()
        .filter(|entry| matches!(entry.outcome, AttemptOutcome::ConfirmTimedOut { .. }))
        .cloned()
        .collect();

    ReconciliationReport {
        election_id: dump.election_id,
        votes_checked: dump.votes.len(),
        unanchored_votes,
        unaudited_votes,
        orphaned_anchors,
        unconfirmed_submissions,
        unresolved_reservations: dump.reservations.clone(),
    }
}

/// What resolving a reservation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum Resolution {
    /// The vote had landed; the claim is now permanent.
    Committed(VoteReceipt),
    /// The vote had not landed; the voter may try again.
    Released,
    /// A cast may still be in flight on this claim.
    InProgress,
    AlreadyCommitted,
    NotFound,
}

#[derive(Clone)]
pub struct Reconciler {
    votes: Arc<dyn VoteStore>,
    audit: Arc<dyn AuditSink>,
    reservations: Arc<dyn ReservationStore>,
    /// Held claims older than this have outlived any cast that took them.
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        votes: Arc<dyn VoteStore>,
        audit: Arc<dyn AuditSink>,
        reservations: Arc<dyn ReservationStore>,
        stale_after: Duration,
    ) -> Self {
        Self {
            votes,
            audit,
            reservations,
            stale_after,
        }
    }

    pub async fn dump(&self, election_id: ElectionId) -> Result<LedgerDump, StoreError> {
        let votes = self.votes.votes_for_election(election_id).await?;
        let audit = self.audit.entries_for_election(election_id).await?;
        let reservations = self
            .reservations
            .unsettled_reservations(election_id)
            .await?;
        Ok(LedgerDump {
            election_id,
            votes: votes.into_iter().map(Into::into).collect(),
            audit: audit.into_iter().map(Into::into).collect(),
            reservations: reservations.into_iter().map(Into::into).collect(),
        })
    }

    pub async fn report(&self, election_id: ElectionId) -> Result<ReconciliationReport, StoreError> {
        let report = reconcile(&self.dump(election_id).await?);
        if report.is_consistent() {
            info!(
                "Election {election_id} is consistent ({} votes)",
                report.votes_checked
            );
        } else {
            error!(
                "Election {election_id} needs reconciliation: {} unanchored, {} unaudited, \
                 {} orphaned anchors, {} unresolved reservations",
                report.unanchored_votes.len(),
                report.unaudited_votes.len(),
                report.orphaned_anchors.len(),
                report.unresolved_reservations.len()
            );
        }
        Ok(report)
    }

    /// Settle a reservation left unresolved by an ambiguous vote write, or
    /// still held after the cast that took it must have finished (a failed
    /// release, or a crash mid-cast).
    pub async fn resolve_pending(&self, token: &ObjectId) -> Result<Resolution, StoreError> {
        let Some(reservation) = self.reservations.get_reservation(token).await? else {
            return Ok(Resolution::NotFound);
        };
        match reservation.state {
            ReservationState::Committed => return Ok(Resolution::AlreadyCommitted),
            ReservationState::Unresolved => {}
            ReservationState::Held => {
                // A reservation stamped in the future counts as fresh.
                let stale = (Utc::now() - reservation.reserved_at)
                    .to_std()
                    .map_or(false, |age| age >= self.stale_after);
                if !stale {
                    return Ok(Resolution::InProgress);
                }
                warn!(
                    "Reservation {token} for voter {} has been held since {}, resolving it",
                    reservation.voter_id, reservation.reserved_at
                );
            }
        }

        match self
            .votes
            .find_vote(reservation.voter_id, reservation.election_id)
            .await?
        {
            Some(vote) => {
                self.reservations
                    .settle(token, ReservationState::Committed)
                    .await?;
                info!("Reservation {token} resolved: vote {} was recorded", vote.vote_hash);
                Ok(Resolution::Committed(VoteReceipt::from(&vote)))
            }
            None => {
                self.reservations.release(token).await?;
                warn!(
                    "Reservation {token} resolved: no vote recorded, voter {} may vote again",
                    reservation.voter_id
                );
                Ok(Resolution::Released)
            }
        }
    }
}
