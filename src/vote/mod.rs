//! The vote commit protocol: eligibility, exactly-once reservation, hashing,
//! ledger anchoring, persistence and auditing of each cast request.

use std::sync::Arc;

use mongodb::Database;

use crate::config::Config;

use self::{
    audit::{AuditLog, AuditSink},
    eligibility::EligibilityGate,
    guard::{DuplicateGuard, ReservationStore},
    ledger::{Ledger, LedgerClient},
    orchestrator::CommitOrchestrator,
    reconcile::Reconciler,
    store::{ElectionStore, ResultQuery, VoteStore, VoterStore},
};

pub mod audit;
pub mod eligibility;
pub mod error;
pub mod guard;
pub mod hasher;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod rpc;
pub mod store;

#[cfg(test)]
pub(crate) mod memory;

/// Handles on every store the protocol and its surrounding API touch.
#[derive(Clone)]
pub struct Collaborators {
    pub voters: Arc<dyn VoterStore>,
    pub elections: Arc<dyn ElectionStore>,
    pub votes: Arc<dyn VoteStore>,
    pub reservations: Arc<dyn ReservationStore>,
    pub audit: Arc<dyn AuditSink>,
    pub results: Arc<dyn ResultQuery>,
}

impl Collaborators {
    /// Every collaborator backed by the same MongoDB database.
    pub fn mongodb(db: &Database) -> Self {
        let db = Arc::new(db.clone());
        Self {
            voters: db.clone(),
            elections: db.clone(),
            votes: db.clone(),
            reservations: db.clone(),
            audit: db.clone(),
            results: db,
        }
    }
}

/// Everything the HTTP API needs, placed in managed state.
pub struct VoteService {
    pub orchestrator: CommitOrchestrator,
    pub reconciler: Reconciler,
    pub collaborators: Collaborators,
}

impl VoteService {
    pub fn new(collaborators: Collaborators, ledger: Arc<dyn Ledger>, config: &Config) -> Self {
        let orchestrator = CommitOrchestrator::new(
            EligibilityGate::new(
                collaborators.voters.clone(),
                collaborators.elections.clone(),
            ),
            DuplicateGuard::new(
                collaborators.reservations.clone(),
                collaborators.votes.clone(),
            ),
            LedgerClient::new(
                ledger,
                config.ledger_submit_timeout(),
                config.ledger_confirm_timeout(),
            ),
            collaborators.votes.clone(),
            AuditLog::new(collaborators.audit.clone()),
            config.retry_policy(),
        );
        let reconciler = Reconciler::new(
            collaborators.votes.clone(),
            collaborators.audit.clone(),
            collaborators.reservations.clone(),
            config.cast_deadline(),
        );
        Self {
            orchestrator,
            reconciler,
            collaborators,
        }
    }
}
