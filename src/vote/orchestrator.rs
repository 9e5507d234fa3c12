//! The commit sequence for one cast request, as an explicit state machine.
//!
//! ```text
//! Received -> Eligible -> Reserved -> Hashed -> LedgerSubmitted
//!          -> LedgerConfirmed -> Persisted -> Logged
//! ```
//!
//! Any transition may exit to `Rejected`; ambiguous persistence exits to
//! `PendingVerification`. A transient ledger failure re-enters `Reserved`
//! with the next attempt number, so the retry is hashed with a fresh salt.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use mongodb::bson::oid::ObjectId;
use rocket::tokio::time::sleep;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::receipt::{PendingVerification, VoteReceipt},
    common::{
        election::{CandidateId, ElectionId},
        voter::VoterId,
    },
    db::{
        audit::{AttemptId, AttemptOutcome, AttemptPayload, AuditLogEntry},
        reservation::Reservation,
        vote::{NewVote, Vote},
    },
};

use super::{
    audit::AuditLog,
    eligibility::EligibilityGate,
    error::CastError,
    guard::DuplicateGuard,
    hasher::{hash_vote, UniquenessSalt, VoteHash},
    ledger::{LedgerClient, LedgerError, LedgerReference, PendingHandle},
    retry::RetryPolicy,
    store::{InsertOutcome, VoteStore},
};

/// A request to cast a vote. Authentication happens before this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRequest {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
}

/// A cast request with an identity, so its ledger attempts can be traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: ObjectId,
    pub request: CastRequest,
}

impl Ticket {
    pub fn new(request: CastRequest) -> Self {
        Self {
            id: ObjectId::new(),
            request,
        }
    }
}

/// The pair is claimed; `attempt` counts ledger attempts from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
    pub ticket: Ticket,
    pub reservation: Reservation,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashed {
    pub claimed: Claimed,
    pub salt: UniquenessSalt,
    pub hash: VoteHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub hashed: Hashed,
    pub handle: PendingHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchored {
    pub hashed: Hashed,
    pub reference: LedgerReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub anchored: Anchored,
    pub vote: Vote,
}

#[derive(Debug)]
pub enum CommitState {
    Received(Ticket),
    Eligible(Ticket),
    Reserved(Claimed),
    Hashed(Hashed),
    LedgerSubmitted(Submitted),
    LedgerConfirmed(Anchored),
    Persisted(Recorded),
    Logged(VoteReceipt),
    PendingVerification(PendingVerification),
    Rejected(CastError),
}

impl CommitState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received(_) => "RECEIVED",
            Self::Eligible(_) => "ELIGIBLE",
            Self::Reserved(_) => "RESERVED",
            Self::Hashed(_) => "HASHED",
            Self::LedgerSubmitted(_) => "LEDGER_SUBMITTED",
            Self::LedgerConfirmed(_) => "LEDGER_CONFIRMED",
            Self::Persisted(_) => "PERSISTED",
            Self::Logged(_) => "LOGGED",
            Self::PendingVerification(_) => "PENDING_VERIFICATION",
            Self::Rejected(_) => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Logged(_) | Self::PendingVerification(_) | Self::Rejected(_)
        )
    }
}

/// What the caller gets back when a cast is not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    Recorded(VoteReceipt),
    PendingVerification(PendingVerification),
}

pub struct CommitOrchestrator {
    gate: EligibilityGate,
    guard: DuplicateGuard,
    ledger: LedgerClient,
    votes: Arc<dyn VoteStore>,
    audit: AuditLog,
    retry: RetryPolicy,
}

impl CommitOrchestrator {
    pub fn new(
        gate: EligibilityGate,
        guard: DuplicateGuard,
        ledger: LedgerClient,
        votes: Arc<dyn VoteStore>,
        audit: AuditLog,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gate,
            guard,
            ledger,
            votes,
            audit,
            retry,
        }
    }

    /// Run a cast request to a terminal state.
    pub async fn cast(&self, request: CastRequest) -> Result<CastOutcome, CastError> {
        let ticket = Ticket::new(request);
        let id = ticket.id;
        let mut state = CommitState::Received(ticket);
        loop {
            debug!("Cast {id}: {}", state.name());
            state = match state {
                CommitState::Logged(receipt) => return Ok(CastOutcome::Recorded(receipt)),
                CommitState::PendingVerification(pending) => {
                    return Ok(CastOutcome::PendingVerification(pending))
                }
                CommitState::Rejected(e) => return Err(e),
                state => self.step(state).await,
            };
        }
    }

    /// Perform a single transition. Terminal states are returned unchanged.
    pub async fn step(&self, state: CommitState) -> CommitState {
        match state {
            CommitState::Received(ticket) => self.check(ticket).await,
            CommitState::Eligible(ticket) => self.reserve(ticket).await,
            CommitState::Reserved(claimed) => self.hash(claimed),
            CommitState::Hashed(hashed) => self.submit(hashed).await,
            CommitState::LedgerSubmitted(submitted) => self.confirm(submitted).await,
            CommitState::LedgerConfirmed(anchored) => self.persist(anchored).await,
            CommitState::Persisted(recorded) => self.log(recorded).await,
            terminal => terminal,
        }
    }

    async fn check(&self, ticket: Ticket) -> CommitState {
        match self.gate.check_eligible(&ticket.request, Utc::now()).await {
            Ok(()) => CommitState::Eligible(ticket),
            Err(e) => {
                info!("Cast {} refused: {e}", ticket.id);
                CommitState::Rejected(e)
            }
        }
    }

    async fn reserve(&self, ticket: Ticket) -> CommitState {
        let request = ticket.request;
        match self
            .guard
            .reserve(request.voter_id, request.election_id)
            .await
        {
            Ok(reservation) => CommitState::Reserved(Claimed {
                ticket,
                reservation,
                attempt: 1,
            }),
            Err(e) => {
                info!("Cast {} refused: {e}", ticket.id);
                CommitState::Rejected(e)
            }
        }
    }

    fn hash(&self, claimed: Claimed) -> CommitState {
        let request = claimed.ticket.request;
        let salt = UniquenessSalt::generate();
        let hash = hash_vote(
            request.voter_id,
            request.candidate_id,
            request.election_id,
            &salt,
        );
        CommitState::Hashed(Hashed {
            claimed,
            salt,
            hash,
        })
    }

    async fn submit(&self, hashed: Hashed) -> CommitState {
        match self.ledger.submit(&hashed.hash).await {
            Ok(handle) => CommitState::LedgerSubmitted(Submitted { hashed, handle }),
            Err(e) => self.ledger_failed(hashed, e).await,
        }
    }

    async fn confirm(&self, submitted: Submitted) -> CommitState {
        let Submitted { hashed, handle } = submitted;
        match self.ledger.await_confirmation(&handle).await {
            Ok(reference) => CommitState::LedgerConfirmed(Anchored { hashed, reference }),
            Err(e) => self.ledger_failed(hashed, e).await,
        }
    }

    /// Audit the failed attempt, then either back off and go round again with
    /// a fresh salt, or give up and release the pair.
    async fn ledger_failed(&self, hashed: Hashed, err: LedgerError) -> CommitState {
        let tx_hash = err.pending().map(|handle| handle.0.clone());
        let (outcome, reason) = match &err {
            LedgerError::Unavailable { reason, pending } => {
                let outcome = match pending {
                    Some(_) => AttemptOutcome::ConfirmTimedOut {
                        reason: reason.clone(),
                    },
                    None => AttemptOutcome::SubmitFailed {
                        reason: reason.clone(),
                    },
                };
                (outcome, reason.clone())
            }
            LedgerError::Rejected { reason, .. } => (
                AttemptOutcome::Rejected {
                    reason: reason.clone(),
                },
                reason.clone(),
            ),
        };
        self.audit
            .record(attempt_entry(&hashed, tx_hash, outcome))
            .await;

        let Hashed { claimed, .. } = hashed;
        let attempt = claimed.attempt;
        let ticket_id = claimed.ticket.id;

        if !err.is_retryable() {
            warn!("Cast {ticket_id} attempt {attempt} rejected by the ledger: {reason}");
            self.guard.release(&claimed.reservation).await;
            return CommitState::Rejected(CastError::LedgerRejected(reason));
        }

        if self.retry.should_retry(attempt) {
            let delay = self.retry.backoff(attempt);
            warn!("Cast {ticket_id} attempt {attempt} failed, retrying in {delay:?}: {reason}");
            if !delay.is_zero() {
                sleep(delay).await;
            }
            return CommitState::Reserved(Claimed {
                attempt: attempt + 1,
                ..claimed
            });
        }

        warn!("Cast {ticket_id} giving up after {attempt} attempt(s): {reason}");
        self.guard.release(&claimed.reservation).await;
        CommitState::Rejected(CastError::LedgerUnavailable {
            attempts: attempt,
            reason,
        })
    }

    async fn persist(&self, anchored: Anchored) -> CommitState {
        let claimed = &anchored.hashed.claimed;
        let request = claimed.ticket.request;
        let new_vote = NewVote::anchored(
            request.voter_id,
            request.election_id,
            request.candidate_id,
            anchored.hashed.hash,
            &anchored.reference,
        );
        let tx_hash = anchored.reference.tx_hash.clone();

        match self.votes.try_insert_vote(&new_vote).await {
            InsertOutcome::Inserted(vote) => CommitState::Persisted(Recorded { anchored, vote }),
            InsertOutcome::Conflict => {
                error!(
                    "Vote {} anchored in {tx_hash} but voter {} already has a vote in election {}",
                    anchored.hashed.hash, request.voter_id, request.election_id
                );
                self.audit
                    .record(attempt_entry(
                        &anchored.hashed,
                        Some(tx_hash),
                        AttemptOutcome::DuplicateAfterConfirm,
                    ))
                    .await;
                self.guard.release(&claimed.reservation).await;
                CommitState::Rejected(CastError::AlreadyVoted {
                    voter_id: request.voter_id,
                    election_id: request.election_id,
                })
            }
            InsertOutcome::Failed(e) => {
                let reason = e.to_string();
                error!(
                    "Vote {} anchored in {tx_hash} but could not be recorded: {reason}",
                    anchored.hashed.hash
                );
                self.audit
                    .record(attempt_entry(
                        &anchored.hashed,
                        Some(tx_hash.clone()),
                        AttemptOutcome::PersistenceFailed {
                            reason: reason.clone(),
                        },
                    ))
                    .await;
                self.guard.release(&claimed.reservation).await;
                CommitState::Rejected(CastError::ReconciliationRequired { tx_hash, reason })
            }
            InsertOutcome::Unknown(e) => {
                let reason = e.to_string();
                error!(
                    "Vote {} anchored in {tx_hash}, recording it may have failed: {reason}",
                    anchored.hashed.hash
                );
                self.audit
                    .record(attempt_entry(
                        &anchored.hashed,
                        Some(tx_hash.clone()),
                        AttemptOutcome::PersistenceUnknown { reason },
                    ))
                    .await;
                self.guard.hold_unresolved(&claimed.reservation).await;
                CommitState::PendingVerification(PendingVerification {
                    reservation: claimed.reservation.token.to_hex(),
                    vote_hash: anchored.hashed.hash,
                    tx_hash,
                    message: "Your vote was anchored but could not be confirmed as recorded. \
                              It will be verified before you can vote again."
                        .to_string(),
                })
            }
        }
    }

    async fn log(&self, recorded: Recorded) -> CommitState {
        let Recorded { anchored, vote } = recorded;
        let tx_hash = anchored.reference.tx_hash.clone();
        // Best-effort; the vote is already recorded.
        self.audit
            .record(attempt_entry(
                &anchored.hashed,
                Some(tx_hash),
                AttemptOutcome::Committed,
            ))
            .await;
        self.guard.commit(&anchored.hashed.claimed.reservation).await;
        info!(
            "Recorded vote {} for voter {} in election {}",
            vote.vote_hash, vote.voter_id, vote.election_id
        );
        CommitState::Logged(VoteReceipt::from(&vote))
    }
}

fn attempt_entry(
    hashed: &Hashed,
    tx_hash: Option<String>,
    outcome: AttemptOutcome,
) -> AuditLogEntry {
    let claimed = &hashed.claimed;
    let request = claimed.ticket.request;
    AuditLogEntry::store_vote(
        AttemptId::new(&claimed.ticket.id, claimed.attempt),
        tx_hash,
        AttemptPayload {
            voter_id: request.voter_id,
            election_id: request.election_id,
            candidate_id: request.candidate_id,
            vote_hash: hashed.hash,
            salt: hashed.salt.clone(),
            attempt: claimed.attempt,
            outcome,
        },
    )
}
