//! In-memory collaborators for tests: a store implementing every store
//! interface, and a ledger that follows a script.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mongodb::bson::oid::ObjectId;

use crate::model::{
    api::results::CandidateTally,
    common::{
        election::{CandidateId, ElectionId},
        voter::{VoterId, VoterStatus},
    },
    db::{
        audit::AuditLogEntry,
        election::{Candidate, Election},
        reservation::{Reservation, ReservationState},
        vote::{NewVote, Vote},
        voter::Voter,
    },
};

use super::{
    audit::AuditSink,
    guard::{ReservationStore, ReserveOutcome},
    hasher::VoteHash,
    ledger::{Confirmation, Ledger, LedgerReference, PendingHandle, SubmitError},
    store::{
        ElectionStore, InsertOutcome, ResultQuery, StoreError, VoteStore, VoterStore,
    },
    Collaborators,
};

/// How the next vote inserts should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteInsertFault {
    /// The write definitely did not land.
    Failed,
    /// The caller is told the outcome is unknown; `landed` says what really happened.
    Unknown { landed: bool },
}

fn injected() -> StoreError {
    StoreError::Unavailable("injected fault".to_string())
}

#[derive(Default)]
pub struct MemoryStore {
    voters: Mutex<HashMap<VoterId, Voter>>,
    elections: Mutex<HashMap<ElectionId, Election>>,
    candidates: Mutex<HashMap<CandidateId, Candidate>>,
    votes: Mutex<Vec<Vote>>,
    reservations: Mutex<HashMap<ObjectId, Reservation>>,
    audit: Mutex<Vec<AuditLogEntry>>,
    vote_insert_fault: Mutex<Option<VoteInsertFault>>,
    audit_fault: AtomicBool,
    release_fault: AtomicBool,
}

impl MemoryStore {
    /// The example voters, elections and candidates.
    pub fn seeded() -> Self {
        let store = Self::default();
        {
            let mut voters = store.voters.lock().unwrap();
            for voter in [
                Voter::active_example(),
                Voter::pending_example(),
                Voter::rejected_example(),
            ] {
                voters.insert(voter.id, voter);
            }
            let mut elections = store.elections.lock().unwrap();
            for election in [
                Election::open_example(),
                Election::closed_example(),
                Election::scheduled_example(),
            ] {
                elections.insert(election.id, election);
            }
            let mut candidates = store.candidates.lock().unwrap();
            for candidate in Candidate::examples() {
                candidates.insert(candidate.id, candidate);
            }
        }
        store
    }

    pub fn fail_vote_inserts(&self, fault: Option<VoteInsertFault>) {
        *self.vote_insert_fault.lock().unwrap() = fault;
    }

    pub fn fail_audit_appends(&self, fail: bool) {
        self.audit_fault.store(fail, Ordering::SeqCst);
    }

    pub fn fail_releases(&self, fail: bool) {
        self.release_fault.store(fail, Ordering::SeqCst);
    }

    pub fn votes(&self) -> Vec<Vote> {
        self.votes.lock().unwrap().clone()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.reservations.lock().unwrap().values().cloned().collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.lock().unwrap().clone()
    }

    fn insert_vote(&self, vote: &NewVote) -> Option<Vote> {
        let mut votes = self.votes.lock().unwrap();
        let duplicate = votes.iter().any(|v| {
            (v.voter_id == vote.voter_id && v.election_id == vote.election_id)
                || v.vote_hash == vote.vote_hash
        });
        if duplicate {
            return None;
        }
        let vote = Vote {
            id: ObjectId::new(),
            vote: vote.clone(),
        };
        votes.push(vote.clone());
        Some(vote)
    }
}

#[rocket::async_trait]
impl VoterStore for MemoryStore {
    async fn get_voter(&self, id: VoterId) -> Result<Option<Voter>, StoreError> {
        Ok(self.voters.lock().unwrap().get(&id).cloned())
    }

    async fn get_voter_by_email(&self, email: &str) -> Result<Option<Voter>, StoreError> {
        let voters = self.voters.lock().unwrap();
        Ok(voters.values().find(|v| v.email == email).cloned())
    }

    async fn set_voter_status(
        &self,
        id: VoterId,
        status: VoterStatus,
    ) -> Result<bool, StoreError> {
        match self.voters.lock().unwrap().get_mut(&id) {
            Some(voter) => {
                voter.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn get_election(&self, id: ElectionId) -> Result<Option<Election>, StoreError> {
        Ok(self.elections.lock().unwrap().get(&id).cloned())
    }

    async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError> {
        Ok(self.candidates.lock().unwrap().get(&id).cloned())
    }

    async fn candidates_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Candidate>, StoreError> {
        let mut candidates = self
            .candidates
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn try_insert_vote(&self, vote: &NewVote) -> InsertOutcome<Vote> {
        let fault = *self.vote_insert_fault.lock().unwrap();
        match fault {
            Some(VoteInsertFault::Failed) => InsertOutcome::Failed(injected()),
            Some(VoteInsertFault::Unknown { landed }) => {
                if landed {
                    self.insert_vote(vote);
                }
                InsertOutcome::Unknown(injected())
            }
            None => match self.insert_vote(vote) {
                Some(vote) => InsertOutcome::Inserted(vote),
                None => InsertOutcome::Conflict,
            },
        }
    }

    async fn find_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<Option<Vote>, StoreError> {
        let votes = self.votes.lock().unwrap();
        Ok(votes
            .iter()
            .find(|v| v.voter_id == voter_id && v.election_id == election_id)
            .cloned())
    }

    async fn votes_for_election(&self, election_id: ElectionId) -> Result<Vec<Vote>, StoreError> {
        let votes = self.votes.lock().unwrap();
        Ok(votes
            .iter()
            .filter(|v| v.election_id == election_id)
            .cloned()
            .collect())
    }
}

#[rocket::async_trait]
impl ResultQuery for MemoryStore {
    async fn tally(&self, election_id: ElectionId) -> Result<Vec<CandidateTally>, StoreError> {
        let mut counts = HashMap::new();
        for vote in self.votes_for_election(election_id).await? {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        let candidates = self.candidates_for_election(election_id).await?;
        Ok(CandidateTally::rank(candidates, &counts))
    }
}

#[rocket::async_trait]
impl ReservationStore for MemoryStore {
    async fn try_reserve(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut reservations = self.reservations.lock().unwrap();
        if reservations
            .values()
            .any(|r| r.voter_id == voter_id && r.election_id == election_id)
        {
            return Ok(ReserveOutcome::Conflict);
        }
        let reservation = Reservation::new(voter_id, election_id);
        reservations.insert(reservation.token, reservation.clone());
        Ok(ReserveOutcome::Reserved(reservation))
    }

    async fn release(&self, token: &ObjectId) -> Result<(), StoreError> {
        if self.release_fault.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut reservations = self.reservations.lock().unwrap();
        if let Some(reservation) = reservations.get(token) {
            if reservation.state != ReservationState::Committed {
                reservations.remove(token);
            }
        }
        Ok(())
    }

    async fn settle(&self, token: &ObjectId, state: ReservationState) -> Result<(), StoreError> {
        if let Some(reservation) = self.reservations.lock().unwrap().get_mut(token) {
            reservation.state = state;
        }
        Ok(())
    }

    async fn get_reservation(&self, token: &ObjectId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.lock().unwrap().get(token).cloned())
    }

    async fn unsettled_reservations(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let reservations = self.reservations.lock().unwrap();
        Ok(reservations
            .values()
            .filter(|r| r.election_id == election_id && r.state != ReservationState::Committed)
            .cloned()
            .collect())
    }
}

#[rocket::async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        if self.audit_fault.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut audit = self.audit.lock().unwrap();
        if !audit.iter().any(|e| e.attempt_id == entry.attempt_id) {
            audit.push(entry.clone());
        }
        Ok(())
    }

    async fn entries_for_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let audit = self.audit.lock().unwrap();
        Ok(audit
            .iter()
            .filter(|e| e.payload.election_id == election_id)
            .cloned()
            .collect())
    }
}

/// Every collaborator backed by the same in-memory store.
pub fn collaborators(store: &Arc<MemoryStore>) -> Collaborators {
    Collaborators {
        voters: store.clone(),
        elections: store.clone(),
        votes: store.clone(),
        reservations: store.clone(),
        audit: store.clone(),
        results: store.clone(),
    }
}

/// What the next confirmation wait reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmScript {
    Confirm,
    TimeOut,
    Revert(String),
}

/// A ledger that fails as scripted, then succeeds. Every submission gets a
/// fresh transaction hash; every successful confirmation lands in block 1.
#[derive(Default)]
pub struct ScriptedLedger {
    submissions: Mutex<VecDeque<SubmitError>>,
    confirmations: Mutex<VecDeque<ConfirmScript>>,
    submitted: Mutex<Vec<VoteHash>>,
    counter: AtomicU64,
}

impl ScriptedLedger {
    /// Fail the next submissions with these errors, in order.
    pub fn failing_submissions(self, errors: impl IntoIterator<Item = SubmitError>) -> Self {
        self.submissions.lock().unwrap().extend(errors);
        self
    }

    /// Answer the next confirmation waits like this, in order.
    pub fn confirming(self, script: impl IntoIterator<Item = ConfirmScript>) -> Self {
        self.confirmations.lock().unwrap().extend(script);
        self
    }

    /// Every hash successfully submitted so far.
    pub fn submitted(&self) -> Vec<VoteHash> {
        self.submitted.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl Ledger for ScriptedLedger {
    async fn submit(&self, hash: &VoteHash) -> Result<PendingHandle, SubmitError> {
        if let Some(error) = self.submissions.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.submitted.lock().unwrap().push(*hash);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PendingHandle(format!("0x{n:064x}")))
    }

    async fn confirm(&self, handle: &PendingHandle, _timeout: Duration) -> Confirmation {
        let script = self.confirmations.lock().unwrap().pop_front();
        match script.unwrap_or(ConfirmScript::Confirm) {
            ConfirmScript::Confirm => Confirmation::Confirmed(LedgerReference {
                tx_hash: handle.0.clone(),
                block_number: Some(1),
            }),
            ConfirmScript::TimeOut => Confirmation::TimedOut,
            ConfirmScript::Revert(reason) => Confirmation::Rejected(reason),
        }
    }
}
