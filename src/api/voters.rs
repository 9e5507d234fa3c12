use log::info;
use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::voter::VoterDescription,
    common::voter::{VoterId, VoterStatus},
};
use crate::vote::VoteService;

pub fn routes() -> Vec<Route> {
    routes![voter_by_email, approve_voter, reject_voter]
}

#[get("/voters?<email>")]
async fn voter_by_email(
    email: &str,
    service: &State<VoteService>,
) -> Result<Json<VoterDescription>> {
    let voter = service
        .collaborators
        .voters
        .get_voter_by_email(email)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Voter with email '{email}'")))?;
    Ok(Json(voter.into()))
}

#[post("/voters/<voter_id>/approve")]
async fn approve_voter(
    voter_id: VoterId,
    service: &State<VoteService>,
) -> Result<Json<VoterDescription>> {
    set_status(service, voter_id, VoterStatus::Active).await
}

#[post("/voters/<voter_id>/reject")]
async fn reject_voter(
    voter_id: VoterId,
    service: &State<VoteService>,
) -> Result<Json<VoterDescription>> {
    set_status(service, voter_id, VoterStatus::Rejected).await
}

async fn set_status(
    service: &VoteService,
    voter_id: VoterId,
    status: VoterStatus,
) -> Result<Json<VoterDescription>> {
    let voters = &service.collaborators.voters;
    let not_found = || Error::NotFound(format!("Voter with ID '{voter_id}'"));
    if !voters.set_voter_status(voter_id, status).await? {
        return Err(not_found());
    }
    info!("Voter {voter_id} is now {status:?}");
    let voter = voters.get_voter(voter_id).await?.ok_or_else(not_found)?;
    Ok(Json(voter.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::http::{ContentType, Status};

    use super::*;

    use crate::api::testing::client;
    use crate::vote::memory::{MemoryStore, ScriptedLedger};

    #[rocket::async_test]
    async fn lookup_by_email() {
        let store = Arc::new(MemoryStore::seeded());
        let client = client(&store, Arc::new(ScriptedLedger::default())).await;

        let response = client
            .get(uri!(voter_by_email("ada@example.org")))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let voter = response.into_json::<VoterDescription>().await.unwrap();
        assert_eq!(voter.id, 1);
        assert_eq!(voter.status, VoterStatus::Active);

        let response = client
            .get(uri!(voter_by_email("nobody@example.org")))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[rocket::async_test]
    async fn approval_grants_the_vote() {
        let store = Arc::new(MemoryStore::seeded());
        let client = client(&store, Arc::new(ScriptedLedger::default())).await;
        let cast = || {
            client
                .post("/votes/cast")
                .header(ContentType::JSON)
                .body(r#"{"voter_id": 2, "election_id": 10, "candidate_id": 100}"#)
        };

        assert_eq!(Status::BadRequest, cast().dispatch().await.status());

        let response = client.post(uri!(approve_voter(2))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let voter = response.into_json::<VoterDescription>().await.unwrap();
        assert_eq!(voter.status, VoterStatus::Active);

        assert_eq!(Status::Ok, cast().dispatch().await.status());
    }

    #[rocket::async_test]
    async fn rejection_revokes_the_vote() {
        let store = Arc::new(MemoryStore::seeded());
        let client = client(&store, Arc::new(ScriptedLedger::default())).await;

        let response = client.post(uri!(reject_voter(1))).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let response = client
            .post("/votes/cast")
            .header(ContentType::JSON)
            .body(r#"{"voter_id": 1, "election_id": 10, "candidate_id": 100}"#)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client.post(uri!(reject_voter(99))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
