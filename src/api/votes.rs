use log::info;
use mongodb::bson::oid::ObjectId;
use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::logging::RequestId;
use crate::model::api::receipt::{PendingVerification, VoteReceipt};
use crate::vote::{
    orchestrator::{CastOutcome, CastRequest},
    reconcile::Resolution,
    VoteService,
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, resolve_reservation]
}

#[derive(Responder)]
enum CastResponse {
    #[response(status = 200)]
    Recorded(Json<VoteReceipt>),
    /// The vote was anchored but recording it is unconfirmed.
    #[response(status = 202)]
    Pending(Json<PendingVerification>),
}

#[post("/votes/cast", data = "<request>", format = "json")]
async fn cast_vote(
    request: Json<CastRequest>,
    service: &State<VoteService>,
    id: &RequestId,
) -> Result<CastResponse> {
    let request = request.0;
    info!(
        "req{id} voter {} casting for candidate {} in election {}",
        request.voter_id, request.candidate_id, request.election_id
    );
    let response = match service.orchestrator.cast(request).await? {
        CastOutcome::Recorded(receipt) => CastResponse::Recorded(Json(receipt)),
        CastOutcome::PendingVerification(pending) => CastResponse::Pending(Json(pending)),
    };
    Ok(response)
}

#[post("/reservations/<token>/resolve")]
async fn resolve_reservation(
    token: &str,
    service: &State<VoteService>,
    id: &RequestId,
) -> Result<Json<Resolution>> {
    let token = ObjectId::parse_str(token)?;
    match service.reconciler.resolve_pending(&token).await? {
        Resolution::NotFound => Err(Error::NotFound(format!("Reservation {token}"))),
        resolution => {
            info!("req{id} resolved reservation {token}: {resolution:?}");
            Ok(Json(resolution))
        }
    }
}
