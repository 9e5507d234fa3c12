use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::{dump::LedgerDump, results::ElectionResults},
    common::election::ElectionId,
    db::election::Election,
};
use crate::vote::{reconcile::ReconciliationReport, VoteService};

pub fn routes() -> Vec<Route> {
    routes![election_results, election_reconciliation, election_dump]
}

async fn election_by_id(service: &VoteService, election_id: ElectionId) -> Result<Election> {
    service
        .collaborators
        .elections
        .get_election(election_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Election with ID '{election_id}'")))
}

#[get("/elections/<election_id>/results")]
async fn election_results(
    election_id: ElectionId,
    service: &State<VoteService>,
) -> Result<Json<ElectionResults>> {
    let election = election_by_id(service, election_id).await?;
    let tallies = service.collaborators.results.tally(election_id).await?;
    Ok(Json(ElectionResults::new(election, tallies)))
}

#[get("/elections/<election_id>/reconciliation")]
async fn election_reconciliation(
    election_id: ElectionId,
    service: &State<VoteService>,
) -> Result<Json<ReconciliationReport>> {
    election_by_id(service, election_id).await?;
    let report = service.reconciler.report(election_id).await?;
    Ok(Json(report))
}

/// Everything needed to run the reconciliation offline.
#[get("/elections/<election_id>/dump")]
async fn election_dump(
    election_id: ElectionId,
    service: &State<VoteService>,
) -> Result<Json<LedgerDump>> {
    election_by_id(service, election_id).await?;
    let dump = service.reconciler.dump(election_id).await?;
    Ok(Json(dump))
}
