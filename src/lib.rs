#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, LedgerFairing, VoteServiceFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod vote;

pub use config::Config;

/// Assemble the server. Fairings run on ignite in attachment order, and each
/// depends on the state managed by those before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LedgerFairing)
        .attach(VoteServiceFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
}
