use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;
use crate::vote::{
    ledger::Ledger, retry::RetryPolicy, rpc::RpcLedger, Collaborators, VoteService,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    ledger_max_attempts: u32,
    ledger_backoff_ms: u64,
    ledger_backoff_max_ms: u64,
    ledger_submit_timeout: u64,
    ledger_confirm_timeout: u64,
    ledger_poll_interval_ms: u64,
}

impl Config {
    /// How many ledger attempts a cast request may make, and how long to wait
    /// between them.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.ledger_max_attempts.max(1),
            base_delay: Duration::from_millis(self.ledger_backoff_ms),
            max_delay: Duration::from_millis(self.ledger_backoff_max_ms),
        }
    }

    /// Deadline for handing a hash to the ledger, in seconds.
    pub fn ledger_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_submit_timeout)
    }

    /// Deadline for a submitted hash to be confirmed, in seconds.
    pub fn ledger_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_confirm_timeout)
    }

    /// How often to poll for a transaction receipt.
    pub fn ledger_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_poll_interval_ms)
    }

    /// The longest a single cast request can keep its reservation held:
    /// every attempt running to both deadlines, with the longest backoff.
    pub fn cast_deadline(&self) -> Duration {
        let retry = self.retry_policy();
        let per_attempt =
            self.ledger_submit_timeout() + self.ledger_confirm_timeout() + retry.max_delay;
        per_attempt.saturating_mul(retry.max_attempts)
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        Ok(rocket.manage(config))
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the indexes the protocol relies on exist, and places both a
/// `Client` and a `Database` into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(DATABASE_NAME);

        // Uniqueness of reservations and votes depends on these.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        Ok(rocket.manage(client).manage(db))
    }
}

const DATABASE_NAME: &str = "chainvote";

/// Configuration for the ledger node.
#[derive(Deserialize)]
struct LedgerConfig {
    ledger_rpc_url: String,
    ledger_contract_address: String,
    ledger_sender_address: String,
}

/// A fairing that loads the ledger config and places an `Arc<dyn Ledger>`
/// talking JSON-RPC to the configured node into managed state.
/// Must be attached after [`ConfigFairing`].
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<LedgerConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load ledger config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let poll_interval = rocket.state::<Config>().map(Config::ledger_poll_interval);
        let Some(poll_interval) = poll_interval else {
            error!("Ledger fairing attached before config fairing");
            return Err(rocket);
        };
        let ledger = match RpcLedger::new(
            config.ledger_rpc_url,
            config.ledger_contract_address,
            config.ledger_sender_address,
            poll_interval,
        ) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Failed to construct ledger client: {e}");
                return Err(rocket);
            }
        };
        Ok(rocket.manage(Arc::new(ledger) as Arc<dyn Ledger>))
    }
}

/// A fairing that assembles the commit protocol from the managed database,
/// ledger and config, and places the resulting [`VoteService`] into managed
/// state. Must be attached after the other fairings in this module.
pub struct VoteServiceFairing;

#[rocket::async_trait]
impl Fairing for VoteServiceFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote service",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let service = match (
            rocket.state::<Config>(),
            rocket.state::<Database>(),
            rocket.state::<Arc<dyn Ledger>>(),
        ) {
            (Some(config), Some(db), Some(ledger)) => Some(VoteService::new(
                Collaborators::mongodb(db),
                ledger.clone(),
                config,
            )),
            _ => None,
        };
        let Some(service) = service else {
            error!("Vote service requires config, database and ledger to be managed first");
            return Err(rocket);
        };
        info!("Vote service ready");
        Ok(rocket.manage(service))
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        /// No backoff and short deadlines, so failure paths run quickly.
        pub fn example() -> Self {
            Self {
                ledger_max_attempts: 3,
                ledger_backoff_ms: 0,
                ledger_backoff_max_ms: 0,
                ledger_submit_timeout: 1,
                ledger_confirm_timeout: 1,
                ledger_poll_interval_ms: 10,
            }
        }
    }
}
