//! A [`Ledger`] backed by an Ethereum-style JSON-RPC node and a contract
//! exposing `storeVote(bytes32)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use reqwest::Client;
use rocket::serde::json::{json, Value};
use rocket::tokio::time::{sleep, Instant};
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use super::{
    hasher::VoteHash,
    ledger::{Confirmation, Ledger, LedgerReference, PendingHandle, SubmitError},
};

const STORE_VOTE_SIGNATURE: &str = "storeVote(bytes32)";

/// ABI-encoded call data for `storeVote(hash)`: the 4-byte function selector
/// followed by the hash as a single 32-byte word.
pub fn store_vote_calldata(hash: &VoteHash) -> String {
    let selector = Keccak256::digest(STORE_VOTE_SIGNATURE.as_bytes());
    format!(
        "0x{}{}",
        HEXLOWER.encode(&selector[..4]),
        HEXLOWER.encode(hash.as_bytes())
    )
}

#[derive(Debug, Error)]
enum RpcError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Node { code: i64, message: String },
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Transaction receipt fields we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

fn parse_quantity(quantity: &str) -> Option<u64> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16).ok()
}

pub struct RpcLedger {
    client: Client,
    url: String,
    contract: String,
    sender: String,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(
        url: impl Into<String>,
        contract: impl Into<String>,
        sender: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self, reqwest::Error> {
        let url = url.into();
        info!("Using JSON-RPC ledger at {url}");
        Ok(Self {
            client: Client::builder().build()?,
            url,
            contract: contract.into(),
            sender: sender.into(),
            poll_interval,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Option<Value>, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse>()
            .await?;
        match response.error {
            Some(RpcErrorBody { code, message }) => Err(RpcError::Node { code, message }),
            None => Ok(response.result),
        }
    }
}

#[rocket::async_trait]
impl Ledger for RpcLedger {
    async fn submit(&self, hash: &VoteHash) -> Result<PendingHandle, SubmitError> {
        let transaction = json!({
            "from": self.sender,
            "to": self.contract,
            "data": store_vote_calldata(hash),
        });
        match self.call("eth_sendTransaction", json!([transaction])).await {
            Ok(Some(Value::String(tx_hash))) => {
                debug!("Submitted {hash} in transaction {tx_hash}");
                Ok(PendingHandle(tx_hash))
            }
            Ok(other) => Err(SubmitError::Unavailable(format!(
                "unexpected eth_sendTransaction result {other:?}"
            ))),
            Err(e @ RpcError::Transport(_)) => Err(SubmitError::Unavailable(e.to_string())),
            Err(e @ RpcError::Node { .. }) => Err(SubmitError::Rejected(e.to_string())),
        }
    }

    async fn confirm(&self, handle: &PendingHandle, timeout: Duration) -> Confirmation {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .call("eth_getTransactionReceipt", json!([handle.0]))
                .await
            {
                Ok(Some(value)) => match rocket::serde::json::from_value::<Receipt>(value) {
                    Ok(receipt) if receipt.status.as_deref() == Some("0x0") => {
                        return Confirmation::Rejected(format!(
                            "transaction {} reverted",
                            receipt.transaction_hash
                        ));
                    }
                    Ok(receipt) => {
                        return Confirmation::Confirmed(LedgerReference {
                            block_number: receipt.block_number.as_deref().and_then(parse_quantity),
                            tx_hash: receipt.transaction_hash,
                        });
                    }
                    Err(e) => warn!("Malformed receipt for {}: {e}", handle.0),
                },
                // Not mined yet.
                Ok(None) => {}
                Err(e) => debug!("Polling receipt for {} failed: {e}", handle.0),
            }

            let now = Instant::now();
            if now >= deadline {
                return Confirmation::TimedOut;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
