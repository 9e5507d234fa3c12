use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::model::common::{
    election::{CandidateId, ElectionId},
    voter::VoterId,
};

/// Length in bytes of a vote hash.
pub const HASH_LEN: usize = 32;

/// The Keccak-256 digest of one vote attempt. This is the value anchored on the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VoteHash([u8; HASH_LEN]);

impl VoteHash {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex, as the ledger expects a `bytes32`.
    pub fn to_hex(&self) -> String {
        format!("0x{}", HEXLOWER.encode(&self.0))
    }
}

impl Display for VoteHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    #[error("Vote hash is not valid hex")]
    Encoding,
    #[error("Vote hash has {0} bytes, expected 32")]
    Length(usize),
}

impl FromStr for VoteHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = HEXLOWER_PERMISSIVE
            .decode(digits.as_bytes())
            .map_err(|_| HashParseError::Encoding)?;
        let bytes: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| HashParseError::Length(b.len()))?;
        Ok(Self(bytes))
    }
}

impl From<VoteHash> for String {
    fn from(hash: VoteHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for VoteHash {
    type Error = HashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A value mixed into a vote hash solely so that every attempt anchors a
/// distinct digest, even for identical vote content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniquenessSalt(String);

impl UniquenessSalt {
    /// Wrap a known salt, e.g. one read back from the audit log.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A fresh salt: nanosecond timestamp, process-wide sequence number, and a
    /// random nonce to separate server instances.
    pub fn generate() -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nonce: u32 = rand::random();
        Self(format!("{nanos}.{sequence}.{nonce:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UniquenessSalt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a vote attempt. Pure; recomputing with the recorded salt reproduces
/// the anchored digest.
pub fn hash_vote(
    voter_id: VoterId,
    candidate_id: CandidateId,
    election_id: ElectionId,
    salt: &UniquenessSalt,
) -> VoteHash {
    let encoded = format!("{voter_id}|{candidate_id}|{election_id}|{salt}");
    VoteHash(Keccak256::digest(encoded.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_salt_same_hash() {
        let salt = UniquenessSalt::new("1700000000000000000.7.0000beef");
        assert_eq!(hash_vote(1, 100, 10, &salt), hash_vote(1, 100, 10, &salt));
    }

    #[test]
    fn different_salts_different_hashes() {
        let first = UniquenessSalt::generate();
        let second = UniquenessSalt::generate();
        assert_ne!(first, second);
        assert_ne!(hash_vote(1, 100, 10, &first), hash_vote(1, 100, 10, &second));
    }

    #[test]
    fn fields_are_delimited() {
        // Without delimiters "1|23" and "12|3" would encode identically.
        let salt = UniquenessSalt::new("0");
        assert_ne!(hash_vote(1, 23, 4, &salt), hash_vote(12, 3, 4, &salt));
    }

    #[test]
    fn hex_form() {
        let hash = hash_vote(1, 100, 10, &UniquenessSalt::new("salt"));
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 2 + 2 * HASH_LEN);
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.parse::<VoteHash>(), Ok(hash));
        assert_eq!(hex.to_uppercase().replace("0X", "0x").parse::<VoteHash>(), Ok(hash));
        assert_eq!("0x1234".parse::<VoteHash>(), Err(HashParseError::Length(2)));
        assert_eq!("0xzz".parse::<VoteHash>(), Err(HashParseError::Encoding));
    }
}
