use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Public key of the party that signed a call.
///
/// The host authenticates the signature before any program operation runs, so
/// holding a `CallerIdentity` inside an operation means the call was
/// authorized by that key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerIdentity(B256);

impl CallerIdentity {
    pub const fn new(bytes: [u8; 32]) -> Self {
        CallerIdentity(B256::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// Returns the key as a lowercase hex string without prefix.
    pub fn to_hex_string(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for CallerIdentity {
    fn from(bytes: [u8; 32]) -> Self {
        CallerIdentity::new(bytes)
    }
}

impl From<B256> for CallerIdentity {
    fn from(key: B256) -> Self {
        CallerIdentity(key)
    }
}

impl FromStr for CallerIdentity {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(CallerIdentity::new(bytes))
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex_string())
    }
}

/// The remote signer and chain a proof must be anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Client type used on peptide to generate the proof. It is part of the proof key
    pub client_type: String,
    /// Known signer address that signed the peptide state root
    pub signer_addr: Address,
    /// Peptide chain ID included in the signed digest
    pub peptide_chain_id: u64,
}

/// An event decoded out of a proof that passed verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Chain the event was emitted on
    pub chain_id: u64,
    /// Contract that emitted the event
    pub emitting_contract: Address,
    /// Indexed topics, in log order
    pub topics: Vec<B256>,
    /// Unindexed (ABI-encoded) event data
    pub unindexed_data: Bytes,
}

/// Published by the program every time a proof validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateEventEvent {
    pub chain_id: u64,
    pub emitting_contract: Address,
    pub topics: Vec<B256>,
    pub unindexed_data: Bytes,
}

impl From<&DecodedEvent> for ValidateEventEvent {
    fn from(event: &DecodedEvent) -> Self {
        ValidateEventEvent {
            chain_id: event.chain_id,
            emitting_contract: event.emitting_contract,
            topics: event.topics.clone(),
            unindexed_data: event.unindexed_data.clone(),
        }
    }
}
