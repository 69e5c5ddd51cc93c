//! Records persisted by the program.

use crate::error::{ProverError, ProverResult};
use alloy_primitives::{Address, Bytes, B256};
use polymer_prover_primitives::{CallerIdentity, DecodedEvent, TrustAnchor, VerifyError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Singleton record holding the trust anchor of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAccount {
    /// Identity that initialized the program
    pub authority: CallerIdentity,
    /// Client type used on peptide to generate the proof. It is part of the proof key
    pub client_type: String,
    /// Known signer address that signed the peptide state root
    pub signer_addr: Address,
    /// Peptide chain ID included in the proof
    pub peptide_chain_id: u64,
}

impl ConfigAccount {
    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor {
            client_type: self.client_type.clone(),
            signer_addr: self.signer_addr,
            peptide_chain_id: self.peptide_chain_id,
        }
    }
}

/// Per-caller buffer the proof chunks are appended to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofCacheAccount {
    /// Maximum number of bytes the cache accepts
    pub capacity: u32,
    /// Storage deposit held for this cache and its result record
    pub deposit: u64,
    pub cache: Bytes,
}

impl ProofCacheAccount {
    pub fn new(capacity: u32, deposit: u64) -> Self {
        ProofCacheAccount {
            capacity,
            deposit,
            cache: Bytes::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Appends `chunk`, or leaves the cache untouched if it would not fit.
    pub fn append(&mut self, chunk: &[u8]) -> ProverResult<()> {
        let total = self.cache.len().saturating_add(chunk.len());
        if total > self.capacity as usize {
            return Err(ProverError::CacheCapacityExceeded {
                cached: self.cache.len(),
                chunk: chunk.len(),
                capacity: self.capacity,
            });
        }

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&self.cache);
        buf.extend_from_slice(chunk);
        self.cache = buf.into();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.cache = Bytes::new();
    }
}

/// Outcome of the most recent validation of a caller.
///
/// Every validation overwrites all the fields, so a failure never leaves the
/// decoded fields of an earlier success behind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultAccount {
    pub is_valid: bool,
    /// Verifier message, empty when the proof is valid
    pub error_message: String,
    pub chain_id: u64,
    pub emitting_contract: Address,
    pub topics: Vec<B256>,
    pub unindexed_data: Bytes,
}

impl ResultAccount {
    pub fn valid(event: &DecodedEvent) -> Self {
        ResultAccount {
            is_valid: true,
            error_message: String::new(),
            chain_id: event.chain_id,
            emitting_contract: event.emitting_contract,
            topics: event.topics.clone(),
            unindexed_data: event.unindexed_data.clone(),
        }
    }

    pub fn invalid(err: &VerifyError) -> Self {
        ResultAccount {
            is_valid: false,
            error_message: err.to_string(),
            ..Default::default()
        }
    }

    /// The decoded event, if the last validation succeeded.
    pub fn event(&self) -> Option<DecodedEvent> {
        self.is_valid.then(|| DecodedEvent {
            chain_id: self.chain_id,
            emitting_contract: self.emitting_contract,
            topics: self.topics.clone(),
            unindexed_data: self.unindexed_data.clone(),
        })
    }
}

/// Value handed back to whoever invoked a validation, directly or through a
/// forwarding client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateEventResult {
    Valid(DecodedEvent),
    Invalid(VerifyError),
}

impl ValidateEventResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidateEventResult::Valid(_))
    }
}

impl From<&ValidateEventResult> for ResultAccount {
    fn from(result: &ValidateEventResult) -> Self {
        match result {
            ValidateEventResult::Valid(event) => ResultAccount::valid(event),
            ValidateEventResult::Invalid(err) => ResultAccount::invalid(err),
        }
    }
}

impl fmt::Display for ValidateEventResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidateEventResult::Valid(..) => write!(f, "proof is valid"),
            ValidateEventResult::Invalid(err) => write!(f, "{}", err),
        }
    }
}
