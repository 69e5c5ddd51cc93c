//! Caller side of the program: the account keys a caller presents, a client
//! trait over the program and a forwarding client that relays calls on behalf
//! of its own callers.
//!
//! A relay only ever passes on authorizations its callers signed. It cannot
//! act for a caller on its own, since it holds no key of theirs.

use crate::{
    error::ProverResult,
    program::ProverProgram,
    state::ValidateEventResult,
    store::AccountStore,
    verifier::EventVerifier,
};
use async_trait::async_trait;
use polymer_prover_primitives::{
    CallerAuthorization, CallerIdentity, CallerKey, Operation, StorageKey,
};
use std::sync::Arc;
use tracing::{error, info};

/// Accounts passed along with a cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAccounts {
    /// Identity the call is made by
    pub authority: CallerIdentity,
    pub cache: StorageKey,
    pub result: StorageKey,
}

impl ProgramAccounts {
    /// The accounts owned by `authority`.
    pub fn for_caller(authority: CallerIdentity) -> Self {
        ProgramAccounts {
            authority,
            cache: StorageKey::cache(&authority),
            result: StorageKey::result(&authority),
        }
    }
}

#[async_trait]
pub trait ProofCacheClient: Send + Sync {
    async fn load_proof(
        &self,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize>;

    async fn validate_event(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult>;

    /// Nonce the next authorization of `identity` has to carry.
    async fn nonce(&self, identity: &CallerIdentity) -> ProverResult<u64>;

    /// Uploads `proof` in chunks of at most `chunk_size` bytes, in order,
    /// signing each chunk with `key`.
    async fn load_proof_chunked(
        &self,
        key: &CallerKey,
        proof: &[u8],
        chunk_size: usize,
    ) -> ProverResult<usize> {
        let accounts = ProgramAccounts::for_caller(key.identity());
        let mut cached = 0;
        for chunk in proof.chunks(chunk_size.max(1)) {
            let nonce = self.nonce(&accounts.authority).await?;
            let auth = key.authorize(Operation::LoadProof, nonce, chunk)?;
            cached = self.load_proof(&accounts, chunk, &auth).await?;
        }
        Ok(cached)
    }
}

#[async_trait]
impl<S, V> ProofCacheClient for ProverProgram<S, V>
where
    S: AccountStore,
    V: EventVerifier,
{
    async fn load_proof(
        &self,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize> {
        ProverProgram::load_proof(self, accounts, chunk, auth).await
    }

    async fn validate_event(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        ProverProgram::validate_event(self, accounts, auth).await
    }

    async fn nonce(&self, identity: &CallerIdentity) -> ProverResult<u64> {
        ProverProgram::nonce(self, identity).await
    }
}

/// Relays cache operations to the prover under the identity of the original
/// caller, together with the caller's authorization. It holds no state and
/// adds no checks of its own, so the prover sees exactly what a direct call
/// would have presented.
pub struct ForwardingClient<C> {
    prover: Arc<C>,
}

impl<C: ProofCacheClient> ForwardingClient<C> {
    pub fn new(prover: Arc<C>) -> Self {
        ForwardingClient { prover }
    }

    pub async fn call_load_proof(
        &self,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize> {
        self.prover.load_proof(accounts, chunk, auth).await
    }

    pub async fn call_validate_event(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        let result = self.prover.validate_event(accounts, auth).await;
        match &result {
            Ok(ValidateEventResult::Valid(event)) => info!(
                target: "polymer_prover::client",
                "proof validated: chain_id: {}, emitting_contract: {}",
                event.chain_id,
                event.emitting_contract
            ),
            Ok(ValidateEventResult::Invalid(err)) => {
                info!(target: "polymer_prover::client", "proof rejected: {}", err)
            }
            Err(err) => error!(target: "polymer_prover::client", "prover returned error: {}", err),
        }
        result
    }
}

#[async_trait]
impl<C: ProofCacheClient> ProofCacheClient for ForwardingClient<C> {
    async fn load_proof(
        &self,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize> {
        self.call_load_proof(accounts, chunk, auth).await
    }

    async fn validate_event(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        self.call_validate_event(accounts, auth).await
    }

    async fn nonce(&self, identity: &CallerIdentity) -> ProverResult<u64> {
        self.prover.nonce(identity).await
    }
}
