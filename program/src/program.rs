use crate::{
    client::ProgramAccounts,
    config::ProgramConfig,
    error::{ProverError, ProverResult},
    state::{ConfigAccount, ProofCacheAccount, ResultAccount, ValidateEventResult},
    store::{AccountStore, CallerLock, WriteBatch},
    verifier::{EventVerifier, PolymerVerifier},
};
use alloy_primitives::Address;
use polymer_prover_primitives::{
    AuthError, CallerAuthorization, CallerIdentity, Operation, StorageKey, TrustAnchor,
    ValidateEventEvent,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Result of `resize_proof_cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOutcome {
    pub old_capacity: u32,
    pub new_capacity: u32,
    /// Positive when the caller paid more deposit, negative when some was returned
    pub deposit_delta: i128,
}

/// The prover program bound to a storage backend and a verifier.
///
/// Every operation is a single all-or-nothing transition: preconditions are
/// checked first, and all writes are committed as one batch at the end.
/// Operations that touch per-caller records hold that caller's lock while they
/// run, so operations of one caller are serialized while different callers
/// proceed in parallel.
///
/// Each of those operations takes a [`CallerAuthorization`] signed by the
/// caller for that operation, its payload and the caller's current nonce. A
/// successful operation moves the nonce on in the same batch, so an
/// authorization is good for one call only.
pub struct ProverProgram<S, V = PolymerVerifier> {
    store: Arc<S>,
    verifier: V,
    config: ProgramConfig,
    events: broadcast::Sender<ValidateEventEvent>,
}

impl<S: AccountStore> ProverProgram<S, PolymerVerifier> {
    pub fn with_store(store: Arc<S>, config: ProgramConfig) -> Self {
        Self::new(store, PolymerVerifier, config)
    }
}

impl<S, V> ProverProgram<S, V>
where
    S: AccountStore,
    V: EventVerifier,
{
    pub fn new(store: Arc<S>, verifier: V, config: ProgramConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            verifier,
            config,
            events,
        }
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribes to the events published by successful validations.
    pub fn subscribe(&self) -> broadcast::Receiver<ValidateEventEvent> {
        self.events.subscribe()
    }

    /// Stores the trust anchor. Fails if the program was already initialized,
    /// whoever the caller is.
    pub async fn initialize(
        &self,
        authority: &CallerIdentity,
        client_type: String,
        signer_addr: Address,
        peptide_chain_id: u64,
    ) -> ProverResult<()> {
        let config = ConfigAccount {
            authority: *authority,
            client_type,
            signer_addr,
            peptide_chain_id,
        };

        if !self.store.create_config(&config).await? {
            warn!(target: "polymer_prover::program", "rejected re-initialization by {}", authority);
            return Err(ProverError::AlreadyInitialized);
        }

        info!(target: "polymer_prover::program", "client_type: {}", config.client_type);
        info!(target: "polymer_prover::program", "peptide_chain_id: {}", config.peptide_chain_id);
        info!(target: "polymer_prover::program", "signer_addr: {}", config.signer_addr);
        Ok(())
    }

    pub async fn read_config(&self) -> ProverResult<Option<ConfigAccount>> {
        Ok(self.store.read_config().await?)
    }

    pub async fn proof_cache(
        &self,
        identity: &CallerIdentity,
    ) -> ProverResult<Option<ProofCacheAccount>> {
        Ok(self.store.read_cache(&StorageKey::cache(identity)).await?)
    }

    pub async fn validation_result(
        &self,
        identity: &CallerIdentity,
    ) -> ProverResult<Option<ResultAccount>> {
        Ok(self.store.read_result(&StorageKey::result(identity)).await?)
    }

    /// Nonce the next authorization of `identity` has to be signed with.
    pub async fn nonce(&self, identity: &CallerIdentity) -> ProverResult<u64> {
        Ok(self
            .store
            .read_nonce(&StorageKey::nonce(identity))
            .await?
            .unwrap_or(0))
    }

    /// Provisions an empty proof cache and result record for the authorizing
    /// caller. Returns the deposit charged for them.
    pub async fn create_accounts(&self, auth: &CallerAuthorization) -> ProverResult<u64> {
        auth.verify(Operation::CreateAccounts, &[])?;
        let lock = self.acquire_lock(&auth.identity).await?;
        let result = self.create_accounts_locked(&lock, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn create_accounts_locked(
        &self,
        lock: &CallerLock,
        auth: &CallerAuthorization,
    ) -> ProverResult<u64> {
        let authority = &auth.identity;
        let next_nonce = self.check_nonce(auth).await?;
        let accounts = ProgramAccounts::for_caller(*authority);
        if self.store.read_cache(&accounts.cache).await?.is_some() {
            return Err(ProverError::AccountAlreadyExists(accounts.cache));
        }
        if self.store.read_result(&accounts.result).await?.is_some() {
            return Err(ProverError::AccountAlreadyExists(accounts.result));
        }

        let capacity = self.config.cache_capacity;
        let deposit = self.config.deposit_for(capacity);
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_cache(accounts.cache, ProofCacheAccount::new(capacity, deposit))
                    .put_result(accounts.result, ResultAccount::default())
                    .put_nonce(StorageKey::nonce(authority), next_nonce),
            )
            .await?;

        info!(
            target: "polymer_prover::program",
            "proof accounts successfully created for {} (capacity {}, deposit {})",
            authority,
            capacity,
            deposit
        );
        Ok(deposit)
    }

    /// Removes the proof cache and result record of the authorizing caller and
    /// returns the deposit that was held for them. The nonce record stays, so
    /// authorizations signed before the close cannot be replayed later.
    pub async fn close_accounts(&self, auth: &CallerAuthorization) -> ProverResult<u64> {
        auth.verify(Operation::CloseAccounts, &[])?;
        let lock = self.acquire_lock(&auth.identity).await?;
        let result = self.close_accounts_locked(&lock, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn close_accounts_locked(
        &self,
        lock: &CallerLock,
        auth: &CallerAuthorization,
    ) -> ProverResult<u64> {
        let authority = &auth.identity;
        let next_nonce = self.check_nonce(auth).await?;
        let accounts = ProgramAccounts::for_caller(*authority);
        let cache = self.existing_cache(&accounts.cache).await?;
        self.existing_result(&accounts.result).await?;

        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .delete(accounts.cache)
                    .delete(accounts.result)
                    .put_nonce(StorageKey::nonce(authority), next_nonce),
            )
            .await?;

        info!(
            target: "polymer_prover::program",
            "proof accounts successfully closed for {}, returned deposit {}",
            authority,
            cache.deposit
        );
        Ok(cache.deposit)
    }

    /// Brings the capacity of an existing cache to the capacity of this
    /// deployment, keeping its content.
    pub async fn resize_proof_cache(
        &self,
        auth: &CallerAuthorization,
    ) -> ProverResult<ResizeOutcome> {
        auth.verify(Operation::ResizeProofCache, &[])?;
        let lock = self.acquire_lock(&auth.identity).await?;
        let result = self.resize_proof_cache_locked(&lock, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn resize_proof_cache_locked(
        &self,
        lock: &CallerLock,
        auth: &CallerAuthorization,
    ) -> ProverResult<ResizeOutcome> {
        let next_nonce = self.check_nonce(auth).await?;
        let key = StorageKey::cache(&auth.identity);
        let mut cache = self.existing_cache(&key).await?;

        let new_capacity = self.config.cache_capacity;
        if cache.len() > new_capacity as usize {
            return Err(ProverError::CacheShrinkBelowContent {
                cached: cache.len(),
                capacity: new_capacity,
            });
        }

        let new_deposit = self.config.deposit_for(new_capacity);
        let outcome = ResizeOutcome {
            old_capacity: cache.capacity,
            new_capacity,
            deposit_delta: i128::from(new_deposit) - i128::from(cache.deposit),
        };
        cache.capacity = new_capacity;
        cache.deposit = new_deposit;
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_cache(key, cache)
                    .put_nonce(StorageKey::nonce(&auth.identity), next_nonce),
            )
            .await?;

        info!(
            target: "polymer_prover::program",
            "proof cache successfully resized from {} to {} bytes",
            outcome.old_capacity,
            outcome.new_capacity
        );
        Ok(outcome)
    }

    /// Empties the proof cache of the authorizing caller without closing it.
    pub async fn clear_proof_cache(&self, auth: &CallerAuthorization) -> ProverResult<()> {
        auth.verify(Operation::ClearProofCache, &[])?;
        let lock = self.acquire_lock(&auth.identity).await?;
        let result = self.clear_proof_cache_locked(&lock, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn clear_proof_cache_locked(
        &self,
        lock: &CallerLock,
        auth: &CallerAuthorization,
    ) -> ProverResult<()> {
        let next_nonce = self.check_nonce(auth).await?;
        let key = StorageKey::cache(&auth.identity);
        let mut cache = self.existing_cache(&key).await?;
        cache.clear();
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_cache(key, cache)
                    .put_nonce(StorageKey::nonce(&auth.identity), next_nonce),
            )
            .await?;

        info!(target: "polymer_prover::program", "proof cache successfully cleared");
        Ok(())
    }

    /// Appends `chunk` to the proof cache. Returns the number of cached bytes.
    pub async fn load_proof(
        &self,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize> {
        self.check_accounts(accounts, auth)?;
        auth.verify(Operation::LoadProof, chunk)?;
        let lock = self.acquire_lock(&accounts.authority).await?;
        let result = self.load_proof_locked(&lock, accounts, chunk, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn load_proof_locked(
        &self,
        lock: &CallerLock,
        accounts: &ProgramAccounts,
        chunk: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<usize> {
        let next_nonce = self.check_nonce(auth).await?;
        let mut cache = self.existing_cache(&accounts.cache).await?;
        cache.append(chunk)?;
        let cached = cache.len();
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_cache(accounts.cache, cache)
                    .put_nonce(StorageKey::nonce(&accounts.authority), next_nonce),
            )
            .await?;

        debug!(
            target: "polymer_prover::program",
            "loaded {} byte chunk into {}, {} bytes cached",
            chunk.len(),
            accounts.cache,
            cached
        );
        Ok(cached)
    }

    /// Validates the cached proof, records the outcome and empties the cache.
    ///
    /// A rejected proof is not an error: the call succeeds, the result record
    /// holds the verifier message and the cache is emptied all the same, so
    /// the caller can start loading a new proof right away.
    pub async fn validate_event(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        self.check_accounts(accounts, auth)?;
        auth.verify(Operation::ValidateEvent, &[])?;
        let lock = self.acquire_lock(&accounts.authority).await?;
        let result = self.validate_event_locked(&lock, accounts, auth).await;
        self.store.unlock(&lock).await;
        result
    }

    async fn validate_event_locked(
        &self,
        lock: &CallerLock,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        let next_nonce = self.check_nonce(auth).await?;
        // this is set by the deployer during initialize()
        let anchor = self.trust_anchor().await?;
        let mut cache = self.existing_cache(&accounts.cache).await?;
        self.existing_result(&accounts.result).await?;

        let outcome = self.run_verifier(&cache.cache, &anchor);

        cache.clear();
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_result(accounts.result, ResultAccount::from(&outcome))
                    .put_cache(accounts.cache, cache)
                    .put_nonce(StorageKey::nonce(&accounts.authority), next_nonce),
            )
            .await?;

        self.publish(&outcome);
        Ok(outcome)
    }

    /// Validates a proof passed in full, bypassing the cache.
    pub async fn validate_event_with_proof(
        &self,
        accounts: &ProgramAccounts,
        proof: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        self.check_accounts(accounts, auth)?;
        auth.verify(Operation::ValidateEventWithProof, proof)?;
        let lock = self.acquire_lock(&accounts.authority).await?;
        let result = self
            .validate_event_with_proof_locked(&lock, accounts, proof, auth)
            .await;
        self.store.unlock(&lock).await;
        result
    }

    async fn validate_event_with_proof_locked(
        &self,
        lock: &CallerLock,
        accounts: &ProgramAccounts,
        proof: &[u8],
        auth: &CallerAuthorization,
    ) -> ProverResult<ValidateEventResult> {
        let next_nonce = self.check_nonce(auth).await?;
        let anchor = self.trust_anchor().await?;
        self.existing_result(&accounts.result).await?;

        let outcome = self.run_verifier(proof, &anchor);
        self.store
            .commit(
                lock,
                WriteBatch::new()
                    .put_result(accounts.result, ResultAccount::from(&outcome))
                    .put_nonce(StorageKey::nonce(&accounts.authority), next_nonce),
            )
            .await?;

        self.publish(&outcome);
        Ok(outcome)
    }

    fn run_verifier(&self, proof: &[u8], anchor: &TrustAnchor) -> ValidateEventResult {
        let outcome = match self.verifier.verify(proof, anchor) {
            Ok(event) => ValidateEventResult::Valid(event),
            Err(err) => ValidateEventResult::Invalid(err),
        };
        if outcome.is_valid() {
            info!(target: "polymer_prover::program", "{}", outcome);
        } else {
            warn!(target: "polymer_prover::program", "{}", outcome);
        }
        outcome
    }

    fn publish(&self, outcome: &ValidateEventResult) {
        if let ValidateEventResult::Valid(event) = outcome {
            // no subscribers is fine, the result record is the source of truth
            if self.events.send(ValidateEventEvent::from(event)).is_err() {
                debug!(target: "polymer_prover::program", "no subscribers for validate event");
            }
        }
    }

    /// Rejects accounts that do not belong to the caller who signed `auth`.
    fn check_accounts(
        &self,
        accounts: &ProgramAccounts,
        auth: &CallerAuthorization,
    ) -> ProverResult<()> {
        if accounts.authority != auth.identity {
            warn!(
                target: "polymer_prover::program",
                "caller {} presented accounts of {}",
                auth.identity,
                accounts.authority
            );
            return Err(ProverError::UnauthorizedCaller {
                caller: auth.identity,
                key: accounts.cache,
            });
        }
        let expected = ProgramAccounts::for_caller(accounts.authority);
        for (given, wanted) in [
            (accounts.cache, expected.cache),
            (accounts.result, expected.result),
        ] {
            if given != wanted {
                warn!(
                    target: "polymer_prover::program",
                    "caller {} presented account {} it does not own",
                    accounts.authority,
                    given
                );
                return Err(ProverError::UnauthorizedCaller {
                    caller: accounts.authority,
                    key: given,
                });
            }
        }
        Ok(())
    }

    async fn trust_anchor(&self) -> ProverResult<TrustAnchor> {
        self.store
            .read_config()
            .await?
            .map(|config| config.trust_anchor())
            .ok_or(ProverError::NotInitialized)
    }

    async fn existing_cache(&self, key: &StorageKey) -> ProverResult<ProofCacheAccount> {
        self.store
            .read_cache(key)
            .await?
            .ok_or(ProverError::AccountNotFound(*key))
    }

    async fn existing_result(&self, key: &StorageKey) -> ProverResult<ResultAccount> {
        self.store
            .read_result(key)
            .await?
            .ok_or(ProverError::AccountNotFound(*key))
    }

    /// Checks `auth` against the stored nonce and returns the nonce to store
    /// once the operation commits. Must run under the caller's lock.
    async fn check_nonce(&self, auth: &CallerAuthorization) -> ProverResult<u64> {
        let expected = self.nonce(&auth.identity).await?;
        if auth.nonce != expected {
            warn!(
                target: "polymer_prover::program",
                "stale authorization from {}: nonce {}, expected {}",
                auth.identity,
                auth.nonce,
                expected
            );
            return Err(AuthError::StaleNonce {
                got: auth.nonce,
                expected,
            }
            .into());
        }
        Ok(expected + 1)
    }

    async fn acquire_lock(&self, identity: &CallerIdentity) -> ProverResult<CallerLock> {
        for attempt in 0..self.config.lock_attempts {
            if let Some(lock) = self.store.try_lock(identity, self.config.lock_ttl).await? {
                return Ok(lock);
            }
            debug!(
                target: "polymer_prover::program",
                "accounts of {} are busy, attempt {}",
                identity,
                attempt + 1
            );
            tokio::time::sleep(self.config.lock_retry_delay).await;
        }
        Err(ProverError::LockContention(*identity))
    }
}
