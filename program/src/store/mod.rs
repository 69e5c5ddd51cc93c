//! Storage seam of the program.
//!
//! A backend only needs to offer typed reads, an atomic batch commit, a
//! set-if-absent write for the config record and expiring per-caller locks.
//! Operations are NOT VALIDATED at this level; every precondition is checked
//! by [`crate::ProverProgram`].
//!
//! Locks carry an owner token. A batch is only applied while the token still
//! holds the lock, so a holder whose lease ran out cannot overwrite what the
//! next holder wrote.

use crate::{
    error::StoreError,
    state::{ConfigAccount, ProofCacheAccount, ResultAccount},
};
use async_trait::async_trait;
use polymer_prover_primitives::{CallerIdentity, StorageKey};
use std::time::Duration;
use uuid::Uuid;

pub mod memory;

/// A held per-caller lock. Only the holder of the token can commit under it
/// or release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerLock {
    pub identity: CallerIdentity,
    pub token: String,
}

impl CallerLock {
    /// A lock request for `identity` with a fresh owner token.
    pub fn new(identity: CallerIdentity) -> Self {
        CallerLock {
            identity,
            token: Uuid::new_v4().to_string(),
        }
    }
}

/// One record mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountWrite {
    PutCache(StorageKey, ProofCacheAccount),
    PutResult(StorageKey, ResultAccount),
    PutNonce(StorageKey, u64),
    Delete(StorageKey),
}

/// Writes that must land together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<AccountWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_cache(mut self, key: StorageKey, account: ProofCacheAccount) -> Self {
        self.writes.push(AccountWrite::PutCache(key, account));
        self
    }

    pub fn put_result(mut self, key: StorageKey, account: ResultAccount) -> Self {
        self.writes.push(AccountWrite::PutResult(key, account));
        self
    }

    pub fn put_nonce(mut self, key: StorageKey, nonce: u64) -> Self {
        self.writes.push(AccountWrite::PutNonce(key, nonce));
        self
    }

    pub fn delete(mut self, key: StorageKey) -> Self {
        self.writes.push(AccountWrite::Delete(key));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[AccountWrite] {
        &self.writes
    }
}

impl IntoIterator for WriteBatch {
    type Item = AccountWrite;
    type IntoIter = std::vec::IntoIter<AccountWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Writes the config record unless one already exists. Returns whether
    /// the record was written.
    async fn create_config(&self, config: &ConfigAccount) -> Result<bool, StoreError>;

    async fn read_config(&self) -> Result<Option<ConfigAccount>, StoreError>;

    async fn read_cache(&self, key: &StorageKey) -> Result<Option<ProofCacheAccount>, StoreError>;

    async fn read_result(&self, key: &StorageKey) -> Result<Option<ResultAccount>, StoreError>;

    /// Authorization nonce stored under `key`, if any.
    async fn read_nonce(&self, key: &StorageKey) -> Result<Option<u64>, StoreError>;

    /// Atomically applies every write of the batch, provided `lock` is still
    /// held. Fails with [`StoreError::LockExpired`] and writes nothing
    /// otherwise.
    async fn commit(&self, lock: &CallerLock, batch: WriteBatch) -> Result<(), StoreError>;

    /// Takes the write lock of `identity` for at most `ttl`. Returns `None` if
    /// someone else holds it.
    async fn try_lock(
        &self,
        identity: &CallerIdentity,
        ttl: Duration,
    ) -> Result<Option<CallerLock>, StoreError>;

    /// Releases `lock` if its token still holds it (best-effort).
    async fn unlock(&self, lock: &CallerLock);
}
