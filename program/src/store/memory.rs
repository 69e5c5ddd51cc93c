//! Process-local [`AccountStore`], used by tests and single-process deployments.

use super::{AccountStore, AccountWrite, CallerLock, WriteBatch};
use crate::{
    error::StoreError,
    state::{ConfigAccount, ProofCacheAccount, ResultAccount},
};
use async_trait::async_trait;
use polymer_prover_primitives::{CallerIdentity, Namespace, StorageKey};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct Accounts {
    config: Option<ConfigAccount>,
    caches: HashMap<StorageKey, ProofCacheAccount>,
    results: HashMap<StorageKey, ResultAccount>,
    nonces: HashMap<StorageKey, u64>,
    locks: HashMap<CallerIdentity, (String, Instant)>,
}

impl Accounts {
    fn holds(&self, lock: &CallerLock, now: Instant) -> bool {
        matches!(
            self.locks.get(&lock.identity),
            Some((token, expires_at)) if *token == lock.token && *expires_at > now
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: Mutex<Accounts>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live cache records.
    pub async fn cache_count(&self) -> usize {
        self.accounts.lock().await.caches.len()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn create_config(&self, config: &ConfigAccount) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.config.is_some() {
            return Ok(false);
        }
        accounts.config = Some(config.clone());
        Ok(true)
    }

    async fn read_config(&self) -> Result<Option<ConfigAccount>, StoreError> {
        Ok(self.accounts.lock().await.config.clone())
    }

    async fn read_cache(&self, key: &StorageKey) -> Result<Option<ProofCacheAccount>, StoreError> {
        Ok(self.accounts.lock().await.caches.get(key).cloned())
    }

    async fn read_result(&self, key: &StorageKey) -> Result<Option<ResultAccount>, StoreError> {
        Ok(self.accounts.lock().await.results.get(key).cloned())
    }

    async fn read_nonce(&self, key: &StorageKey) -> Result<Option<u64>, StoreError> {
        Ok(self.accounts.lock().await.nonces.get(key).copied())
    }

    async fn commit(&self, lock: &CallerLock, batch: WriteBatch) -> Result<(), StoreError> {
        // a single guard covers the whole batch, readers never see half of it
        let mut accounts = self.accounts.lock().await;
        if !accounts.holds(lock, Instant::now()) {
            return Err(StoreError::LockExpired(lock.identity));
        }
        for write in batch {
            match write {
                AccountWrite::PutCache(key, account) => {
                    accounts.caches.insert(key, account);
                }
                AccountWrite::PutResult(key, account) => {
                    accounts.results.insert(key, account);
                }
                AccountWrite::PutNonce(key, nonce) => {
                    accounts.nonces.insert(key, nonce);
                }
                AccountWrite::Delete(key) => match key.namespace() {
                    Namespace::Cache => {
                        accounts.caches.remove(&key);
                    }
                    Namespace::Result => {
                        accounts.results.remove(&key);
                    }
                    Namespace::Nonce => {
                        accounts.nonces.remove(&key);
                    }
                },
            }
        }
        Ok(())
    }

    async fn try_lock(
        &self,
        identity: &CallerIdentity,
        ttl: Duration,
    ) -> Result<Option<CallerLock>, StoreError> {
        let mut accounts = self.accounts.lock().await;
        let now = Instant::now();
        match accounts.locks.get(identity) {
            Some((_, expires_at)) if *expires_at > now => Ok(None),
            _ => {
                let lock = CallerLock::new(*identity);
                accounts
                    .locks
                    .insert(*identity, (lock.token.clone(), now + ttl));
                Ok(Some(lock))
            }
        }
    }

    async fn unlock(&self, lock: &CallerLock) {
        let mut accounts = self.accounts.lock().await;
        let owned = matches!(
            accounts.locks.get(&lock.identity),
            Some((token, _)) if *token == lock.token
        );
        if owned {
            accounts.locks.remove(&lock.identity);
            trace!(target: "memory_store", "lock released for {}", lock.identity);
        } else {
            trace!(target: "memory_store", "lock of {} is held by someone else, not released", lock.identity);
        }
    }
}
