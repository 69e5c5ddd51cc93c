use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use polymer_prover_primitives::{CallerIdentity, StorageKey, CONFIG_KEY};
use polymer_prover_program::{
    AccountStore, AccountWrite, CallerLock, ConfigAccount, ProofCacheAccount, ResultAccount,
    StoreError, WriteBatch,
};
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client, RedisError, Script,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{env, time::Duration};
use tracing::{debug, info, warn};

// Deletes the lock only if it still carries our token
static RELEASE_LOCK: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#,
    )
});

// KEYS[1] is the lock, KEYS[2..] the records. ARGV[1] is the lock token,
// followed by an (op, value) pair per record.
static GUARDED_COMMIT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) ~= ARGV[1] then
    return 0
end
for i = 2, #KEYS do
    if ARGV[2 * i - 2] == "set" then
        redis.call("SET", KEYS[i], ARGV[2 * i - 1])
    else
        redis.call("DEL", KEYS[i])
    end
end
return 1
"#,
    )
});

/// [`AccountStore`] keeping every record as a JSON value under
/// `{prefix}:state:{namespace}:{identity}`, so several deployments can share
/// one Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    pub conn_manager: ConnectionManager,
    key_prefix: String,
    lock_duration: Duration,
}

impl RedisStore {
    pub async fn new() -> anyhow::Result<Self> {
        let redis_url =
            env::var("REDIS_URL").context("REDIS_URL environment variable must be set")?;
        let lock_duration_secs: u64 = env::var("REDIS_LOCK_DURATION_SECS")
            .context("REDIS_LOCK_DURATION_SECS environment variable must be set")?
            .parse()
            .context("REDIS_LOCK_DURATION_SECS must be a number")?;
        if lock_duration_secs == 0 {
            bail!("REDIS_LOCK_DURATION_SECS must be at least 1");
        }
        let key_prefix = env::var("REDIS_KEY_PREFIX")
            .context("REDIS_KEY_PREFIX environment variable must be set")?;

        info!(target: "redis_store", "RedisStore configuration:");
        info!(target: "redis_store", " - URL: {}", redis_url);
        info!(target: "redis_store", " - Lock Duration: {}s", lock_duration_secs);
        info!(target: "redis_store", " - Key Prefix: {}", key_prefix);

        Self::connect(&redis_url, key_prefix, Duration::from_secs(lock_duration_secs)).await
    }

    pub async fn connect(
        redis_url: &str,
        key_prefix: String,
        lock_duration: Duration,
    ) -> anyhow::Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(10))
            .set_response_timeout(Duration::from_secs(10));

        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let conn_manager = match tokio::time::timeout(
            Duration::from_secs(5),
            ConnectionManager::new_with_config(client, config),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(anyhow!("Failed to connect to Redis: {}", e)),
            Err(_) => return Err(anyhow!("Timed out connecting to Redis after 5 seconds")),
        };

        Ok(Self {
            conn_manager,
            key_prefix,
            lock_duration,
        })
    }

    /// Lock duration configured through `REDIS_LOCK_DURATION_SECS`.
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// Generates the Redis key of a per-caller record.
    pub fn account_key(&self, key: &StorageKey) -> String {
        account_key(&self.key_prefix, key)
    }

    /// Generates the Redis key of the config record.
    pub fn config_key(&self) -> String {
        format!("{}:state:{}", self.key_prefix, CONFIG_KEY)
    }

    /// Generates the redis lock of a caller.
    pub fn caller_lock_key(&self, identity: &CallerIdentity) -> String {
        format!("{}:lock:{}", self.key_prefix, identity.to_hex_string())
    }

    // Internal helper to fetch and deserialize a JSON value from Redis.
    async fn read_json_value<T>(&self, redis_key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.conn_manager.clone();
        let json: Option<String> = conn.get(redis_key).await.map_err(backend)?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

fn account_key(prefix: &str, key: &StorageKey) -> String {
    format!("{}:state:{}", prefix, key)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn backend(err: RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// `PX` argument for a lock lease. Redis rejects 0, so the lease is at least
/// one millisecond.
fn lease_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl AccountStore for RedisStore {
    async fn create_config(&self, config: &ConfigAccount) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let created: bool = redis::cmd("SET")
            .arg(self.config_key())
            .arg(to_json(config)?)
            .arg("NX") // Set only if key does not exist
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(created)
    }

    async fn read_config(&self) -> Result<Option<ConfigAccount>, StoreError> {
        self.read_json_value(&self.config_key()).await
    }

    async fn read_cache(&self, key: &StorageKey) -> Result<Option<ProofCacheAccount>, StoreError> {
        self.read_json_value(&self.account_key(key)).await
    }

    async fn read_result(&self, key: &StorageKey) -> Result<Option<ResultAccount>, StoreError> {
        self.read_json_value(&self.account_key(key)).await
    }

    async fn read_nonce(&self, key: &StorageKey) -> Result<Option<u64>, StoreError> {
        self.read_json_value(&self.account_key(key)).await
    }

    async fn commit(&self, lock: &CallerLock, batch: WriteBatch) -> Result<(), StoreError> {
        // the lock check and the writes run as one script, so nothing lands
        // once the lease has passed to someone else
        let mut invocation = GUARDED_COMMIT.prepare_invoke();
        invocation
            .key(self.caller_lock_key(&lock.identity))
            .arg(&lock.token);
        for write in batch {
            match write {
                AccountWrite::PutCache(key, account) => {
                    invocation
                        .key(self.account_key(&key))
                        .arg("set")
                        .arg(to_json(&account)?);
                }
                AccountWrite::PutResult(key, account) => {
                    invocation
                        .key(self.account_key(&key))
                        .arg("set")
                        .arg(to_json(&account)?);
                }
                AccountWrite::PutNonce(key, nonce) => {
                    invocation
                        .key(self.account_key(&key))
                        .arg("set")
                        .arg(to_json(&nonce)?);
                }
                AccountWrite::Delete(key) => {
                    invocation.key(self.account_key(&key)).arg("del").arg("");
                }
            }
        }

        let mut conn = self.conn_manager.clone();
        let applied: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        if applied == 0 {
            warn!(
                target: "redis_store",
                "Commit dropped, lock of {} is no longer held",
                lock.identity
            );
            return Err(StoreError::LockExpired(lock.identity));
        }
        Ok(())
    }

    async fn try_lock(
        &self,
        identity: &CallerIdentity,
        ttl: Duration,
    ) -> Result<Option<CallerLock>, StoreError> {
        let lock = CallerLock::new(*identity);
        let mut conn = self.conn_manager.clone();
        let acquired: bool = redis::cmd("SET")
            .arg(self.caller_lock_key(identity))
            .arg(&lock.token)
            .arg("NX")
            .arg("PX") // Set expiry in milliseconds
            .arg(lease_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(acquired.then_some(lock))
    }

    async fn unlock(&self, lock: &CallerLock) {
        let key = self.caller_lock_key(&lock.identity);
        let mut conn = self.conn_manager.clone();
        let released: Result<i64, _> = RELEASE_LOCK
            .key(&key)
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await;
        match released {
            Ok(0) => debug!(target: "redis_store", "Caller lock {} already passed on", key),
            Ok(_) => debug!(target: "redis_store", "Caller lock released. Key: {}", key),
            Err(e) => warn!(target: "redis_store", "Failed to release lock {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymer_prover_primitives::Namespace;

    #[test]
    fn account_keys_are_prefixed_and_namespaced() {
        let identity = CallerIdentity::new([0xab; 32]);
        let cache = account_key("polymer", &StorageKey::cache(&identity));
        let result = account_key("polymer", &StorageKey::result(&identity));

        assert_eq!(
            format!("polymer:state:cache:{}", identity.to_hex_string()),
            cache
        );
        assert_ne!(cache, result);
        assert!(result.starts_with(&format!("polymer:state:{}:", Namespace::Result.as_str())));
        assert_ne!(
            cache,
            account_key("polymer", &StorageKey::nonce(&identity))
        );
    }

    #[test]
    fn lease_is_never_zero() {
        assert_eq!(1, lease_millis(Duration::ZERO));
        assert_eq!(1, lease_millis(Duration::from_micros(300)));
        assert_eq!(2_000, lease_millis(Duration::from_secs(2)));
        assert_eq!(u64::MAX, lease_millis(Duration::MAX));
    }
}
