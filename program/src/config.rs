use std::time::Duration;

/// Cache capacity of a fresh deployment, in bytes.
pub const DEFAULT_CACHE_CAPACITY: u32 = 3000;

/// Space charged for the record headers of a cache and result pair.
pub const ACCOUNT_OVERHEAD_BYTES: u64 = 2 * 128;

const DEFAULT_DEPOSIT_PER_BYTE: u64 = 6_960;

/// Deployment-wide settings of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    /// Capacity given to new proof caches, and the target of `resize_proof_cache`
    pub cache_capacity: u32,
    /// Storage deposit charged per reserved byte
    pub deposit_per_byte: u64,
    /// How long a per-caller lock is held before it expires on its own
    pub lock_ttl: Duration,
    /// Attempts to take a per-caller lock before giving up with `LockContention`
    pub lock_attempts: u32,
    pub lock_retry_delay: Duration,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        ProgramConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            deposit_per_byte: DEFAULT_DEPOSIT_PER_BYTE,
            lock_ttl: Duration::from_secs(2),
            lock_attempts: 50,
            lock_retry_delay: Duration::from_millis(20),
        }
    }
}

impl ProgramConfig {
    pub fn with_cache_capacity(mut self, cache_capacity: u32) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Deposit held while a cache of `capacity` bytes and its result record exist.
    pub fn deposit_for(&self, capacity: u32) -> u64 {
        self.deposit_per_byte
            .saturating_mul(ACCOUNT_OVERHEAD_BYTES + u64::from(capacity))
    }
}
