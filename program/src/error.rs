use polymer_prover_primitives::{AuthError, CallerIdentity, StorageKey};
use thiserror::Error;

/// Failures of the storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to serialize/deserialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock of {0} expired before the commit")]
    LockExpired(CallerIdentity),
}

/// Errors that abort a program operation. None of them leave partial writes
/// behind.
#[derive(Error, Debug)]
pub enum ProverError {
    #[error("program is already initialized")]
    AlreadyInitialized,
    #[error("program is not initialized")]
    NotInitialized,
    #[error("account {0} already exists")]
    AccountAlreadyExists(StorageKey),
    #[error("account {0} does not exist")]
    AccountNotFound(StorageKey),
    #[error("proof cache capacity exceeded: {cached} cached bytes plus a {chunk} byte chunk exceed {capacity}")]
    CacheCapacityExceeded {
        cached: usize,
        chunk: usize,
        capacity: u32,
    },
    #[error("proof cache holds {cached} bytes and cannot shrink to {capacity}")]
    CacheShrinkBelowContent { cached: usize, capacity: u32 },
    #[error("caller {caller} is not allowed to use account {key}")]
    UnauthorizedCaller {
        caller: CallerIdentity,
        key: StorageKey,
    },
    #[error("accounts of {0} are locked by another operation")]
    LockContention(CallerIdentity),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("call is not authorized: {0}")]
    Authorization(#[from] AuthError),
}

impl ProverError {
    /// Stable numeric code reported to callers. Custom codes start at 6000.
    pub fn code(&self) -> u32 {
        6000 + match self {
            ProverError::AlreadyInitialized => 0,
            ProverError::NotInitialized => 1,
            ProverError::AccountAlreadyExists(_) => 2,
            ProverError::AccountNotFound(_) => 3,
            ProverError::CacheCapacityExceeded { .. } => 4,
            ProverError::CacheShrinkBelowContent { .. } => 5,
            ProverError::UnauthorizedCaller { .. } => 6,
            ProverError::LockContention(_) => 7,
            ProverError::Store(_) => 8,
            ProverError::Authorization(_) => 9,
        }
    }
}

pub type ProverResult<T> = Result<T, ProverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let key = StorageKey::cache(&CallerIdentity::new([1; 32]));
        let errors = [
            ProverError::AlreadyInitialized,
            ProverError::NotInitialized,
            ProverError::AccountAlreadyExists(key),
            ProverError::AccountNotFound(key),
            ProverError::CacheCapacityExceeded {
                cached: 3000,
                chunk: 1,
                capacity: 3000,
            },
            ProverError::CacheShrinkBelowContent {
                cached: 10,
                capacity: 5,
            },
            ProverError::UnauthorizedCaller {
                caller: CallerIdentity::new([2; 32]),
                key,
            },
            ProverError::LockContention(CallerIdentity::new([1; 32])),
            ProverError::Store(StoreError::Backend("down".to_string())),
            ProverError::Authorization(AuthError::StaleNonce {
                got: 0,
                expected: 1,
            }),
        ];

        let mut codes: Vec<u32> = errors.iter().map(ProverError::code).collect();
        codes.dedup();
        assert_eq!(errors.len(), codes.len());
        assert_eq!(6004, errors[4].code());
    }
}
