//! Deterministic storage keys for per-caller records.

use crate::types::CallerIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of the singleton record holding the trust anchor.
pub const CONFIG_KEY: &str = "internal";

/// Record family a [`StorageKey`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Proof chunks waiting to be validated
    Cache,
    /// Outcome of the latest validation
    Result,
    /// Authorization counter of a caller, kept across account closes
    Nonce,
}

impl Namespace {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Namespace::Cache => "cache",
            Namespace::Result => "result",
            Namespace::Nonce => "nonce",
        }
    }
}

/// Address of a per-caller record.
///
/// Two keys are equal only if both the namespace and the full identity are
/// equal, so callers can never alias each other's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    namespace: Namespace,
    identity: CallerIdentity,
}

impl StorageKey {
    pub fn derive(namespace: Namespace, identity: &CallerIdentity) -> Self {
        StorageKey {
            namespace,
            identity: *identity,
        }
    }

    pub fn cache(identity: &CallerIdentity) -> Self {
        Self::derive(Namespace::Cache, identity)
    }

    pub fn result(identity: &CallerIdentity) -> Self {
        Self::derive(Namespace::Result, identity)
    }

    pub fn nonce(identity: &CallerIdentity) -> Self {
        Self::derive(Namespace::Nonce, identity)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.namespace.as_str(),
            self.identity.to_hex_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let alice = CallerIdentity::new([7; 32]);
        assert_eq!(StorageKey::cache(&alice), StorageKey::cache(&alice));
        assert_eq!(
            StorageKey::cache(&alice).to_string(),
            StorageKey::cache(&alice).to_string()
        );
    }

    #[test]
    fn identities_never_alias() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[31] = 1;
        b[0] = 1;
        let (a, b) = (CallerIdentity::new(a), CallerIdentity::new(b));

        assert_ne!(StorageKey::cache(&a), StorageKey::cache(&b));
        assert_ne!(
            StorageKey::cache(&a).to_string(),
            StorageKey::cache(&b).to_string()
        );
    }

    #[test]
    fn namespaces_are_separate() {
        let alice = CallerIdentity::new([7; 32]);
        let cache = StorageKey::cache(&alice);
        let result = StorageKey::result(&alice);

        assert_ne!(cache, result);
        assert_eq!(
            "cache:0707070707070707070707070707070707070707070707070707070707070707",
            cache.to_string()
        );
        assert!(result.to_string().starts_with("result:"));
        assert!(StorageKey::nonce(&alice).to_string().starts_with("nonce:"));
        assert_eq!(cache.identity(), result.identity());
    }
}
