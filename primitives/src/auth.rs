//! Caller authorization.
//!
//! A [`CallerIdentity`] is the keccak-256 hash of the caller's uncompressed
//! secp256k1 public key. Every mutating call carries a [`CallerAuthorization`]:
//! a recoverable signature by that key over the operation, the caller's
//! current nonce and the call payload. Whoever relays the call can pass the
//! authorization along but cannot produce one for another caller, nor reuse
//! one once the nonce has moved on.

use crate::types::CallerIdentity;
use alloy_primitives::{keccak256, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const AUTH_DOMAIN: &[u8] = b"polymer-prover/authorization";

/// Operation an authorization is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccounts,
    CloseAccounts,
    ResizeProofCache,
    ClearProofCache,
    LoadProof,
    ValidateEvent,
    ValidateEventWithProof,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAccounts => "create_accounts",
            Operation::CloseAccounts => "close_accounts",
            Operation::ResizeProofCache => "resize_proof_cache",
            Operation::ClearProofCache => "clear_proof_cache",
            Operation::LoadProof => "load_proof",
            Operation::ValidateEvent => "validate_event",
            Operation::ValidateEventWithProof => "validate_event_with_proof",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid caller key: {0}")]
    InvalidKey(String),

    #[error("invalid authorization signature: {0}")]
    InvalidSignature(String),

    #[error("authorization of {claimed} was signed by {recovered}")]
    SignerMismatch {
        claimed: CallerIdentity,
        recovered: CallerIdentity,
    },

    #[error("stale authorization nonce {got}, expected {expected}")]
    StaleNonce { got: u64, expected: u64 },
}

impl CallerIdentity {
    /// Identity owned by the holder of the secret key behind `key`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // drop the 0x04 sec1 tag
        CallerIdentity::from(keccak256(&point.as_bytes()[1..]))
    }
}

/// Digest a caller signs to authorize `operation` with `payload`.
pub fn authorization_digest(
    operation: Operation,
    identity: &CallerIdentity,
    nonce: u64,
    payload: &[u8],
) -> B256 {
    let mut message = Vec::with_capacity(AUTH_DOMAIN.len() + 96);
    message.extend_from_slice(AUTH_DOMAIN);
    message.extend_from_slice(operation.as_str().as_bytes());
    message.extend_from_slice(identity.as_bytes());
    message.extend_from_slice(&nonce.to_be_bytes());
    message.extend_from_slice(&Sha256::digest(payload));
    keccak256(message)
}

/// Secret key of a caller.
#[derive(Clone)]
pub struct CallerKey {
    signing_key: SigningKey,
}

impl CallerKey {
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, AuthError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(CallerKey { signing_key })
    }

    pub fn identity(&self) -> CallerIdentity {
        CallerIdentity::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Signs `operation` with `payload` at the caller's current `nonce`.
    pub fn authorize(
        &self,
        operation: Operation,
        nonce: u64,
        payload: &[u8],
    ) -> Result<CallerAuthorization, AuthError> {
        let identity = self.identity();
        let digest = authorization_digest(operation, &identity, nonce, payload);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&signature.to_bytes());
        Ok(CallerAuthorization {
            identity,
            nonce,
            signature: bytes,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerKey")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Proof that `identity` asked for one specific call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerAuthorization {
    pub identity: CallerIdentity,
    pub nonce: u64,
    pub signature: [u8; 64],
    pub recovery_id: u8,
}

impl CallerAuthorization {
    /// Checks that the signature covers `operation` and `payload` and was made
    /// by the key behind `identity`. The nonce is checked by the caller of this
    /// function against the stored one.
    pub fn verify(&self, operation: Operation, payload: &[u8]) -> Result<(), AuthError> {
        let digest = authorization_digest(operation, &self.identity, self.nonce, payload);
        let recovery_id = RecoveryId::from_byte(self.recovery_id).ok_or_else(|| {
            AuthError::InvalidSignature(format!("invalid recovery id {}", self.recovery_id))
        })?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

        let recovered = CallerIdentity::from_verifying_key(&key);
        if recovered != self.identity {
            return Err(AuthError::SignerMismatch {
                claimed: self.identity,
                recovered,
            });
        }
        Ok(())
    }
}
