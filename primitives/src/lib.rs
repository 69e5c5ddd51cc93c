//! Types shared by the polymer prover program, its storage backends and the
//! `proverctl` tool.
//!
//! The crate also hosts the Polymer membership-proof verifier, which the
//! program consumes through its `EventVerifier` seam.

pub mod auth;
pub mod keys;
pub mod types;
pub mod verify;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::{AuthError, CallerAuthorization, CallerKey, Operation};
pub use keys::{Namespace, StorageKey, CONFIG_KEY};
pub use types::{CallerIdentity, DecodedEvent, TrustAnchor, ValidateEventEvent};
pub use verify::{verify_event_proof, VerifyError};
