//! The polymer prover program.
//!
//! Callers upload a proof in chunks into a per-caller proof cache, then ask the
//! program to validate it against the configured trust anchor. The outcome is
//! stored in a per-caller result record and, on success, published as a
//! [`ValidateEventEvent`].
//!
//! Program flow:
//! 1. `initialize` writes the trust anchor, once per deployment
//! 2. `create_accounts` provisions an empty cache and result pair for a caller
//! 3. `load_proof` appends chunks to the cache
//! 4. `validate_event` verifies the cache, writes the result and clears the cache
//! 5. `close_accounts` removes the pair and returns the storage deposit
//!
//! Every per-caller operation carries a [`CallerAuthorization`] signed with
//! the caller's [`CallerKey`].

pub mod client;
pub mod config;
pub mod error;
pub mod program;
pub mod state;
pub mod store;
pub mod verifier;

pub use client::{ForwardingClient, ProgramAccounts, ProofCacheClient};
pub use config::ProgramConfig;
pub use error::{ProverError, ProverResult, StoreError};
pub use program::{ProverProgram, ResizeOutcome};
pub use state::{ConfigAccount, ProofCacheAccount, ResultAccount, ValidateEventResult};
pub use store::{memory::InMemoryStore, AccountStore, AccountWrite, CallerLock, WriteBatch};
pub use verifier::{EventVerifier, PolymerVerifier};

pub use polymer_prover_primitives::{
    AuthError, CallerAuthorization, CallerIdentity, CallerKey, DecodedEvent, Namespace, Operation,
    StorageKey, TrustAnchor, ValidateEventEvent, VerifyError,
};
