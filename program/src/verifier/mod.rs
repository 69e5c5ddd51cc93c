//! Defines the seam through which the program checks assembled proofs.

use polymer_prover_primitives::{DecodedEvent, TrustAnchor, VerifyError};

mod polymer;

pub use polymer::PolymerVerifier;

/// Checks a proof against a trust anchor and decodes the event it proves.
///
/// Implementors must not panic on malformed input; every rejection is
/// reported as a [`VerifyError`], whose message ends up in the caller's result
/// record.
pub trait EventVerifier: Send + Sync + 'static {
    fn verify(&self, proof: &[u8], anchor: &TrustAnchor) -> Result<DecodedEvent, VerifyError>;
}
