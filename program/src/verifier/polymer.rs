//! Implements the `EventVerifier` trait for Polymer peptide proofs.

use super::EventVerifier;
use polymer_prover_primitives::{verify_event_proof, DecodedEvent, TrustAnchor, VerifyError};
use tracing::debug;

/// Verifies proofs of events stored in the peptide state tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolymerVerifier;

impl EventVerifier for PolymerVerifier {
    fn verify(&self, proof: &[u8], anchor: &TrustAnchor) -> Result<DecodedEvent, VerifyError> {
        debug!(
            target: "polymer_verifier",
            "verifying {} byte proof for client type {} on peptide chain {}",
            proof.len(),
            anchor.client_type,
            anchor.peptide_chain_id
        );
        verify_event_proof(proof, anchor)
    }
}
