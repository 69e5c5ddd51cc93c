//! Verification of Polymer event proofs.
//!
//! A proof is laid out as a fixed header, the raw event, and a membership
//! proof of that event in the peptide state tree:
//!
//! ```text
//! [0..32)     app hash (peptide state root)
//! [32..96)    secp256k1 signature (r || s) over the app hash
//! [96]        recovery id (27 or 28)
//! [97..101)   source chain id, u32 BE
//! [101..109)  peptide height, u64 BE
//! [109..117)  source block height, u64 BE
//! [117..119)  tx index, u16 BE
//! [119]       log index
//! [120]       number of topics
//! [121..123)  end of the raw event, u16 BE
//! [123..end)  raw event: address || topics || unindexed data
//! [end..)     membership proof
//! ```

use crate::types::{DecodedEvent, TrustAnchor};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Size of the fixed header that precedes the raw event.
pub const HEADER_LEN: usize = 123;

const ADDRESS_LEN: usize = 20;
const TOPIC_LEN: usize = 32;
const ETH_SIGNATURE_OFFSET: u8 = 27;

/// Reasons a proof is rejected. The display strings are persisted verbatim in
/// the caller's result record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("invalid proof: got {got} bytes, at least {needed} are needed")]
    InvalidProof { got: usize, needed: usize },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("recovered invalid signer address: 0x{}", hex::encode(.0))]
    RecoveredInvalidSignerAddress(Address),

    #[error("invalid membership proof: {0}")]
    InvalidMembershipProof(String),

    #[error("invalid state root: 0x{}", hex::encode(.0))]
    InvalidStateRoot(B256),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Fixed-size header at the start of every proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofHeader {
    pub app_hash: B256,
    pub signature: [u8; 64],
    pub recovery_id: u8,
    pub chain_id: u32,
    pub peptide_height: u64,
    pub height: u64,
    pub tx_index: u16,
    pub log_index: u8,
    pub num_topics: u8,
    pub event_end: u16,
}

impl ProofHeader {
    /// Reads the header, failing if the proof is too short to contain it.
    pub fn parse(proof: &[u8]) -> Result<Self, VerifyError> {
        let header: &[u8; HEADER_LEN] = proof
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(VerifyError::InvalidProof {
                got: proof.len(),
                needed: HEADER_LEN,
            })?;

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&header[32..96]);

        Ok(ProofHeader {
            app_hash: B256::from_slice(&header[0..32]),
            signature,
            recovery_id: header[96],
            chain_id: u32::from_be_bytes([header[97], header[98], header[99], header[100]]),
            peptide_height: u64::from_be_bytes(array(&header[101..109])),
            height: u64::from_be_bytes(array(&header[109..117])),
            tx_index: u16::from_be_bytes([header[117], header[118]]),
            log_index: header[119],
            num_topics: header[120],
            event_end: u16::from_be_bytes([header[121], header[122]]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..32].copy_from_slice(self.app_hash.as_slice());
        out[32..96].copy_from_slice(&self.signature);
        out[96] = self.recovery_id;
        out[97..101].copy_from_slice(&self.chain_id.to_be_bytes());
        out[101..109].copy_from_slice(&self.peptide_height.to_be_bytes());
        out[109..117].copy_from_slice(&self.height.to_be_bytes());
        out[117..119].copy_from_slice(&self.tx_index.to_be_bytes());
        out[119] = self.log_index;
        out[120] = self.num_topics;
        out[121..123].copy_from_slice(&self.event_end.to_be_bytes());
        out
    }
}

fn array(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// Checks `proof` against `anchor` and decodes the proven event.
pub fn verify_event_proof(proof: &[u8], anchor: &TrustAnchor) -> Result<DecodedEvent, VerifyError> {
    let header = ProofHeader::parse(proof)?;

    let event_end = usize::from(header.event_end);
    if event_end < HEADER_LEN {
        return Err(VerifyError::InvalidEvent(format!(
            "event end {} is inside the proof header",
            event_end
        )));
    }
    // the event must be fully present; the membership proof follows it
    if proof.len() < event_end {
        return Err(VerifyError::InvalidProof {
            got: proof.len(),
            needed: event_end,
        });
    }

    let recovered = recover_signer(anchor.peptide_chain_id, &header)?;
    if recovered != anchor.signer_addr {
        return Err(VerifyError::RecoveredInvalidSignerAddress(recovered));
    }

    let raw_event = &proof[HEADER_LEN..event_end];
    let key = membership_key(&header, &anchor.client_type);
    let value = keccak256(raw_event);
    verify_membership(&header.app_hash, key.as_bytes(), &value, &proof[event_end..])?;

    decode_event(raw_event, usize::from(header.num_topics), header.chain_id.into())
}

/// Digest signed by the peptide signer for a given state root and height.
pub fn signing_digest(peptide_chain_id: u64, app_hash: &B256, peptide_height: u64) -> B256 {
    let mut message = Vec::with_capacity(40);
    message.extend_from_slice(app_hash.as_slice());
    message.extend_from_slice(&peptide_height.to_be_bytes());
    let message_hash = keccak256(&message);

    let mut preimage = Vec::with_capacity(96);
    preimage.extend_from_slice(&[0u8; 32]);
    preimage.extend_from_slice(B256::left_padding_from(&peptide_chain_id.to_be_bytes()).as_slice());
    preimage.extend_from_slice(message_hash.as_slice());
    keccak256(&preimage)
}

/// Key under which the event is stored in the peptide state tree.
pub fn membership_key(header: &ProofHeader, client_type: &str) -> String {
    format!(
        "chain/{}/storedLogs/{}/{}/{}/{}",
        header.chain_id, client_type, header.height, header.tx_index, header.log_index
    )
}

/// Ethereum address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // drop the 0x04 sec1 tag, keep the last 20 bytes of the hash
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

fn recover_signer(peptide_chain_id: u64, header: &ProofHeader) -> Result<Address, VerifyError> {
    let digest = signing_digest(peptide_chain_id, &header.app_hash, header.peptide_height);

    let recovery_id = header
        .recovery_id
        .checked_sub(ETH_SIGNATURE_OFFSET)
        .and_then(RecoveryId::from_byte)
        .ok_or_else(|| {
            VerifyError::InvalidSignature(format!("invalid recovery id {}", header.recovery_id))
        })?;
    let signature = Signature::from_slice(&header.signature)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Hash of the leaf holding `value` under `key`.
pub fn leaf_hash(prefix: &[u8], key: &[u8], value: &B256) -> B256 {
    let digest = Sha256::new()
        .chain_update(prefix)
        .chain_update(key)
        .chain_update([32u8])
        .chain_update(Sha256::digest(value))
        .finalize();
    B256::from_slice(&digest)
}

/// Hash of an inner node wrapping `child` between `prefix` and `suffix`.
pub fn inner_hash(prefix: &[u8], child: &B256, suffix: &[u8]) -> B256 {
    let digest = Sha256::new()
        .chain_update(prefix)
        .chain_update(child)
        .chain_update(suffix)
        .finalize();
    B256::from_slice(&digest)
}

/// Folds the membership proof from the leaf up and compares the root with
/// `app_hash`.
///
/// Layout: `[num_paths, path_zero_start, leaf_prefix.., path*]` where every
/// path is `[suffix_start, suffix_end, prefix.., suffix..]` with both indexes
/// relative to the start of the path.
fn verify_membership(
    app_hash: &B256,
    key: &[u8],
    value: &B256,
    proof: &[u8],
) -> Result<(), VerifyError> {
    if proof.len() < 2 {
        return Err(VerifyError::InvalidMembershipProof(
            "can't read start of first path".to_string(),
        ));
    }

    let number_of_paths = usize::from(proof[0]);
    let path_zero_start = usize::from(proof[1]);

    if path_zero_start < 2 || proof.len() < path_zero_start {
        return Err(VerifyError::InvalidMembershipProof(
            "can't read first path".to_string(),
        ));
    }

    let mut hash = leaf_hash(&proof[2..path_zero_start], key, value);

    let mut offset = path_zero_start;
    for _ in 0..number_of_paths {
        let path = &proof[offset.min(proof.len())..];
        let (suffix_start, suffix_end) = match path {
            [start, end, ..] => (usize::from(*start), usize::from(*end)),
            _ => {
                return Err(VerifyError::InvalidMembershipProof(
                    "can't read path".to_string(),
                ))
            }
        };
        if suffix_start < 2 || suffix_end < suffix_start || path.len() < suffix_end {
            return Err(VerifyError::InvalidMembershipProof(
                "can't read path".to_string(),
            ));
        }

        hash = inner_hash(
            &path[2..suffix_start],
            &hash,
            &path[suffix_start..suffix_end],
        );
        offset += suffix_end;
    }

    if hash != *app_hash {
        return Err(VerifyError::InvalidStateRoot(hash));
    }

    Ok(())
}

fn decode_event(raw_event: &[u8], num_topics: usize, chain_id: u64) -> Result<DecodedEvent, VerifyError> {
    let topics_end = ADDRESS_LEN + TOPIC_LEN * num_topics;
    if raw_event.len() < topics_end {
        return Err(VerifyError::InvalidEvent(format!(
            "got {} bytes, at least {} are needed for {} topics",
            raw_event.len(),
            topics_end,
            num_topics
        )));
    }

    Ok(DecodedEvent {
        chain_id,
        emitting_contract: Address::from_slice(&raw_event[..ADDRESS_LEN]),
        topics: raw_event[ADDRESS_LEN..topics_end]
            .chunks_exact(TOPIC_LEN)
            .map(B256::from_slice)
            .collect(),
        unindexed_data: Bytes::copy_from_slice(&raw_event[topics_end..]),
    })
}
