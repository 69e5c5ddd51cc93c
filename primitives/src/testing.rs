//! Deterministic proof fixtures signed by a throwaway peptide key.

use crate::{
    types::{DecodedEvent, TrustAnchor},
    verify::{
        address_of, inner_hash, leaf_hash, membership_key, signing_digest, ProofHeader,
        HEADER_LEN,
    },
};
use alloy_primitives::{address, keccak256, Address, Bytes, B256};
use k256::ecdsa::SigningKey;

/// Secret key of the fake peptide signer used by every fixture.
pub const PEPTIDE_SIGNER_KEY: [u8; 32] = [0x42; 32];
pub const CLIENT_TYPE: &str = "proof_api";
pub const PEPTIDE_CHAIN_ID: u64 = 901;

/// Source chain of [`sepolia_fixture`].
pub const SEPOLIA_CHAIN_ID: u32 = 11_155_420;
pub const SEPOLIA_EMITTING_CONTRACT: Address = address!("f221750e52aa080835d2957f2eed0d5d7ddd8c38");

/// A signed proof along with the anchor that accepts it and the event it
/// decodes to.
#[derive(Debug, Clone)]
pub struct ProofFixture {
    pub proof: Vec<u8>,
    pub anchor: TrustAnchor,
    pub event: DecodedEvent,
}

#[derive(Debug, Clone)]
pub struct ProofBuilder {
    signer: SigningKey,
    client_type: String,
    peptide_chain_id: u64,
    peptide_height: u64,
    chain_id: u32,
    height: u64,
    tx_index: u16,
    log_index: u8,
    emitting_contract: Address,
    topics: Vec<B256>,
    data: Vec<u8>,
    leaf_prefix: Vec<u8>,
    paths: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ProofBuilder {
    pub fn new(chain_id: u32) -> Self {
        ProofBuilder {
            signer: SigningKey::from_slice(&PEPTIDE_SIGNER_KEY).expect("fixture key is a valid scalar"),
            client_type: CLIENT_TYPE.to_string(),
            peptide_chain_id: PEPTIDE_CHAIN_ID,
            peptide_height: 4_242,
            chain_id,
            height: 19_000_000,
            tx_index: 3,
            log_index: 1,
            emitting_contract: SEPOLIA_EMITTING_CONTRACT,
            topics: (1..=3u8).map(B256::repeat_byte).collect(),
            data: pattern(64),
            leaf_prefix: vec![0x00, 0x02, 0x04],
            paths: (0..4u8).map(|i| (vec![i], vec![0xa0 | i; 29])).collect(),
        }
    }

    pub fn topics(mut self, topics: Vec<B256>) -> Self {
        self.topics = topics;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Inner nodes from the leaf up, as `(prefix, suffix)` pairs.
    pub fn paths(mut self, paths: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        self.paths = paths;
        self
    }

    pub fn log_index(mut self, log_index: u8) -> Self {
        self.log_index = log_index;
        self
    }

    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor {
            client_type: self.client_type.clone(),
            signer_addr: address_of(self.signer.verifying_key()),
            peptide_chain_id: self.peptide_chain_id,
        }
    }

    pub fn build(&self) -> ProofFixture {
        let mut raw_event = Vec::new();
        raw_event.extend_from_slice(self.emitting_contract.as_slice());
        for topic in &self.topics {
            raw_event.extend_from_slice(topic.as_slice());
        }
        raw_event.extend_from_slice(&self.data);

        let mut header = ProofHeader {
            app_hash: B256::ZERO,
            signature: [0u8; 64],
            recovery_id: 0,
            chain_id: self.chain_id,
            peptide_height: self.peptide_height,
            height: self.height,
            tx_index: self.tx_index,
            log_index: self.log_index,
            num_topics: u8::try_from(self.topics.len()).expect("too many topics"),
            event_end: u16::try_from(HEADER_LEN + raw_event.len()).expect("event too large"),
        };

        let key = membership_key(&header, &self.client_type);
        let mut root = leaf_hash(&self.leaf_prefix, key.as_bytes(), &keccak256(&raw_event));
        let mut membership = vec![
            u8::try_from(self.paths.len()).expect("too many paths"),
            u8::try_from(2 + self.leaf_prefix.len()).expect("leaf prefix too long"),
        ];
        membership.extend_from_slice(&self.leaf_prefix);
        for (prefix, suffix) in &self.paths {
            root = inner_hash(prefix, &root, suffix);
            membership.push(u8::try_from(2 + prefix.len()).expect("path prefix too long"));
            membership.push(u8::try_from(2 + prefix.len() + suffix.len()).expect("path too long"));
            membership.extend_from_slice(prefix);
            membership.extend_from_slice(suffix);
        }

        let digest = signing_digest(self.peptide_chain_id, &root, self.peptide_height);
        let (signature, recovery_id) = self
            .signer
            .sign_prehash_recoverable(digest.as_slice())
            .expect("signing a 32 byte digest");
        header.app_hash = root;
        header.signature.copy_from_slice(&signature.to_bytes());
        header.recovery_id = recovery_id.to_byte() + 27;

        let mut proof = header.encode().to_vec();
        proof.extend_from_slice(&raw_event);
        proof.extend_from_slice(&membership);

        ProofFixture {
            proof,
            anchor: self.anchor(),
            event: DecodedEvent {
                chain_id: self.chain_id.into(),
                emitting_contract: self.emitting_contract,
                topics: self.topics.clone(),
                unindexed_data: Bytes::from(self.data.clone()),
            },
        }
    }
}

/// A 1,500 byte proof of an event emitted on chain 11155420.
///
/// 123 header bytes, a 1,116 byte event (3 topics, 1,000 data bytes) and a
/// 261 byte membership proof with 8 inner nodes.
pub fn sepolia_fixture() -> ProofFixture {
    ProofBuilder::new(SEPOLIA_CHAIN_ID)
        .data(pattern(1_000))
        .paths((0..8u8).map(|i| (vec![i], vec![0xb0 | i; 29])).collect())
        .build()
}

/// A proof for the same event as [`sepolia_fixture`] but small enough to be
/// loaded in a single chunk.
pub fn small_fixture() -> ProofFixture {
    ProofBuilder::new(SEPOLIA_CHAIN_ID).build()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}
