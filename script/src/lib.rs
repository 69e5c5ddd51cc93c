//! Operator tooling for the polymer prover: a Redis backed account store,
//! process-wide tracing setup and helpers shared by `proverctl`.

use anyhow::Context;
use polymer_prover_program::{CallerKey, DecodedEvent, ProgramConfig};
use std::{env, path::Path};

pub mod redis_store;
pub mod tracing;

pub use crate::tracing::init_tracing;

/// Environment variable overriding the capacity of new proof caches.
pub const CACHE_CAPACITY_ENV_VAR: &str = "PROVER_CACHE_CAPACITY";

/// Reads a proof from `path`. The file holds the proof as hex, with or
/// without a `0x` prefix; surrounding whitespace is ignored.
pub fn read_proof_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read proof file {}", path.display()))?;
    decode_proof_hex(&text)
}

pub fn decode_proof_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = text.trim();
    hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed)).context("proof is not valid hex")
}

/// Parses a hex encoded 32 byte secret key, with or without a `0x` prefix.
pub fn parse_caller_key(text: &str) -> anyhow::Result<CallerKey> {
    let trimmed = text.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .context("caller key is not valid hex")?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow::anyhow!("caller key has {} bytes, expected 32", bytes.len()))?;
    Ok(CallerKey::from_bytes(&secret)?)
}

/// Program settings for this process, from the environment.
pub fn program_config_from_env(lock_ttl: std::time::Duration) -> anyhow::Result<ProgramConfig> {
    let mut config = ProgramConfig {
        lock_ttl,
        ..ProgramConfig::default()
    };
    if let Ok(capacity) = env::var(CACHE_CAPACITY_ENV_VAR) {
        config.cache_capacity = capacity
            .parse()
            .with_context(|| format!("{} must be a number", CACHE_CAPACITY_ENV_VAR))?;
    }
    Ok(config)
}

/// Renders a decoded event the way `proverctl` prints it.
pub fn format_event(event: &DecodedEvent) -> String {
    let topics = event
        .topics
        .iter()
        .map(|topic| topic.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "chain_id: {}\nemitting_contract: {}\ntopics: [{}]\nunindexed_data: {}",
        event.chain_id, event.emitting_contract, topics, event.unindexed_data
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, B256};

    #[test]
    fn decodes_prefixed_and_bare_hex() {
        assert_eq!(vec![0xde, 0xad], decode_proof_hex("0xdead\n").unwrap());
        assert_eq!(vec![0xbe, 0xef], decode_proof_hex("  beef ").unwrap());
        assert!(decode_proof_hex("0xzz").is_err());
    }

    #[test]
    fn parses_caller_keys() {
        let key = parse_caller_key(&format!("0x{}", "11".repeat(32))).unwrap();
        assert_eq!(
            CallerKey::from_bytes(&[0x11; 32]).unwrap().identity(),
            key.identity()
        );
        assert!(parse_caller_key("1111").is_err());
        assert!(parse_caller_key(&"00".repeat(32)).is_err());
    }

    #[test]
    fn formats_event_fields() {
        let event = DecodedEvent {
            chain_id: 11_155_420,
            emitting_contract: Address::repeat_byte(0x11),
            topics: vec![B256::repeat_byte(0x22)],
            unindexed_data: Bytes::from_static(&[0x33]),
        };
        let text = format_event(&event);

        assert!(text.starts_with("chain_id: 11155420\n"));
        assert!(text.contains(&format!("topics: [{}]", B256::repeat_byte(0x22))));
        assert!(text.ends_with("unindexed_data: 0x33"));
    }
}
