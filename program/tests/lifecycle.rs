mod common;

use alloy_primitives::Address;
use common::*;
use polymer_prover_primitives::testing::{sepolia_fixture, small_fixture};
use polymer_prover_program::{
    AuthError, ForwardingClient, InMemoryStore, Operation, ProgramAccounts, ProgramConfig,
    ProofCacheClient, ProverError, ProverProgram, ResizeOutcome, StorageKey,
};
use std::sync::Arc;

#[tokio::test]
async fn initialize_only_once() {
    let fixture = small_fixture();
    let program = initialized(&fixture).await;
    let before = program.read_config().await.unwrap().unwrap();
    assert_eq!(DEPLOYER, before.authority);
    assert_eq!(fixture.anchor, before.trust_anchor());

    let err = program
        .initialize(&alice().id(), "other".to_string(), Address::repeat_byte(9), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ProverError::AlreadyInitialized));
    assert_eq!(6000, err.code());

    assert_eq!(before, program.read_config().await.unwrap().unwrap());
}

#[tokio::test]
async fn accounts_lifecycle() {
    let program = program();
    let config = program.config().clone();
    let alice = alice();

    let deposit = alice.create_accounts(&program).await.unwrap();
    assert_eq!(config.deposit_for(config.cache_capacity), deposit);

    let cache = program.proof_cache(&alice.id()).await.unwrap().unwrap();
    assert!(cache.is_empty());
    assert_eq!(3_000, cache.capacity);
    let result = program.validation_result(&alice.id()).await.unwrap().unwrap();
    assert!(!result.is_valid);
    assert!(result.error_message.is_empty());

    let err = alice.create_accounts(&program).await.unwrap_err();
    assert!(
        matches!(err, ProverError::AccountAlreadyExists(key) if key == StorageKey::cache(&alice.id()))
    );

    assert_eq!(deposit, alice.close_accounts(&program).await.unwrap());
    assert!(program.proof_cache(&alice.id()).await.unwrap().is_none());
    assert!(program.validation_result(&alice.id()).await.unwrap().is_none());
    assert_eq!(0, program.store().cache_count().await);

    let err = alice.close_accounts(&program).await.unwrap_err();
    assert!(matches!(err, ProverError::AccountNotFound(_)));

    alice.create_accounts(&program).await.unwrap();
    assert!(program.proof_cache(&alice.id()).await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn nonce_survives_closing_accounts() {
    let program = program();
    let alice = alice();

    let create = alice.sign(&program, Operation::CreateAccounts, &[]).await;
    program.create_accounts(&create).await.unwrap();
    alice.close_accounts(&program).await.unwrap();
    assert_eq!(2, program.nonce(&alice.id()).await.unwrap());

    let err = program.create_accounts(&create).await.unwrap_err();
    assert!(matches!(
        err,
        ProverError::Authorization(AuthError::StaleNonce { got: 0, expected: 2 })
    ));
    assert!(program.proof_cache(&alice.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn closing_keeps_other_callers() {
    let program = program();
    let (alice, bob) = (alice(), bob());
    alice.create_accounts(&program).await.unwrap();
    bob.create_accounts(&program).await.unwrap();

    alice.close_accounts(&program).await.unwrap();

    assert!(program.proof_cache(&bob.id()).await.unwrap().is_some());
    assert!(program.validation_result(&bob.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn lifecycle_calls_need_the_callers_signature() {
    let program = program();
    let (alice, bob) = (alice(), bob());
    alice.create_accounts(&program).await.unwrap();

    // bob signs, then claims to be alice
    let nonce = program.nonce(&alice.id()).await.unwrap();
    for operation in [
        Operation::ClearProofCache,
        Operation::ResizeProofCache,
        Operation::CloseAccounts,
    ] {
        let mut forged = bob.key.authorize(operation, nonce, &[]).unwrap();
        forged.identity = alice.id();
        let err = match operation {
            Operation::ClearProofCache => program.clear_proof_cache(&forged).await.err(),
            Operation::ResizeProofCache => program.resize_proof_cache(&forged).await.err(),
            _ => program.close_accounts(&forged).await.err(),
        };
        assert!(
            matches!(
                err,
                Some(ProverError::Authorization(AuthError::SignerMismatch { .. }))
            ),
            "{}",
            operation
        );
    }

    assert!(program.proof_cache(&alice.id()).await.unwrap().is_some());
    assert_eq!(nonce, program.nonce(&alice.id()).await.unwrap());
}

#[tokio::test]
async fn clear_discards_partial_upload() {
    let fixture = sepolia_fixture();
    let program = initialized(&fixture).await;
    let alice = alice();
    with_accounts(&program, &alice).await;

    alice.load(&program, &[0xff; 300]).await.unwrap();
    alice.clear(&program).await.unwrap();
    assert!(program.proof_cache(&alice.id()).await.unwrap().unwrap().is_empty());

    program
        .load_proof_chunked(&alice.key, &fixture.proof, 800)
        .await
        .unwrap();
    assert!(alice.validate(&program).await.unwrap().is_valid());
}

#[tokio::test]
async fn clear_without_accounts_fails() {
    let program = program();
    let err = alice().clear(&program).await.unwrap_err();
    assert!(matches!(err, ProverError::AccountNotFound(_)));
}

#[tokio::test]
async fn resize_follows_deployment_capacity() {
    let store = Arc::new(InMemoryStore::new());
    let small = ProverProgram::with_store(
        store.clone(),
        ProgramConfig::default().with_cache_capacity(1_000),
    );
    let large = ProverProgram::with_store(
        store.clone(),
        ProgramConfig::default().with_cache_capacity(4_000),
    );
    let alice = alice();

    let deposit = alice.create_accounts(&small).await.unwrap();
    alice.load(&small, &[1; 900]).await.unwrap();

    let grown = alice.resize(&large).await.unwrap();
    assert_eq!(
        ResizeOutcome {
            old_capacity: 1_000,
            new_capacity: 4_000,
            deposit_delta: i128::from(large.config().deposit_for(4_000)) - i128::from(deposit),
        },
        grown
    );
    alice.load(&large, &[2; 3_000]).await.unwrap();
    let cache = large.proof_cache(&alice.id()).await.unwrap().unwrap();
    assert_eq!(3_900, cache.len());
    assert_eq!(&[1u8; 900][..], &cache.cache[..900]);

    let err = alice.resize(&small).await.unwrap_err();
    assert!(matches!(
        err,
        ProverError::CacheShrinkBelowContent {
            cached: 3_900,
            capacity: 1_000
        }
    ));
    assert_eq!(4_000, small.proof_cache(&alice.id()).await.unwrap().unwrap().capacity);

    alice.clear(&small).await.unwrap();
    let shrunk = alice.resize(&small).await.unwrap();
    assert_eq!(1_000, shrunk.new_capacity);
    assert!(shrunk.deposit_delta < 0);
    assert_eq!(deposit, alice.close_accounts(&small).await.unwrap());
}

#[tokio::test]
async fn resize_without_accounts_fails() {
    let program = program();
    let err = alice().resize(&program).await.unwrap_err();
    assert!(matches!(err, ProverError::AccountNotFound(_)));
}

#[tokio::test]
async fn forwarding_client_matches_direct_calls() {
    let fixture = sepolia_fixture();
    let program = Arc::new(initialized(&fixture).await);
    let client = ForwardingClient::new(program.clone());
    let (alice, bob) = (alice(), bob());

    with_accounts(&program, &alice).await;
    let relayed = with_accounts(&program, &bob).await;

    program
        .load_proof_chunked(&alice.key, &fixture.proof, 800)
        .await
        .unwrap();
    for chunk in fixture.proof.chunks(800) {
        let auth = bob.sign(&program, Operation::LoadProof, chunk).await;
        client.call_load_proof(&relayed, chunk, &auth).await.unwrap();
    }

    let direct_outcome = alice.validate(&program).await.unwrap();
    let auth = bob.sign(&program, Operation::ValidateEvent, &[]).await;
    let relayed_outcome = client.call_validate_event(&relayed, &auth).await.unwrap();
    assert_eq!(direct_outcome, relayed_outcome);

    assert_eq!(
        program.validation_result(&alice.id()).await.unwrap(),
        program.validation_result(&bob.id()).await.unwrap()
    );
}

#[tokio::test]
async fn forwarding_client_relays_errors_unchanged() {
    let fixture = small_fixture();
    let program = Arc::new(initialized(&fixture).await);
    let client = ForwardingClient::new(program.clone());
    let (alice, bob) = (alice(), bob());
    with_accounts(&program, &alice).await;

    let stolen = ProgramAccounts {
        authority: bob.id(),
        ..alice.accounts()
    };
    let auth = bob.sign(&program, Operation::LoadProof, &fixture.proof).await;
    let err = client
        .call_load_proof(&stolen, &fixture.proof, &auth)
        .await
        .unwrap_err();
    assert!(matches!(err, ProverError::UnauthorizedCaller { .. }));

    let auth = bob.sign(&program, Operation::ValidateEvent, &[]).await;
    let err = client.call_validate_event(&stolen, &auth).await.unwrap_err();
    assert!(matches!(err, ProverError::UnauthorizedCaller { .. }));

    client
        .load_proof_chunked(&alice.key, &fixture.proof, 50)
        .await
        .unwrap();
    let auth = alice.sign(&program, Operation::ValidateEvent, &[]).await;
    assert!(client
        .validate_event(&alice.accounts(), &auth)
        .await
        .unwrap()
        .is_valid());
}

#[tokio::test]
async fn forwarder_cannot_act_for_a_caller_without_their_signature() {
    let fixture = small_fixture();
    let program = Arc::new(initialized(&fixture).await);
    let client = ForwardingClient::new(program.clone());
    let (alice, mallory) = (alice(), caller(0x66));
    let victim = with_accounts(&program, &alice).await;

    alice.load(&program, &fixture.proof[..40]).await.unwrap();
    let nonce = program.nonce(&alice.id()).await.unwrap();

    // the forwarder holds alice's accounts but only its own key
    let mut forged = mallory
        .key
        .authorize(Operation::LoadProof, nonce, &[0xee; 16])
        .unwrap();
    forged.identity = alice.id();
    let err = client
        .call_load_proof(&victim, &[0xee; 16], &forged)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProverError::Authorization(AuthError::SignerMismatch { .. })
    ));

    let own = mallory
        .key
        .authorize(Operation::ValidateEvent, nonce, &[])
        .unwrap();
    let err = client.call_validate_event(&victim, &own).await.unwrap_err();
    assert!(matches!(err, ProverError::UnauthorizedCaller { .. }));

    // alice's signature at an earlier nonce is stale
    let stale = alice
        .key
        .authorize(Operation::ValidateEvent, nonce - 1, &[])
        .unwrap();
    let err = client.call_validate_event(&victim, &stale).await.unwrap_err();
    assert!(matches!(
        err,
        ProverError::Authorization(AuthError::StaleNonce { .. })
    ));

    let cache = program.proof_cache(&alice.id()).await.unwrap().unwrap();
    assert_eq!(&fixture.proof[..40], &cache.cache[..]);
    let result = program.validation_result(&alice.id()).await.unwrap().unwrap();
    assert!(!result.is_valid);
    assert!(result.error_message.is_empty());
    assert_eq!(nonce, program.nonce(&alice.id()).await.unwrap());
}
