#![allow(dead_code)]

use polymer_prover_primitives::testing::ProofFixture;
use polymer_prover_program::{
    CallerAuthorization, CallerIdentity, CallerKey, InMemoryStore, Operation, ProgramAccounts,
    ProgramConfig, ProverProgram, ProverResult, ResizeOutcome, ValidateEventResult,
};
use std::sync::Arc;

pub const DEPLOYER: CallerIdentity = CallerIdentity::new([0xde; 32]);

pub type Program = ProverProgram<InMemoryStore>;

/// A caller signing its own calls with a fixed key.
#[derive(Debug, Clone)]
pub struct Caller {
    pub key: CallerKey,
}

pub fn caller(seed: u8) -> Caller {
    Caller {
        key: CallerKey::from_bytes(&[seed; 32]).unwrap(),
    }
}

pub fn alice() -> Caller {
    caller(0xa1)
}

pub fn bob() -> Caller {
    caller(0xb0)
}

impl Caller {
    pub fn id(&self) -> CallerIdentity {
        self.key.identity()
    }

    pub fn accounts(&self) -> ProgramAccounts {
        ProgramAccounts::for_caller(self.id())
    }

    /// Signs `operation` at the caller's current nonce on `program`.
    pub async fn sign(
        &self,
        program: &Program,
        operation: Operation,
        payload: &[u8],
    ) -> CallerAuthorization {
        let nonce = program.nonce(&self.id()).await.unwrap();
        self.key.authorize(operation, nonce, payload).unwrap()
    }

    pub async fn create_accounts(&self, program: &Program) -> ProverResult<u64> {
        let auth = self.sign(program, Operation::CreateAccounts, &[]).await;
        program.create_accounts(&auth).await
    }

    pub async fn close_accounts(&self, program: &Program) -> ProverResult<u64> {
        let auth = self.sign(program, Operation::CloseAccounts, &[]).await;
        program.close_accounts(&auth).await
    }

    pub async fn resize(&self, program: &Program) -> ProverResult<ResizeOutcome> {
        let auth = self.sign(program, Operation::ResizeProofCache, &[]).await;
        program.resize_proof_cache(&auth).await
    }

    pub async fn clear(&self, program: &Program) -> ProverResult<()> {
        let auth = self.sign(program, Operation::ClearProofCache, &[]).await;
        program.clear_proof_cache(&auth).await
    }

    pub async fn load(&self, program: &Program, chunk: &[u8]) -> ProverResult<usize> {
        let auth = self.sign(program, Operation::LoadProof, chunk).await;
        program.load_proof(&self.accounts(), chunk, &auth).await
    }

    pub async fn validate(&self, program: &Program) -> ProverResult<ValidateEventResult> {
        let auth = self.sign(program, Operation::ValidateEvent, &[]).await;
        program.validate_event(&self.accounts(), &auth).await
    }

    pub async fn validate_with_proof(
        &self,
        program: &Program,
        proof: &[u8],
    ) -> ProverResult<ValidateEventResult> {
        let auth = self
            .sign(program, Operation::ValidateEventWithProof, proof)
            .await;
        program
            .validate_event_with_proof(&self.accounts(), proof, &auth)
            .await
    }
}

pub fn program() -> Program {
    ProverProgram::with_store(Arc::new(InMemoryStore::new()), ProgramConfig::default())
}

pub async fn initialized(fixture: &ProofFixture) -> Program {
    let program = program();
    initialize(&program, fixture).await;
    program
}

pub async fn initialize(program: &Program, fixture: &ProofFixture) {
    program
        .initialize(
            &DEPLOYER,
            fixture.anchor.client_type.clone(),
            fixture.anchor.signer_addr,
            fixture.anchor.peptide_chain_id,
        )
        .await
        .unwrap();
}

pub async fn with_accounts(program: &Program, caller: &Caller) -> ProgramAccounts {
    caller.create_accounts(program).await.unwrap();
    caller.accounts()
}
