/// Operate a polymer prover deployment backed by Redis
use alloy_primitives::Address;
use anyhow::Context;
use clap::{Parser, Subcommand};
use polymer_prover_program::{
    AccountStore, CallerAuthorization, CallerKey, Operation, ProgramAccounts, ProofCacheClient,
    ProverProgram, ValidateEventResult,
};
use polymer_prover_script::{
    format_event, init_tracing, parse_caller_key, program_config_from_env, read_proof_file,
    redis_store::RedisStore,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(about = "Manage the proof cache, result and config records of a polymer prover.")]
pub struct Cli {
    /// Hex encoded 32 byte secret key the calls are signed with
    #[arg(long, env = "PROVER_CALLER_KEY", value_parser = parse_caller_key, hide_env_values = true)]
    pub caller_key: CallerKey,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store the trust anchor of the deployment
    Initialize {
        #[arg(long)]
        client_type: String,
        #[arg(long)]
        signer_addr: Address,
        #[arg(long)]
        peptide_chain_id: u64,
    },
    /// Provision the proof cache and result record of the identity
    CreateAccounts,
    /// Upload a hex encoded proof file into the proof cache
    LoadProof {
        #[arg(long)]
        proof_file: PathBuf,
        #[arg(long, default_value_t = 800)]
        chunk_size: usize,
    },
    /// Validate the cached proof, or the given proof file without using the cache
    ValidateEvent {
        #[arg(long)]
        proof_file: Option<PathBuf>,
    },
    ClearCache,
    ResizeCache,
    CloseAccounts,
    /// Print the outcome of the last validation
    ShowResult,
}

/// Signs `operation` at the caller's current nonce.
async fn authorize<S: AccountStore>(
    program: &ProverProgram<S>,
    key: &CallerKey,
    operation: Operation,
    payload: &[u8],
) -> anyhow::Result<CallerAuthorization> {
    let nonce = program.nonce(&key.identity()).await?;
    Ok(key.authorize(operation, nonce, payload)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing().context("failed to set up tracing")?;

    let cli = Cli::parse();
    let store = Arc::new(RedisStore::new().await?);
    let config = program_config_from_env(store.lock_duration())?;
    let program = ProverProgram::with_store(store, config);
    let key = cli.caller_key;
    let identity = key.identity();
    let accounts = ProgramAccounts::for_caller(identity);
    info!("calling as {}", identity);

    match cli.command {
        Command::Initialize {
            client_type,
            signer_addr,
            peptide_chain_id,
        } => {
            program
                .initialize(&identity, client_type, signer_addr, peptide_chain_id)
                .await?;
            println!("program successfully initialized");
        }
        Command::CreateAccounts => {
            let auth = authorize(&program, &key, Operation::CreateAccounts, &[]).await?;
            let deposit = program.create_accounts(&auth).await?;
            println!("accounts successfully created, deposit: {}", deposit);
        }
        Command::LoadProof {
            proof_file,
            chunk_size,
        } => {
            let proof = read_proof_file(&proof_file)?;
            info!("loading {} byte proof in chunks of {}", proof.len(), chunk_size);
            let cached = program
                .load_proof_chunked(&key, &proof, chunk_size)
                .await?;
            println!("proof successfully loaded, {} bytes cached", cached);
        }
        Command::ValidateEvent { proof_file } => {
            let outcome = match proof_file {
                Some(path) => {
                    let proof = read_proof_file(&path)?;
                    let auth =
                        authorize(&program, &key, Operation::ValidateEventWithProof, &proof).await?;
                    program
                        .validate_event_with_proof(&accounts, &proof, &auth)
                        .await?
                }
                None => {
                    let auth = authorize(&program, &key, Operation::ValidateEvent, &[]).await?;
                    program.validate_event(&accounts, &auth).await?
                }
            };
            match outcome {
                ValidateEventResult::Valid(event) => {
                    println!("proof is valid\n{}", format_event(&event))
                }
                ValidateEventResult::Invalid(err) => println!("proof is invalid: {}", err),
            }
        }
        Command::ClearCache => {
            let auth = authorize(&program, &key, Operation::ClearProofCache, &[]).await?;
            program.clear_proof_cache(&auth).await?;
            println!("proof cache successfully cleared");
        }
        Command::ResizeCache => {
            let auth = authorize(&program, &key, Operation::ResizeProofCache, &[]).await?;
            let outcome = program.resize_proof_cache(&auth).await?;
            println!(
                "proof cache successfully resized from {} to {} bytes, deposit change: {}",
                outcome.old_capacity, outcome.new_capacity, outcome.deposit_delta
            );
        }
        Command::CloseAccounts => {
            let auth = authorize(&program, &key, Operation::CloseAccounts, &[]).await?;
            let deposit = program.close_accounts(&auth).await?;
            println!("accounts successfully closed, returned deposit: {}", deposit);
        }
        Command::ShowResult => match program.validation_result(&identity).await? {
            Some(result) => match result.event() {
                Some(event) => println!("proof is valid\n{}", format_event(&event)),
                None if result.error_message.is_empty() => println!("no proof validated yet"),
                None => println!("proof is invalid: {}", result.error_message),
            },
            None => println!("no accounts for {}", identity),
        },
    }

    Ok(())
}
