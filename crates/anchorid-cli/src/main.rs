//! anchorid-cli
//!
//! Operator CLI for the DID Layer-2 anchoring node. Builds and signs
//! Create/Update/Recover/Deactivate operations, submits them to a running
//! node via JSON-RPC, and resolves DIDs.
//!
//! Usage:
//!   anchorid-cli keygen     --out <path> [--kind update|recovery]
//!   anchorid-cli create     --document <path.json> --update-keyfile <path> --recovery-keyfile <path>
//!   anchorid-cli update     --did <suffix> --document <path.json> --current-update-keyfile <path> --next-update-keyfile <path>
//!   anchorid-cli recover    --did <suffix> --document <path.json> --current-recovery-keyfile <path> --next-update-keyfile <path> --next-recovery-keyfile <path>
//!   anchorid-cli deactivate --did <suffix> --current-recovery-keyfile <path>
//!   anchorid-cli resolve    --did <did-or-long-form> [--rpc <url>]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use anchorid_core::identifier::DidSuffix;
use anchorid_core::operation::{
    DeactivateSignedPayload, Delta, Operation, Patch, RecoverSignedPayload, SuffixData,
    UpdateSignedPayload,
};
use anchorid_crypto::jws::sign_compact;
use anchorid_crypto::{base64url_encode, canonicalized_multihash, derive_suffix};

mod keys;
mod rpc_client;
use rpc_client::NodeRpcClient;

#[derive(Parser, Debug)]
#[command(
    name = "anchorid-cli",
    version,
    about = "Operator CLI for the anchoring node"
)]
struct Args {
    /// Node RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8765")]
    rpc: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a secp256k1 keypair and save it to a keyfile.
    Keygen {
        #[arg(long)]
        out: PathBuf,
        /// Purely a label stored alongside the key ("update"/"recovery").
        #[arg(long, default_value = "update")]
        kind: String,
    },

    /// Create a new DID: replaces the document with `--document`'s
    /// contents and commits to fresh update/recovery keys.
    Create {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        update_keyfile: PathBuf,
        #[arg(long)]
        recovery_keyfile: PathBuf,
    },

    /// Replace a DID's document, revealing the current update key and
    /// committing to a new one.
    Update {
        #[arg(long)]
        did: String,
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        current_update_keyfile: PathBuf,
        #[arg(long)]
        next_update_keyfile: PathBuf,
    },

    /// Recover a DID: reveals the current recovery key, replaces the
    /// document, and commits to new update/recovery keys.
    Recover {
        #[arg(long)]
        did: String,
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        current_recovery_keyfile: PathBuf,
        #[arg(long)]
        next_update_keyfile: PathBuf,
        #[arg(long)]
        next_recovery_keyfile: PathBuf,
    },

    /// Permanently deactivate a DID, revealing the current recovery key.
    Deactivate {
        #[arg(long)]
        did: String,
        #[arg(long)]
        current_recovery_keyfile: PathBuf,
    },

    /// Resolve a short- or long-form DID and print its resolution result.
    Resolve {
        #[arg(long)]
        did: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn,anchorid_cli=info")
        .init();

    let args = Args::parse();
    let client = NodeRpcClient::new(&args.rpc);

    match args.command {
        Command::Keygen { out, kind } => {
            let pair = keys::generate_and_save(&out, &kind)?;
            println!("Generated {kind} keypair.");
            println!("Public JWK: {}", serde_json::to_string(&keys::jwk(&pair))?);
            println!("Keyfile:    {}", out.display());
            Ok(())
        }

        Command::Create {
            document,
            update_keyfile,
            recovery_keyfile,
        } => {
            let patches = read_patches(&document)?;
            let update_pair = keys::generate_and_save(&update_keyfile, "update")?;
            let recovery_pair = keys::generate_and_save(&recovery_keyfile, "recovery")?;

            let update_commitment =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&update_pair))?);
            let delta = Delta {
                patches,
                update_commitment,
            };
            let delta_hash = hash_of(&delta)?;
            let recovery_commitment =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&recovery_pair))?);
            let suffix_data = SuffixData {
                delta_hash,
                recovery_commitment,
                type_: None,
            };
            let suffix = derive_suffix(&suffix_data)?;
            let op = Operation::Create { suffix_data, delta };

            submit(&client, &op).await?;
            println!("Created DID: did:anchor:{suffix}");
            println!("Update keyfile:   {}", update_keyfile.display());
            println!("Recovery keyfile: {}", recovery_keyfile.display());
            Ok(())
        }

        Command::Update {
            did,
            document,
            current_update_keyfile,
            next_update_keyfile,
        } => {
            let did_suffix = DidSuffix(did.clone());
            let patches = read_patches(&document)?;
            let current_pair = keys::load(&current_update_keyfile)?;
            let next_pair = keys::generate_and_save(&next_update_keyfile, "update")?;

            let update_commitment =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&next_pair))?);
            let delta = Delta {
                patches,
                update_commitment,
            };
            let delta_hash = hash_of(&delta)?;
            let reveal_value =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&current_pair))?);
            let payload = UpdateSignedPayload {
                delta_hash,
                update_key: keys::jwk(&current_pair),
            };
            let signed_data = sign_compact(&payload, &current_pair.secret_key, None)?;
            let op = Operation::Update {
                did_suffix,
                reveal_value,
                signed_data,
                delta,
            };

            submit(&client, &op).await?;
            println!("Updated DID: did:anchor:{did}");
            println!("Next update keyfile: {}", next_update_keyfile.display());
            Ok(())
        }

        Command::Recover {
            did,
            document,
            current_recovery_keyfile,
            next_update_keyfile,
            next_recovery_keyfile,
        } => {
            let did_suffix = DidSuffix(did.clone());
            let patches = read_patches(&document)?;
            let current_pair = keys::load(&current_recovery_keyfile)?;
            let next_update_pair = keys::generate_and_save(&next_update_keyfile, "update")?;
            let next_recovery_pair = keys::generate_and_save(&next_recovery_keyfile, "recovery")?;

            let update_commitment =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&next_update_pair))?);
            let delta = Delta {
                patches,
                update_commitment,
            };
            let delta_hash = hash_of(&delta)?;
            let reveal_value =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&current_pair))?);
            let next_recovery_commitment =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&next_recovery_pair))?);
            let payload = RecoverSignedPayload {
                delta_hash,
                recovery_key: keys::jwk(&current_pair),
                recovery_commitment: next_recovery_commitment,
            };
            let signed_data = sign_compact(&payload, &current_pair.secret_key, None)?;
            let op = Operation::Recover {
                did_suffix,
                reveal_value,
                signed_data,
                delta,
            };

            submit(&client, &op).await?;
            println!("Recovered DID: did:anchor:{did}");
            println!("Next update keyfile:   {}", next_update_keyfile.display());
            println!("Next recovery keyfile: {}", next_recovery_keyfile.display());
            Ok(())
        }

        Command::Deactivate {
            did,
            current_recovery_keyfile,
        } => {
            let did_suffix = DidSuffix(did.clone());
            let current_pair = keys::load(&current_recovery_keyfile)?;
            let reveal_value =
                canonicalized_multihash(&serde_json::to_value(keys::jwk(&current_pair))?);
            let payload = DeactivateSignedPayload {
                did_suffix: did.clone(),
                recovery_key: keys::jwk(&current_pair),
            };
            let signed_data = sign_compact(&payload, &current_pair.secret_key, None)?;
            let op = Operation::Deactivate {
                did_suffix,
                reveal_value,
                signed_data,
            };

            submit(&client, &op).await?;
            println!("Deactivated DID: did:anchor:{did}");
            Ok(())
        }

        Command::Resolve { did } => {
            let result = client.resolve(&did).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn submit(client: &NodeRpcClient, op: &Operation) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(op).context("serializing operation")?;
    let b64 = base64url_encode(&bytes);
    client.submit_operation(&b64).await?;
    info!(operation = op.type_name(), "operation submitted");
    Ok(())
}

fn hash_of(delta: &Delta) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(delta).context("serializing delta")?;
    Ok(anchorid_crypto::multihash::hash_to_multihash(&bytes))
}

fn read_patches(path: &PathBuf) -> anyhow::Result<Vec<Patch>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading document patch file {}", path.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&json).context("parsing document JSON")?;
    Ok(vec![Patch::Replace { document }])
}
