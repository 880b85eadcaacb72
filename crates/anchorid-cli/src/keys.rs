//! Keyfile persistence and the commitment/reveal bookkeeping an operator
//! needs to build Update/Recover/Deactivate operations by hand (spec.md
//! §3, §4.4). A production operator would keep this state in a wallet
//! database; this CLI keeps it in flat JSON files, one key per file.

use anyhow::Context;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use anchorid_core::operation::Secp256k1Jwk;
use anchorid_crypto::jwk::{jwk_from_public_key, Secp256k1KeyPair};
use libsecp256k1::{PublicKey, SecretKey};

/// One secp256k1 keypair, persisted as hex. `kind` is purely a label
/// (`"update"`/`"recovery"`) so a directory of keyfiles stays legible.
#[derive(Serialize, Deserialize)]
struct StoredKey {
    kind: String,
    secret_key_hex: String,
}

pub fn generate_and_save(path: &Path, kind: &str) -> anyhow::Result<Secp256k1KeyPair> {
    let mut rng = OsRng;
    let pair = Secp256k1KeyPair::generate(&mut rng);
    let stored = StoredKey {
        kind: kind.to_string(),
        secret_key_hex: hex::encode(pair.secret_key.serialize()),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&stored)?)
        .with_context(|| format!("writing keyfile {}", path.display()))?;
    Ok(pair)
}

pub fn load(path: &Path) -> anyhow::Result<Secp256k1KeyPair> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading keyfile {}", path.display()))?;
    let stored: StoredKey =
        serde_json::from_str(&json).context("parsing keyfile — is it a valid anchorid keyfile?")?;
    let bytes = hex::decode(&stored.secret_key_hex).context("decoding secret key hex")?;
    let secret_key = SecretKey::parse_slice(&bytes).context("invalid secret key bytes")?;
    let public_key = PublicKey::from_secret_key(&secret_key);
    Ok(Secp256k1KeyPair {
        secret_key,
        public_key,
    })
}

pub fn jwk(pair: &Secp256k1KeyPair) -> Secp256k1Jwk {
    jwk_from_public_key(&pair.public_key)
}
