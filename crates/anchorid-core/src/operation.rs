//! The operation model: the four request types a DID's history is built
//! from, their delta/patch payloads, and the anchored form stored once a
//! batch referencing them has been observed.

use serde::{Deserialize, Serialize};

use crate::identifier::DidSuffix;

/// A secp256k1 public key in JWK form, as carried in `signed_data` payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Secp256k1Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// A compact JWS: `base64url(protected).base64url(payload).base64url(signature)`,
/// kept structured rather than as one string so callers never have to
/// re-split it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompactJws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

/// Decoded compact-JWS protected header. `kid` is optional per spec.md §4.4.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// The closed set of document patches a delta may carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Patch {
    Replace {
        document: serde_json::Value,
    },
    #[serde(rename = "add-public-keys")]
    AddPublicKeys { public_keys: Vec<serde_json::Value> },
    #[serde(rename = "remove-public-keys")]
    RemovePublicKeys { ids: Vec<String> },
    #[serde(rename = "add-services")]
    AddServices { services: Vec<serde_json::Value> },
    #[serde(rename = "remove-services")]
    RemoveServices { ids: Vec<String> },
}

/// `delta.update_commitment` and its patch list. Every non-Deactivate
/// operation carries one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Delta {
    pub patches: Vec<Patch>,
    pub update_commitment: String,
}

/// `suffix_data` of a Create operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuffixData {
    pub delta_hash: String,
    pub recovery_commitment: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Payload schema carried inside `signed_data` for an Update operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSignedPayload {
    pub delta_hash: String,
    pub update_key: Secp256k1Jwk,
}

/// Payload schema carried inside `signed_data` for a Recover operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoverSignedPayload {
    pub delta_hash: String,
    pub recovery_key: Secp256k1Jwk,
    pub recovery_commitment: String,
}

/// Payload schema carried inside `signed_data` for a Deactivate operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeactivateSignedPayload {
    pub did_suffix: String,
    pub recovery_key: Secp256k1Jwk,
}

/// One of the four operation variants a client can submit or a batch can
/// anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum Operation {
    Create {
        suffix_data: SuffixData,
        delta: Delta,
    },
    Update {
        did_suffix: DidSuffix,
        reveal_value: String,
        signed_data: CompactJws,
        delta: Delta,
    },
    Recover {
        did_suffix: DidSuffix,
        reveal_value: String,
        signed_data: CompactJws,
        delta: Delta,
    },
    Deactivate {
        did_suffix: DidSuffix,
        reveal_value: String,
        signed_data: CompactJws,
    },
}

impl Operation {
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Recover { .. } => "recover",
            Operation::Deactivate { .. } => "deactivate",
        }
    }

    /// `did_suffix` is only known on the operation itself for non-Create
    /// variants; Create derives it from `suffix_data` (see
    /// `anchorid_crypto::derive_suffix`).
    pub fn explicit_did_suffix(&self) -> Option<&DidSuffix> {
        match self {
            Operation::Create { .. } => None,
            Operation::Update { did_suffix, .. }
            | Operation::Recover { did_suffix, .. }
            | Operation::Deactivate { did_suffix, .. } => Some(did_suffix),
        }
    }
}

/// Where, in canonical replay order, an anchored operation sits.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchoringPosition {
    pub transaction_time: u64,
    pub transaction_number: u64,
    pub operation_index: u32,
}

/// An operation plus the anchoring metadata that lets the resolver place
/// it in the DID's canonical operation order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchoredOperation {
    pub did_suffix: DidSuffix,
    pub operation: Operation,
    pub position: AnchoringPosition,
}

impl AnchoredOperation {
    /// Ordering key used everywhere the spec calls for
    /// `(transactionTime, transactionNumber, operationIndex)` ascending order.
    pub fn ordering_key(&self) -> &AnchoringPosition {
        &self.position
    }
}
