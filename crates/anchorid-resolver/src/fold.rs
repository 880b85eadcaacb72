//! The chronological replay fold: one `AnchoredOperation` list in, one
//! `FoldState` out (spec.md §4.8). Invalid operations are skipped — logged,
//! never aborting the fold (spec.md §4.8 point 4, §7 ProtocolViolation).

use anchorid_core::document::{DidDocument, ServiceEndpoint, VerificationMethod};
use anchorid_core::operation::{
    AnchoredOperation, DeactivateSignedPayload, Delta, Operation, RecoverSignedPayload,
    Secp256k1Jwk, SuffixData, UpdateSignedPayload,
};
use anchorid_crypto::{base64url_decode, canonicalized_multihash, derive_suffix};
use serde_json::Value;
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct InternalPublicKey {
    pub id: String,
    pub type_: String,
    pub jwk: Value,
    pub purposes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct InternalService {
    pub id: String,
    pub type_: String,
    pub endpoint: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct InternalDocument {
    pub public_keys: Vec<InternalPublicKey>,
    pub services: Vec<InternalService>,
}

/// The DID's folded state, as defined by spec.md §3 "DID state" (recomputed
/// on every resolve, never persisted).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldState {
    pub(crate) document: InternalDocument,
    pub next_recovery_commitment: Option<String>,
    pub next_update_commitment: Option<String>,
    pub last_operation_transaction_number: u64,
    pub deactivated: bool,
}

fn apply_patches(document: &mut InternalDocument, patches: &[anchorid_core::operation::Patch]) {
    use anchorid_core::operation::Patch;
    for patch in patches {
        match patch {
            Patch::Replace { document: replacement } => {
                *document = document_from_value(replacement);
            }
            Patch::AddPublicKeys { public_keys } => {
                for entry in public_keys {
                    let Some(key) = public_key_from_value(entry) else {
                        continue;
                    };
                    document.public_keys.retain(|k| k.id != key.id);
                    document.public_keys.push(key);
                }
            }
            Patch::RemovePublicKeys { ids } => {
                document.public_keys.retain(|k| !ids.contains(&k.id));
            }
            Patch::AddServices { services } => {
                for entry in services {
                    let Some(service) = service_from_value(entry) else {
                        continue;
                    };
                    document.services.retain(|s| s.id != service.id);
                    document.services.push(service);
                }
            }
            Patch::RemoveServices { ids } => {
                document.services.retain(|s| !ids.contains(&s.id));
            }
        }
    }
}

fn document_from_value(value: &Value) -> InternalDocument {
    let public_keys = value
        .get("publicKeys")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(public_key_from_value).collect())
        .unwrap_or_default();
    let services = value
        .get("services")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(service_from_value).collect())
        .unwrap_or_default();
    InternalDocument {
        public_keys,
        services,
    }
}

fn public_key_from_value(value: &Value) -> Option<InternalPublicKey> {
    let id = value.get("id")?.as_str()?.to_string();
    let type_ = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("EcdsaSecp256k1VerificationKey2019")
        .to_string();
    let jwk = value.get("publicKeyJwk")?.clone();
    let purposes = value
        .get("purposes")
        .and_then(Value::as_array)
        .map(|ps| {
            ps.iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(InternalPublicKey {
        id,
        type_,
        jwk,
        purposes,
    })
}

fn service_from_value(value: &Value) -> Option<InternalService> {
    let id = value.get("id")?.as_str()?.to_string();
    let type_ = value.get("type")?.as_str()?.to_string();
    let endpoint = value.get("serviceEndpoint")?.clone();
    Some(InternalService {
        id,
        type_,
        endpoint,
    })
}

/// Fold one DID's anchored operation list into its current state, skipping
/// (and logging) anything that fails a commitment, reveal, signature, or
/// ordering check rather than aborting.
pub(crate) fn fold(did_suffix: &str, operations: &[AnchoredOperation]) -> Option<FoldState> {
    let mut state: Option<FoldState> = None;

    for anchored in operations {
        if let Some(current) = &state {
            if current.deactivated {
                // spec.md §4.8: "Further operations on this DID are ignored."
                break;
            }
        }

        let tx_number = anchored.position.transaction_number;
        match &anchored.operation {
            Operation::Create { suffix_data, delta } => {
                if state.is_some() {
                    debug!(did_suffix, "skipping duplicate create");
                    continue;
                }
                if !create_matches_suffix(suffix_data, did_suffix) {
                    debug!(did_suffix, "skipping create: suffix_data does not hash to did_suffix");
                    continue;
                }
                if !delta_hash_matches(delta, &suffix_data.delta_hash) {
                    debug!(did_suffix, "skipping create: delta does not match suffix_data.delta_hash");
                    continue;
                }
                let mut document = InternalDocument::default();
                apply_patches(&mut document, &delta.patches);
                state = Some(FoldState {
                    document,
                    next_recovery_commitment: Some(suffix_data.recovery_commitment.clone()),
                    next_update_commitment: Some(delta.update_commitment.clone()),
                    last_operation_transaction_number: tx_number,
                    deactivated: false,
                });
            }
            Operation::Update {
                reveal_value,
                signed_data,
                delta,
                ..
            } => {
                let Some(current) = state.as_mut() else {
                    debug!(did_suffix, "skipping update: no prior create");
                    continue;
                };
                let Some(payload) = decode_payload::<UpdateSignedPayload>(signed_data) else {
                    debug!(did_suffix, "skipping update: malformed signed_data payload");
                    continue;
                };
                if !key_binds_commitment(&payload.update_key, reveal_value, current.next_update_commitment.as_deref())
                {
                    debug!(did_suffix, "skipping update: commitment/reveal mismatch");
                    continue;
                }
                if anchorid_crypto::verify(signed_data, &payload.update_key).is_err() {
                    debug!(did_suffix, "skipping update: signature verification failed");
                    continue;
                }
                if !delta_hash_matches(delta, &payload.delta_hash) {
                    debug!(did_suffix, "skipping update: delta does not match signed_data.delta_hash");
                    continue;
                }
                apply_patches(&mut current.document, &delta.patches);
                current.next_update_commitment = Some(delta.update_commitment.clone());
                current.last_operation_transaction_number = tx_number;
            }
            Operation::Recover {
                reveal_value,
                signed_data,
                delta,
                ..
            } => {
                let Some(current) = state.as_mut() else {
                    debug!(did_suffix, "skipping recover: no prior create");
                    continue;
                };
                let Some(payload) = decode_payload::<RecoverSignedPayload>(signed_data) else {
                    debug!(did_suffix, "skipping recover: malformed signed_data payload");
                    continue;
                };
                if !key_binds_commitment(&payload.recovery_key, reveal_value, current.next_recovery_commitment.as_deref())
                {
                    debug!(did_suffix, "skipping recover: commitment/reveal mismatch");
                    continue;
                }
                if anchorid_crypto::verify(signed_data, &payload.recovery_key).is_err() {
                    debug!(did_suffix, "skipping recover: signature verification failed");
                    continue;
                }
                if !delta_hash_matches(delta, &payload.delta_hash) {
                    debug!(did_suffix, "skipping recover: delta does not match signed_data.delta_hash");
                    continue;
                }
                apply_patches(&mut current.document, &delta.patches);
                current.next_recovery_commitment = Some(payload.recovery_commitment.clone());
                current.next_update_commitment = Some(delta.update_commitment.clone());
                current.last_operation_transaction_number = tx_number;
            }
            Operation::Deactivate {
                did_suffix: op_suffix,
                reveal_value,
                signed_data,
            } => {
                let Some(current) = state.as_mut() else {
                    debug!(did_suffix, "skipping deactivate: no prior create");
                    continue;
                };
                if op_suffix.as_str() != did_suffix {
                    debug!(did_suffix, "skipping deactivate: did_suffix field mismatch");
                    continue;
                }
                let Some(payload) = decode_payload::<DeactivateSignedPayload>(signed_data) else {
                    debug!(did_suffix, "skipping deactivate: malformed signed_data payload");
                    continue;
                };
                if payload.did_suffix != did_suffix {
                    debug!(did_suffix, "skipping deactivate: signed payload did_suffix mismatch");
                    continue;
                }
                if !key_binds_commitment(&payload.recovery_key, reveal_value, current.next_recovery_commitment.as_deref())
                {
                    debug!(did_suffix, "skipping deactivate: commitment/reveal mismatch");
                    continue;
                }
                if anchorid_crypto::verify(signed_data, &payload.recovery_key).is_err() {
                    debug!(did_suffix, "skipping deactivate: signature verification failed");
                    continue;
                }
                current.next_recovery_commitment = None;
                current.next_update_commitment = None;
                current.deactivated = true;
                current.last_operation_transaction_number = tx_number;
            }
        }
    }

    state
}

fn create_matches_suffix(suffix_data: &SuffixData, expected_suffix: &str) -> bool {
    derive_suffix(suffix_data)
        .map(|s| s.as_str() == expected_suffix)
        .unwrap_or(false)
}

fn delta_hash_matches(delta: &Delta, expected_hash: &str) -> bool {
    match serde_json::to_value(delta) {
        Ok(value) => canonicalized_multihash(&value) == expected_hash,
        Err(_) => false,
    }
}

/// Binds a revealed signing key to the commitment currently in force:
/// `multihash(canonicalize(key)) == commitment` (spec.md §4.8, §8), plus the
/// consistency check that the operation's own `reveal_value` field agrees
/// with that same hash (spec.md §3's commitment/reveal invariant — see
/// DESIGN.md for the exact reconciliation of §3 and §4.8's wording).
fn key_binds_commitment(key: &Secp256k1Jwk, reveal_value: &str, commitment: Option<&str>) -> bool {
    let Some(commitment) = commitment else {
        return false;
    };
    let key_hash = match serde_json::to_value(key) {
        Ok(value) => canonicalized_multihash(&value),
        Err(_) => return false,
    };
    key_hash == commitment && key_hash == reveal_value
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    jws: &anchorid_core::operation::CompactJws,
) -> Option<T> {
    let bytes = base64url_decode(&jws.payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Compose a document directly from a delta's patch list, starting from an
/// empty document — used for long-form (unpublished) resolution, where
/// there is no anchored history to fold over yet (spec.md §4.8).
pub(crate) fn compose_from_patches(did: &str, patches: &[anchorid_core::operation::Patch]) -> DidDocument {
    let mut document = InternalDocument::default();
    apply_patches(&mut document, patches);
    let state = FoldState {
        document,
        ..FoldState::default()
    };
    compose_document(did, &state)
}

/// Compose the external, W3C-shaped document from a folded internal state.
pub(crate) fn compose_document(did: &str, state: &FoldState) -> DidDocument {
    let mut document = DidDocument::empty(did.to_string());
    for key in &state.document.public_keys {
        let Ok(jwk) = serde_json::from_value::<Secp256k1Jwk>(key.jwk.clone()) else {
            continue;
        };
        let method_id = format!("{did}#{}", key.id);
        document.verification_method.push(VerificationMethod {
            id: method_id.clone(),
            type_: key.type_.clone(),
            controller: did.to_string(),
            public_key_jwk: jwk,
        });
        for purpose in &key.purposes {
            match purpose.as_str() {
                "authentication" => document.authentication.push(method_id.clone()),
                "assertionMethod" => document.assertion_method.push(method_id.clone()),
                "keyAgreement" => document.key_agreement.push(method_id.clone()),
                "capabilityInvocation" => document.capability_invocation.push(method_id.clone()),
                "capabilityDelegation" => document.capability_delegation.push(method_id.clone()),
                _ => {}
            }
        }
    }
    for service in &state.document.services {
        document.service.push(ServiceEndpoint {
            id: format!("{did}#{}", service.id),
            type_: service.type_.clone(),
            service_endpoint: service.endpoint.clone(),
        });
    }
    document
}
