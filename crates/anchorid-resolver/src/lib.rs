//! Replays a DID's anchored operation history into a DID document
//! (spec.md §4.8). Resolution itself is stateless and re-derived on every
//! call; only the operation history it folds over is persisted.

mod fold;

pub mod error;

pub use error::ResolveError;

use anchorid_core::document::{DidDocumentMetadata, DidDocumentMethodMetadata, ResolutionResult};
use anchorid_core::identifier::{self, DidReference, METHOD_NAME};
use anchorid_core::operation::{Delta, SuffixData};
use anchorid_crypto::{base64url_decode, derive_suffix};
use anchorid_state::OperationStore;

use fold::{compose_document, compose_from_patches, fold};

const CONTEXT: &str = "https://w3id.org/did-resolution/v1";

/// The three outcomes spec.md §4.8 names for `resolve(didUniqueSuffix)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Document(ResolutionResult),
    Deactivated(ResolutionResult),
    NotFound,
}

pub struct Resolver {
    operations: OperationStore,
}

impl Resolver {
    pub fn new(operations: OperationStore) -> Self {
        Self { operations }
    }

    /// Resolve a short- or long-form DID string.
    ///
    /// Short form is always resolved against the observed operation
    /// history. Long form falls back to composing a document directly from
    /// its embedded `suffix_data`/`delta` only when no anchored create has
    /// been observed yet for that suffix (spec.md §4.8's "unpublished,
    /// resolvable via long-form" case) — once published, the stored history
    /// wins and the embedded initial state is ignored.
    pub fn resolve(&self, did: &str) -> Result<Resolution, ResolveError> {
        let reference = identifier::parse(did)?;
        let suffix = reference.suffix().as_str().to_string();
        let history = self.operations.operations_for(&suffix)?;

        if !history.is_empty() {
            return Ok(self.resolve_from_history(&suffix, &history));
        }

        match &reference {
            DidReference::Short { .. } => Ok(Resolution::NotFound),
            DidReference::Long {
                suffix,
                encoded_suffix_data,
                encoded_delta,
            } => self.resolve_from_long_form(suffix.as_str(), encoded_suffix_data, encoded_delta),
        }
    }

    fn resolve_from_history(
        &self,
        suffix: &str,
        history: &[anchorid_core::operation::AnchoredOperation],
    ) -> Resolution {
        let Some(state) = fold(suffix, history) else {
            return Resolution::NotFound;
        };
        let did = format!("did:{}:{}", METHOD_NAME, suffix);
        let document = compose_document(&did, &state);
        let metadata = DidDocumentMetadata {
            method: DidDocumentMethodMetadata {
                published: true,
                recovery_commitment: state.next_recovery_commitment.clone(),
                update_commitment: state.next_update_commitment.clone(),
                canonical_id: Some(did.clone()),
                equivalent_id: Vec::new(),
                deactivated: state.deactivated,
            },
        };
        let result = ResolutionResult {
            context: CONTEXT.to_string(),
            did_document: document,
            did_document_metadata: metadata,
        };
        if state.deactivated {
            Resolution::Deactivated(result)
        } else {
            Resolution::Document(result)
        }
    }

    fn resolve_from_long_form(
        &self,
        suffix: &str,
        encoded_suffix_data: &str,
        encoded_delta: &str,
    ) -> Result<Resolution, ResolveError> {
        let suffix_data: SuffixData = decode_json(encoded_suffix_data)?;
        let delta: Delta = decode_json(encoded_delta)?;

        let derived = derive_suffix(&suffix_data)?;
        if derived.as_str() != suffix {
            return Ok(Resolution::NotFound);
        }

        let did = format!("did:{}:{}", METHOD_NAME, suffix);
        let document = compose_from_patches(&did, &delta.patches);

        let metadata = DidDocumentMetadata {
            method: DidDocumentMethodMetadata {
                published: false,
                recovery_commitment: Some(suffix_data.recovery_commitment),
                update_commitment: Some(delta.update_commitment),
                canonical_id: None,
                equivalent_id: vec![format!("did:{}:{}", METHOD_NAME, suffix)],
                deactivated: false,
            },
        };
        Ok(Resolution::Document(ResolutionResult {
            context: CONTEXT.to_string(),
            did_document: document,
            did_document_metadata: metadata,
        }))
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(encoded: &str) -> Result<T, ResolveError> {
    let bytes = base64url_decode(encoded)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ResolveError::MalformedInitialState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::identifier::DidSuffix;
    use anchorid_core::operation::{AnchoredOperation, AnchoringPosition, Operation, Patch};
    use anchorid_crypto::{canonicalized_multihash, Secp256k1KeyPair};
    use rand::rngs::OsRng;

    fn store() -> OperationStore {
        let db = anchorid_state::StateDb::open_temporary().unwrap();
        db.operation_store().unwrap()
    }

    fn create_op(suffix: &str, update_commitment: &str, recovery_commitment: &str) -> AnchoredOperation {
        let delta = Delta {
            patches: vec![Patch::AddPublicKeys {
                public_keys: vec![serde_json::json!({
                    "id": "key-1",
                    "type": "EcdsaSecp256k1VerificationKey2019",
                    "purposes": ["authentication"],
                    "publicKeyJwk": {"kty": "EC", "crv": "secp256k1", "x": "x", "y": "y"},
                })],
            }],
            update_commitment: update_commitment.to_string(),
        };
        let delta_hash = canonicalized_multihash(&serde_json::to_value(&delta).unwrap());
        let suffix_data = SuffixData {
            delta_hash,
            recovery_commitment: recovery_commitment.to_string(),
            type_: None,
        };
        AnchoredOperation {
            did_suffix: DidSuffix(suffix.to_string()),
            operation: Operation::Create { suffix_data, delta },
            position: AnchoringPosition {
                transaction_time: 1,
                transaction_number: 1,
                operation_index: 0,
            },
        }
    }

    #[test]
    fn not_found_for_unseen_short_form() {
        let resolver = Resolver::new(store());
        let res = resolver.resolve("did:anchor:nope").unwrap();
        assert_eq!(res, Resolution::NotFound);
    }

    #[test]
    fn resolves_published_create() {
        let ops = store();
        let mut key_pair_rng = OsRng;
        let pair = Secp256k1KeyPair::generate(&mut key_pair_rng);
        let jwk = pair.jwk();
        let recovery_commitment = canonicalized_multihash(&serde_json::to_value(&jwk).unwrap());
        let update_commitment = recovery_commitment.clone();
        let op = create_op("suffixabc", &update_commitment, &recovery_commitment);
        let suffix = derive_suffix(match &op.operation {
            Operation::Create { suffix_data, .. } => suffix_data,
            _ => unreachable!(),
        })
        .unwrap();
        let mut op = op;
        op.did_suffix = suffix.clone();
        ops.insert(&op).unwrap();

        let resolver = Resolver::new(ops);
        let did = format!("did:anchor:{}", suffix.as_str());
        match resolver.resolve(&did).unwrap() {
            Resolution::Document(result) => {
                assert!(!result.did_document_metadata.method.deactivated);
                assert!(result.did_document_metadata.method.published);
                assert_eq!(result.did_document.verification_method.len(), 1);
            }
            other => panic!("expected a resolved document, got {other:?}"),
        }
    }
}
