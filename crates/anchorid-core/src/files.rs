//! The layered CAS file hierarchy a single anchored batch is made of: core
//! index, core proof, provisional index, provisional proof, and chunk file.
//! `anchorid-batchwriter` builds these; `anchorid-observer` downloads and
//! parses them back. Living here means both sides share one wire shape.

use serde::{Deserialize, Serialize};

use crate::operation::{CompactJws, Delta, SuffixData};

/// `{didSuffix, revealValue}`, the shape every recover/deactivate/update
/// reference takes in an index file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedOperationReference {
    pub did_suffix: String,
    pub reveal_value: String,
}

/// A create reference in the core index file: just enough of `suffix_data`
/// to derive the DID suffix without downloading the chunk file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateReference {
    pub suffix_data: SuffixData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreOperationReferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<CreateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recover: Vec<RevealedOperationReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deactivate: Vec<RevealedOperationReference>,
}

impl CoreOperationReferences {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.recover.is_empty() && self.deactivate.is_empty()
    }
}

/// The core index file: gzip+JSON, always present in a batch. References
/// creates/recovers/deactivates by summary only; the chunk file carries the
/// actual deltas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreIndexFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_lock_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_index_file_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_proof_file_uri: Option<String>,
    pub operations: CoreOperationReferences,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalOperationReferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<RevealedOperationReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkFileReference {
    pub chunk_file_uri: String,
}

/// The provisional index file: optional — absent whenever a batch carries
/// only deactivates. Exactly one chunk entry in this protocol version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalIndexFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_proof_file_uri: Option<String>,
    pub chunks: Vec<ChunkFileReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<ProvisionalOperationReferences>,
}

/// Core or provisional proof file: JWS proofs in the same order as the
/// operation references that point at them (recovers+deactivates share the
/// core proof file in core-index order; updates get the provisional proof
/// file in provisional-index order).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofFile {
    pub proofs: Vec<CompactJws>,
}

/// The chunk file: every delta of the batch, concatenated
/// creates ∥ recovers ∥ updates, each individually Base64URL-encoded so the
/// chunk file's own JSON never needs to escape a delta's internal structure
/// twice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkFile {
    pub deltas: Vec<String>,
}

/// Encode a [`Delta`] as the Base64URL string the chunk file carries.
pub fn encode_delta(delta: &Delta) -> Result<String, crate::error::CoreError> {
    let json = serde_json::to_vec(delta).map_err(|e| crate::error::CoreError::InvalidJson(e.to_string()))?;
    Ok(anchorid_b64(&json))
}

/// Decode a chunk-file delta entry back into a [`Delta`].
pub fn decode_delta(encoded: &str) -> Result<Delta, crate::error::CoreError> {
    let bytes = anchorid_b64_decode(encoded)?;
    serde_json::from_slice(&bytes).map_err(|e| crate::error::CoreError::InvalidJson(e.to_string()))
}

// `anchorid-core` intentionally has no dependency on `anchorid-crypto` (crypto
// depends on core, not the reverse), so Base64URL is reimplemented minimally
// here rather than shared — it is a three-line alphabet table, not worth a
// cyclic dependency.
fn anchorid_b64(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(bytes)
}

fn anchorid_b64_decode(s: &str) -> Result<Vec<u8>, crate::error::CoreError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| crate::error::CoreError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Patch;

    #[test]
    fn delta_round_trips_through_chunk_encoding() {
        let delta = Delta {
            patches: vec![Patch::RemovePublicKeys {
                ids: vec!["key-1".to_string()],
            }],
            update_commitment: "commitment".to_string(),
        };
        let encoded = encode_delta(&delta).unwrap();
        assert_eq!(decode_delta(&encoded).unwrap(), delta);
    }
}
