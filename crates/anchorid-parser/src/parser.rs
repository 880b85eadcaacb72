//! Per-version operation parsing and validation (spec.md §4.4). Byte size
//! is checked before JSON parsing; schema, multihash, JWS-header, and key
//! shape are checked afterward. Signature verification is deliberately
//! **not** done here for the general parse path — it's deferred to
//! resolution time for anchored operations, and performed explicitly via
//! [`verify_submission_signature`] before a locally submitted operation is
//! admitted (spec.md §4.4's closing paragraph).

use anchorid_core::operation::{
    CompactJws, DeactivateSignedPayload, Delta, JwsHeader, Operation, RecoverSignedPayload,
    Secp256k1Jwk, SuffixData, UpdateSignedPayload,
};
use anchorid_crypto::{base64url_decode, public_key_from_jwk};
use anchorid_protocol::VersionParameters;

use crate::error::ParseError;
use crate::patch::validate_patches;

const ES256K: &str = "ES256K";

fn check_multihash_format(
    field: &'static str,
    encoded: &str,
    params: &VersionParameters,
) -> Result<(), ParseError> {
    let bytes = base64url_decode(encoded)
        .map_err(|e| ParseError::InvalidMultihash { field, source: e })?;
    let (code, _digest) = anchorid_crypto::multihash::decode_raw(&bytes)
        .map_err(|e| ParseError::InvalidMultihash { field, source: e })?;
    if !params.hash_algorithms_in_multihash_code.contains(&code) {
        return Err(ParseError::UnsupportedHashAlgorithm { field, code });
    }
    Ok(())
}

fn check_delta(delta: &Delta, params: &VersionParameters) -> Result<(), ParseError> {
    let size = serde_json::to_vec(delta)
        .map_err(|e| ParseError::MalformedJson(e.to_string()))?
        .len();
    if size > params.max_delta_size {
        return Err(ParseError::DeltaTooLarge {
            actual: size,
            max: params.max_delta_size,
        });
    }
    check_multihash_format("delta.update_commitment", &delta.update_commitment, params)?;
    validate_patches(&delta.patches)
}

fn check_suffix_data(suffix_data: &SuffixData, params: &VersionParameters) -> Result<(), ParseError> {
    check_multihash_format("suffix_data.delta_hash", &suffix_data.delta_hash, params)?;
    check_multihash_format(
        "suffix_data.recovery_commitment",
        &suffix_data.recovery_commitment,
        params,
    )
}

fn decode_jws_header(jws: &CompactJws) -> Result<JwsHeader, ParseError> {
    let bytes =
        base64url_decode(&jws.protected).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let header: JwsHeader =
        serde_json::from_slice(&bytes).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    if header.alg != ES256K {
        return Err(ParseError::UnsupportedJwsAlg(header.alg));
    }
    Ok(header)
}

fn decode_jws_payload<T: serde::de::DeserializeOwned>(jws: &CompactJws) -> Result<T, ParseError> {
    let bytes =
        base64url_decode(&jws.payload).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ParseError::InvalidSignedPayload(e.to_string()))
}

fn check_jwk(jwk: &Secp256k1Jwk) -> Result<(), ParseError> {
    public_key_from_jwk(jwk)?;
    Ok(())
}

/// Parse and validate a single operation's bytes under the rules active at
/// `params`. Does not verify any signature.
pub fn parse_operation(bytes: &[u8], params: &VersionParameters) -> Result<Operation, ParseError> {
    if bytes.len() > params.max_operation_size {
        return Err(ParseError::OperationTooLarge {
            actual: bytes.len(),
            max: params.max_operation_size,
        });
    }
    let operation: Operation =
        serde_json::from_slice(bytes).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

    match &operation {
        Operation::Create { suffix_data, delta } => {
            check_suffix_data(suffix_data, params)?;
            check_delta(delta, params)?;
        }
        Operation::Update {
            did_suffix,
            reveal_value,
            signed_data,
            delta,
        } => {
            check_multihash_format("did_suffix", did_suffix.as_str(), params)?;
            check_multihash_format("reveal_value", reveal_value, params)?;
            decode_jws_header(signed_data)?;
            let payload: UpdateSignedPayload = decode_jws_payload(signed_data)?;
            check_multihash_format("signed_data.delta_hash", &payload.delta_hash, params)?;
            check_jwk(&payload.update_key)?;
            check_delta(delta, params)?;
        }
        Operation::Recover {
            did_suffix,
            reveal_value,
            signed_data,
            delta,
        } => {
            check_multihash_format("did_suffix", did_suffix.as_str(), params)?;
            check_multihash_format("reveal_value", reveal_value, params)?;
            decode_jws_header(signed_data)?;
            let payload: RecoverSignedPayload = decode_jws_payload(signed_data)?;
            check_multihash_format("signed_data.delta_hash", &payload.delta_hash, params)?;
            check_multihash_format(
                "signed_data.recovery_commitment",
                &payload.recovery_commitment,
                params,
            )?;
            check_jwk(&payload.recovery_key)?;
            check_delta(delta, params)?;
        }
        Operation::Deactivate {
            did_suffix,
            reveal_value,
            signed_data,
        } => {
            check_multihash_format("did_suffix", did_suffix.as_str(), params)?;
            check_multihash_format("reveal_value", reveal_value, params)?;
            decode_jws_header(signed_data)?;
            let payload: DeactivateSignedPayload = decode_jws_payload(signed_data)?;
            check_jwk(&payload.recovery_key)?;
        }
    }
    Ok(operation)
}

/// Verify the ES256K signature over `signed_data`, required before a
/// locally submitted Update/Recover/Deactivate is admitted to the
/// `BatchWriter`'s queue (spec.md §4.4). A no-op for Create, which carries
/// no signature.
pub fn verify_submission_signature(operation: &Operation) -> Result<(), ParseError> {
    match operation {
        Operation::Create { .. } => Ok(()),
        Operation::Update { signed_data, .. } => {
            let payload: UpdateSignedPayload = decode_jws_payload(signed_data)?;
            anchorid_crypto::verify(signed_data, &payload.update_key)
                .map_err(|_| ParseError::SignatureInvalid)
        }
        Operation::Recover { signed_data, .. } => {
            let payload: RecoverSignedPayload = decode_jws_payload(signed_data)?;
            anchorid_crypto::verify(signed_data, &payload.recovery_key)
                .map_err(|_| ParseError::SignatureInvalid)
        }
        Operation::Deactivate { signed_data, .. } => {
            let payload: DeactivateSignedPayload = decode_jws_payload(signed_data)?;
            anchorid_crypto::verify(signed_data, &payload.recovery_key)
                .map_err(|_| ParseError::SignatureInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::operation::Patch;
    use anchorid_crypto::jws::sign_compact;
    use anchorid_crypto::jwk::Secp256k1KeyPair;
    use anchorid_crypto::multihash::hash_to_multihash;
    use rand::rngs::OsRng;
    use serde_json::json;

    fn params() -> VersionParameters {
        anchorid_protocol::ProtocolVersionManager::default_table()
            .version_at(0)
            .unwrap()
            .parameters
            .clone()
    }

    #[test]
    fn parses_a_well_formed_create() {
        let delta = Delta {
            patches: vec![Patch::Replace {
                document: json!({}),
            }],
            update_commitment: hash_to_multihash(b"update-key"),
        };
        let delta_hash = hash_to_multihash(&serde_json::to_vec(&delta).unwrap());
        let suffix_data = SuffixData {
            delta_hash,
            recovery_commitment: hash_to_multihash(b"recovery-key"),
            type_: None,
        };
        let op = Operation::Create { suffix_data, delta };
        let bytes = serde_json::to_vec(&op).unwrap();
        assert!(parse_operation(&bytes, &params()).is_ok());
    }

    #[test]
    fn rejects_operation_over_size_ceiling() {
        let bytes = vec![0u8; 1_000_000];
        assert!(matches!(
            parse_operation(&bytes, &params()),
            Err(ParseError::OperationTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let json = r#"{"type":"create","suffix_data":{"delta_hash":"x","recovery_commitment":"y"},"delta":{"patches":[],"update_commitment":"z"},"extra":true}"#;
        assert!(parse_operation(json.as_bytes(), &params()).is_err());
    }

    #[test]
    fn verifies_update_signature_end_to_end() {
        let mut rng = OsRng;
        let pair = Secp256k1KeyPair::generate(&mut rng);
        let delta = Delta {
            patches: vec![],
            update_commitment: hash_to_multihash(b"next"),
        };
        let delta_hash = hash_to_multihash(&serde_json::to_vec(&delta).unwrap());
        let payload = UpdateSignedPayload {
            delta_hash,
            update_key: pair.jwk(),
        };
        let signed_data = sign_compact(&payload, &pair.secret_key, None).unwrap();
        let op = Operation::Update {
            did_suffix: anchorid_core::identifier::DidSuffix("suffix".to_string()),
            reveal_value: hash_to_multihash(b"reveal"),
            signed_data,
            delta,
        };
        assert!(verify_submission_signature(&op).is_ok());
    }
}
