//! Compact JWS construction/verification for the `signed_data` carried by
//! Update, Recover, and Deactivate operations. Hand-rolled rather than
//! built on a general JWS crate: the wire format this protocol uses is a
//! fixed three-segment ES256K compact JWS with no header parameter beyond
//! `alg` and an optional `kid`, so a small precise implementation is a
//! better fit than a general-purpose one.

use anchorid_core::operation::{CompactJws, JwsHeader, Secp256k1Jwk};
use libsecp256k1::{Message, PublicKey, SecretKey, Signature};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::encoding::{base64url_decode, base64url_encode};
use crate::error::CryptoError;
use crate::jwk::public_key_from_jwk;

const ALG: &str = "ES256K";

fn signing_input(protected: &str, payload: &str) -> Vec<u8> {
    format!("{protected}.{payload}").into_bytes()
}

fn message_from_signing_input(input: &[u8]) -> Message {
    let digest = Sha256::digest(input);
    Message::parse_slice(&digest).expect("sha256 digest is always 32 bytes")
}

/// Sign `payload` (any serializable value) into a compact JWS using
/// `secret_key`.
pub fn sign_compact(
    payload: &impl Serialize,
    secret_key: &SecretKey,
    kid: Option<&str>,
) -> Result<CompactJws, CryptoError> {
    let header = JwsHeader {
        alg: ALG.to_string(),
        kid: kid.map(str::to_string),
    };
    let protected = base64url_encode(
        serde_json::to_vec(&header)
            .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?
            .as_slice(),
    );
    let payload_b64 = base64url_encode(
        serde_json::to_vec(payload)
            .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?
            .as_slice(),
    );
    let message = message_from_signing_input(&signing_input(&protected, &payload_b64));
    let (signature, _recovery_id) = libsecp256k1::sign(&message, secret_key);
    Ok(CompactJws {
        protected,
        payload: payload_b64,
        signature: base64url_encode(&signature.serialize()),
    })
}

/// Verify `jws` was signed by the holder of `jwk` and, if so, decode its
/// payload as `T`.
pub fn verify_and_decode<T: DeserializeOwned>(
    jws: &CompactJws,
    jwk: &Secp256k1Jwk,
) -> Result<T, CryptoError> {
    let header_bytes = base64url_decode(&jws.protected)?;
    let header: JwsHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?;
    if header.alg != ALG {
        return Err(CryptoError::InvalidSignature(format!(
            "unsupported alg: {}",
            header.alg
        )));
    }

    let public_key = public_key_from_jwk(jwk)?;
    let signature_bytes = base64url_decode(&jws.signature)?;
    let signature_array: [u8; 64] = signature_bytes.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidSignature(format!(
            "expected a 64-byte r||s signature, got {} bytes",
            signature_bytes.len()
        ))
    })?;
    let signature = Signature::parse_standard(&signature_array)
        .map_err(|e| CryptoError::InvalidSignature(format!("{e:?}")))?;

    let message = message_from_signing_input(&signing_input(&jws.protected, &jws.payload));
    if !libsecp256k1::verify(&message, &signature, &public_key) {
        return Err(CryptoError::InvalidSignature(
            "ES256K verification failed".to_string(),
        ));
    }

    let payload_bytes = base64url_decode(&jws.payload)?;
    serde_json::from_slice(&payload_bytes).map_err(|e| CryptoError::InvalidJwk(e.to_string()))
}

/// `verify_and_decode` without caring about the decoded payload shape —
/// used where the caller only needs to know the signature checked out
/// (e.g. a Deactivate whose payload schema is validated separately).
pub fn verify(jws: &CompactJws, jwk: &Secp256k1Jwk) -> Result<(), CryptoError> {
    verify_and_decode::<serde_json::Value>(jws, jwk).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::Secp256k1KeyPair;
    use rand::rngs::OsRng;
    use serde_json::json;

    #[test]
    fn signs_and_verifies_round_trip() {
        let mut rng = OsRng;
        let pair = Secp256k1KeyPair::generate(&mut rng);
        let payload = json!({"deltaHash": "abc"});
        let jws = sign_compact(&payload, &pair.secret_key, None).unwrap();
        let decoded: serde_json::Value = verify_and_decode(&jws, &pair.jwk()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_signature_from_a_different_key() {
        let mut rng = OsRng;
        let signer = Secp256k1KeyPair::generate(&mut rng);
        let other = Secp256k1KeyPair::generate(&mut rng);
        let jws = sign_compact(&json!({"x": 1}), &signer.secret_key, None).unwrap();
        assert!(verify(&jws, &other.jwk()).is_err());
    }
}
