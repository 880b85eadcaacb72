//! The multihash wire format used for every commitment, reveal value, and
//! delta/suffix-data hash: `varint(hashFnCode) || varint(digestLength) ||
//! digest`, Base64URL-encoded (no padding).
//!
//! Only SHA2-256 (code `0x12`) is enabled by the protocol versions this
//! crate ships, but the wire format itself is general so a future version
//! can widen `hashAlgorithmsInMultihashCode` without a format change.

use anchorid_core::error::CoreError;
use sha2::{Digest, Sha256};

use crate::encoding::{base64url_decode, base64url_encode};

pub const SHA2_256_CODE: u64 = 0x12;

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

fn read_varint(bytes: &[u8]) -> Result<(u64, &[u8]), CoreError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, &bytes[i + 1..]));
        }
        shift += 7;
    }
    Err(CoreError::TruncatedMultihash)
}

/// Encode `digest` under `code` into the raw multihash byte layout.
pub fn encode_raw(code: u64, digest: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(digest.len() + 4);
    write_varint(code, &mut out);
    write_varint(digest.len() as u64, &mut out);
    out.extend_from_slice(digest);
    out
}

/// Decode a raw multihash into `(code, digest)`.
pub fn decode_raw(bytes: &[u8]) -> Result<(u64, &[u8]), CoreError> {
    let (code, rest) = read_varint(bytes)?;
    let (len, rest) = read_varint(rest)?;
    let len = len as usize;
    if rest.len() != len {
        return Err(CoreError::TruncatedMultihash);
    }
    Ok((code, rest))
}

/// SHA2-256-hash `content`, wrap it as a multihash, and Base64URL-encode it —
/// the form every commitment and reveal value takes on the wire.
pub fn hash_to_multihash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    base64url_encode(&encode_raw(SHA2_256_CODE, &digest))
}

/// Decode a Base64URL multihash string and check it against the hash of
/// `content`, the operation `anchorid` performs whenever a reveal value or
/// delta hash must be checked against a preimage.
pub fn verify_multihash(encoded: &str, content: &[u8]) -> Result<bool, CoreError> {
    let bytes = base64url_decode(encoded)?;
    let (code, digest) = decode_raw(&bytes)?;
    if code != SHA2_256_CODE {
        return Err(CoreError::UnsupportedHashAlgorithm(code));
    }
    let actual = Sha256::digest(content);
    Ok(actual.as_slice() == digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_decode() {
        let encoded = hash_to_multihash(b"hello");
        assert!(verify_multihash(&encoded, b"hello").unwrap());
        assert!(!verify_multihash(&encoded, b"goodbye").unwrap());
    }

    #[test]
    fn rejects_unsupported_code() {
        let bytes = encode_raw(0x99, &[0u8; 32]);
        let encoded = base64url_encode(&bytes);
        assert!(matches!(
            verify_multihash(&encoded, b"x"),
            Err(CoreError::UnsupportedHashAlgorithm(0x99))
        ));
    }

    #[test]
    fn rejects_truncated_multihash() {
        let bytes = vec![0x12, 0x20, 0x01, 0x02];
        let encoded = base64url_encode(&bytes);
        assert!(matches!(
            verify_multihash(&encoded, b"x"),
            Err(CoreError::TruncatedMultihash)
        ));
    }
}
