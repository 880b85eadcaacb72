//! gzip compression for batch files. Every core/provisional index file,
//! proof file, and chunk file is stored gzip-compressed in the CAS.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::CryptoError;

pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .expect("writing to an in-memory encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail")
}

pub fn decompress(data: &[u8], max_bytes: usize) -> Result<Vec<u8>, CryptoError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    let mut limited = (&mut decoder).take(max_bytes as u64 + 1);
    limited
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::Gzip(e.to_string()))?;
    if out.len() > max_bytes {
        return Err(CryptoError::Gzip(format!(
            "decompressed payload exceeds {max_bytes}-byte ceiling"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let compressed = compress(&original);
        let decompressed = decompress(&compressed, original.len() + 1).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn rejects_payload_past_ceiling() {
        let original = vec![0u8; 10_000];
        let compressed = compress(&original);
        assert!(decompress(&compressed, 100).is_err());
    }
}
