//! secp256k1 keypair generation and the JWK shape (`kty: "EC"`,
//! `crv: "secp256k1"`) used for every update/recovery key on the wire.

use anchorid_core::operation::Secp256k1Jwk;
use libsecp256k1::{PublicKey, SecretKey};
use rand::RngCore;

use crate::encoding::{base64url_decode, base64url_encode};
use crate::error::CryptoError;

/// Every legacy protocol version this node has ever shipped pins x/y to 32
/// raw bytes, so their Base64URL-no-pad form is always exactly 43
/// characters. Resolved Open Question: enforce this length uniformly
/// rather than only for the current version, since no version has ever
/// used a different curve.
pub const JWK_COORDINATE_B64_LEN: usize = 43;

pub struct Secp256k1KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl Secp256k1KeyPair {
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let secret_key = SecretKey::random(rng);
        let public_key = PublicKey::from_secret_key(&secret_key);
        Secp256k1KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn jwk(&self) -> Secp256k1Jwk {
        jwk_from_public_key(&self.public_key)
    }
}

/// Split the 65-byte uncompressed SEC1 public key (`0x04 || x || y`) into
/// its Base64URL x/y JWK fields.
pub fn jwk_from_public_key(public_key: &PublicKey) -> Secp256k1Jwk {
    let serialized = public_key.serialize();
    let x = &serialized[1..33];
    let y = &serialized[33..65];
    Secp256k1Jwk {
        kty: "EC".to_string(),
        crv: "secp256k1".to_string(),
        x: base64url_encode(x),
        y: base64url_encode(y),
    }
}

/// Reconstruct a secp256k1 public key from its JWK form, rejecting any jwk
/// whose shape doesn't match what this protocol has ever produced.
pub fn public_key_from_jwk(jwk: &Secp256k1Jwk) -> Result<PublicKey, CryptoError> {
    if jwk.kty != "EC" || jwk.crv != "secp256k1" {
        return Err(CryptoError::InvalidJwk(format!(
            "unsupported kty/crv: {}/{}",
            jwk.kty, jwk.crv
        )));
    }
    if jwk.x.len() != JWK_COORDINATE_B64_LEN || jwk.y.len() != JWK_COORDINATE_B64_LEN {
        return Err(CryptoError::InvalidJwk(
            "x/y coordinates must each be 43 base64url characters".to_string(),
        ));
    }
    let x = base64url_decode(&jwk.x)?;
    let y = base64url_decode(&jwk.y)?;
    if x.len() != 32 || y.len() != 32 {
        return Err(CryptoError::InvalidJwk(
            "decoded x/y coordinates must each be 32 bytes".to_string(),
        ));
    }
    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..33].copy_from_slice(&x);
    uncompressed[33..65].copy_from_slice(&y);
    PublicKey::parse(&uncompressed)
        .map_err(|e| CryptoError::InvalidJwk(format!("invalid curve point: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn jwk_round_trips_through_public_key() {
        let mut rng = OsRng;
        let pair = Secp256k1KeyPair::generate(&mut rng);
        let jwk = pair.jwk();
        let recovered = public_key_from_jwk(&jwk).unwrap();
        assert_eq!(recovered, pair.public_key);
    }

    #[test]
    fn rejects_wrong_coordinate_length() {
        let jwk = Secp256k1Jwk {
            kty: "EC".to_string(),
            crv: "secp256k1".to_string(),
            x: "tooshort".to_string(),
            y: "tooshort".to_string(),
        };
        assert!(public_key_from_jwk(&jwk).is_err());
    }
}
