//! Deriving a DID's unique suffix from its Create operation's `suffix_data`
//! (spec.md §3: `didUniqueSuffix = multihash(canonicalize(suffix_data))`).

use anchorid_core::identifier::DidSuffix;
use anchorid_core::operation::SuffixData;

use crate::encoding::canonicalized_multihash;
use crate::error::CryptoError;

pub fn derive_suffix(suffix_data: &SuffixData) -> Result<DidSuffix, CryptoError> {
    let value = serde_json::to_value(suffix_data)
        .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?;
    Ok(DidSuffix(canonicalized_multihash(&value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_suffix_data_derives_the_same_suffix() {
        let suffix_data = SuffixData {
            delta_hash: "h".to_string(),
            recovery_commitment: "r".to_string(),
            type_: None,
        };
        assert_eq!(
            derive_suffix(&suffix_data).unwrap(),
            derive_suffix(&suffix_data).unwrap()
        );
    }

    #[test]
    fn different_suffix_data_derives_different_suffixes() {
        let a = SuffixData {
            delta_hash: "h1".to_string(),
            recovery_commitment: "r".to_string(),
            type_: None,
        };
        let b = SuffixData {
            delta_hash: "h2".to_string(),
            recovery_commitment: "r".to_string(),
            type_: None,
        };
        assert_ne!(derive_suffix(&a).unwrap(), derive_suffix(&b).unwrap());
    }
}
