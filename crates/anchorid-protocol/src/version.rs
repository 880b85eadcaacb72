//! The versioned rule set every time-sensitive operation is routed through
//! (spec.md §4.1). Selection is pure and deterministic: `version_at` is a
//! binary search over an ordered table, never a side effect.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The knobs spec.md §4.1 names as varying per protocol version. Every
/// field here is a size ceiling, a count ceiling, or a fee/lock multiplier —
/// never behavior; behavior differences that did exist historically (the
/// JWK coordinate length check) are resolved uniformly across versions per
/// DESIGN.md's Open Question resolution, so this struct stays pure data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionParameters {
    /// Multihash codes this version accepts for suffixes, reveal values,
    /// and commitments. `0x12` (SHA2-256) in every shipped version.
    pub hash_algorithms_in_multihash_code: Vec<u64>,
    pub max_core_index_file_size: usize,
    pub max_provisional_index_file_size: usize,
    pub max_proof_file_size: usize,
    pub max_chunk_file_size: usize,
    pub max_operation_size: usize,
    pub max_delta_size: usize,
    pub max_operations_per_batch: usize,
    pub max_operations_per_block: usize,
    pub max_transactions_per_block: usize,
    pub max_cas_uri_length: usize,
    pub max_writer_lock_id_bytes: usize,
    /// Decompressed-size ceiling multiplier applied on top of each file's
    /// own max size (spec.md §4.7: "Decompression cap = fileMax ×
    /// estimatedDecompressionMultiplier").
    pub estimated_decompression_multiplier: u32,
    pub normalized_fee_to_per_operation_fee_multiplier: u64,
    pub value_time_lock_amount_multiplier: u64,
}

impl VersionParameters {
    pub fn decompression_cap(&self, file_max: usize) -> usize {
        file_max.saturating_mul(self.estimated_decompression_multiplier as usize)
    }
}

/// One row of the protocol version table: the ledger time this version's
/// rules take effect, an opaque identifier, and its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub starting_ledger_time: u64,
    pub version_id: String,
    pub parameters: VersionParameters,
}

/// The JSON shape of `--protocol-versions`: an ordered list of
/// [`VersionEntry`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolVersionConfig {
    pub versions: Vec<VersionEntry>,
}

/// Loads the ordered version table and answers `version_at(ledger_time)`.
/// Holds no mutable state — a fresh lookup is always correct, so there is
/// nothing to refresh or invalidate.
#[derive(Clone, Debug)]
pub struct ProtocolVersionManager {
    versions: Vec<VersionEntry>,
}

impl ProtocolVersionManager {
    /// Build a manager from an explicit, already-ordered version table.
    pub fn new(versions: Vec<VersionEntry>) -> Result<Self, ProtocolError> {
        if versions.is_empty() {
            return Err(ProtocolError::EmptyConfig);
        }
        for (i, pair) in versions.windows(2).enumerate() {
            if pair[1].starting_ledger_time <= pair[0].starting_ledger_time {
                return Err(ProtocolError::UnorderedConfig {
                    index: i + 1,
                    entry_time: pair[1].starting_ledger_time,
                    previous_time: pair[0].starting_ledger_time,
                });
            }
        }
        Ok(Self { versions })
    }

    /// Load a version table from a JSON file on disk (the
    /// `--protocol-versions` startup flag).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ProtocolError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ProtocolError::Io(e.to_string()))?;
        let config: ProtocolVersionConfig =
            serde_json::from_str(&raw).map_err(|e| ProtocolError::Parse(e.to_string()))?;
        Self::new(config.versions)
    }

    /// The baked-in default two-version table: a genesis version and a
    /// current version that tightens the JWK coordinate-length check and
    /// raises a couple of ceilings. Used by nodes that don't supply
    /// `--protocol-versions`, and by every in-crate test in the workspace.
    pub fn default_table() -> Self {
        Self::new(default_versions()).expect("baked-in default table is well-formed")
    }

    /// The rule set active at `ledger_time`, i.e. the entry with the
    /// largest `starting_ledger_time <= ledger_time`.
    pub fn version_at(&self, ledger_time: u64) -> Result<&VersionEntry, ProtocolError> {
        match self
            .versions
            .partition_point(|v| v.starting_ledger_time <= ledger_time)
        {
            0 => Err(ProtocolError::VersionNotFound(ledger_time)),
            n => Ok(&self.versions[n - 1]),
        }
    }

    pub fn versions(&self) -> &[VersionEntry] {
        &self.versions
    }
}

fn default_versions() -> Vec<VersionEntry> {
    let genesis = VersionParameters {
        hash_algorithms_in_multihash_code: vec![0x12],
        max_core_index_file_size: 1_000_000,
        max_provisional_index_file_size: 1_000_000,
        max_proof_file_size: 1_000_000,
        max_chunk_file_size: 10_000_000,
        max_operation_size: 2_000,
        max_delta_size: 1_000,
        max_operations_per_batch: 10_000,
        max_operations_per_block: 10_000,
        max_transactions_per_block: 10,
        max_cas_uri_length: 100,
        max_writer_lock_id_bytes: 50,
        estimated_decompression_multiplier: 3,
        normalized_fee_to_per_operation_fee_multiplier: 1,
        value_time_lock_amount_multiplier: 1,
    };
    let current = VersionParameters {
        max_operations_per_batch: 20_000,
        max_operations_per_block: 20_000,
        ..genesis.clone()
    };
    vec![
        VersionEntry {
            starting_ledger_time: 0,
            version_id: "genesis".to_string(),
            parameters: genesis,
        },
        VersionEntry {
            starting_ledger_time: 1_000_000,
            version_id: "v2".to_string(),
            parameters: current,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_the_version_active_at_a_given_time() {
        let manager = ProtocolVersionManager::default_table();
        assert_eq!(manager.version_at(0).unwrap().version_id, "genesis");
        assert_eq!(manager.version_at(999_999).unwrap().version_id, "genesis");
        assert_eq!(manager.version_at(1_000_000).unwrap().version_id, "v2");
        assert_eq!(manager.version_at(5_000_000).unwrap().version_id, "v2");
    }

    #[test]
    fn rejects_times_before_the_earliest_version() {
        let versions = vec![VersionEntry {
            starting_ledger_time: 100,
            version_id: "only".to_string(),
            parameters: default_versions()[0].parameters.clone(),
        }];
        let manager = ProtocolVersionManager::new(versions).unwrap();
        assert!(matches!(
            manager.version_at(50),
            Err(ProtocolError::VersionNotFound(50))
        ));
    }

    #[test]
    fn rejects_unordered_config() {
        let mut versions = default_versions();
        versions.reverse();
        assert!(matches!(
            ProtocolVersionManager::new(versions),
            Err(ProtocolError::UnorderedConfig { .. })
        ));
    }

    #[test]
    fn rejects_empty_config() {
        assert!(matches!(
            ProtocolVersionManager::new(vec![]),
            Err(ProtocolError::EmptyConfig)
        ));
    }
}
