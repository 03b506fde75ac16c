//! Manifest builder and the two manifest value types.
//!
//! Both are pure value types: nothing here touches disk. JSON field names
//! are PascalCase to match the published manifest format; the in-memory
//! field names stay idiomatic `snake_case`.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::bytes::to_hex;

pub const MANIFEST_VERSION: u32 = 1;

/// The on-disk, serializable unit produced by one packaging run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileManifest {
    #[serde(rename = "Version")]
    pub version: u32,
    /// Perturbed hash per block, hex-encoded, position = chunk ordering.
    #[serde(rename = "BlockHashes")]
    pub block_hashes: Vec<String>,
    #[serde(rename = "Name")]
    pub name: String,
    /// Hex form of the 32-byte unlock value.
    #[serde(rename = "Unlock")]
    pub unlock: String,
    #[serde(rename = "PackedDateEpoch")]
    pub packed_utc: i64,
    #[serde(rename = "CreatedDateEpoch", skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<i64>,
}

impl FileManifest {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Superset used by the pre-hash flow: a [`FileManifest`] plus enough local
/// bookkeeping to truncate a reassembled file's final zero-padding exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalShareFileManifest {
    #[serde(flatten)]
    pub manifest: FileManifest,
    #[serde(rename = "LocalPath")]
    pub local_path: String,
    #[serde(rename = "SizeBytes")]
    pub size_bytes: i64,
    /// Hex SHA-512 of the original plaintext.
    #[serde(rename = "Hash")]
    pub hash: String,
    /// Per-chunk plaintext lengths, decimal strings.
    #[serde(rename = "BlockLengths")]
    pub block_lengths: Vec<String>,
}

impl LocalShareFileManifest {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// The original plaintext length, recovered from the recorded per-chunk
    /// lengths rather than re-derived from ciphertext size.
    pub fn plaintext_len(&self) -> u64 {
        self.block_lengths
            .iter()
            .filter_map(|s| s.parse::<u64>().ok())
            .sum()
    }
}

/// Build the manifest for a finished, perturbed block sequence.
///
/// `blocks[i].full_hash` must already hold the perturbed form `p_i` — this
/// is a pure projection into the serializable shape, not where perturbation
/// happens (see `unlock::perturb_all`).
pub fn build(
    blocks: &[Block],
    unlock_bytes: &[u8; 32],
    name: &str,
    packed_utc: i64,
    created_utc: Option<i64>,
) -> FileManifest {
    FileManifest {
        version: MANIFEST_VERSION,
        block_hashes: blocks.iter().map(|b| to_hex(&b.full_hash)).collect(),
        name: name.to_string(),
        unlock: to_hex(unlock_bytes),
        packed_utc,
        created_utc,
    }
}

/// As [`build`], plus the local bookkeeping `LocalShareFileManifest` carries.
pub fn build_local_share(
    blocks: &[Block],
    unlock_bytes: &[u8; 32],
    name: &str,
    packed_utc: i64,
    created_utc: Option<i64>,
    local_path: &str,
    plaintext_hash: &[u8; 64],
    chunk_lengths: &[u64],
) -> LocalShareFileManifest {
    let manifest = build(blocks, unlock_bytes, name, packed_utc, created_utc);
    LocalShareFileManifest {
        manifest,
        local_path: local_path.to_string(),
        size_bytes: chunk_lengths.iter().sum::<u64>() as i64,
        hash: to_hex(plaintext_hash),
        block_lengths: chunk_lengths.iter().map(|c| c.to_string()).collect(),
    }
}
