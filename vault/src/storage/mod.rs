//! # Storage: Persisted Vault State
//!
//! A vault's durable state is a single [`VaultRecord`]. Transient state
//! (snapshots, rollback checkpoints, the reentrancy flag) is never written.
//!
//! ## Formats
//!
//! ```text
//! JSON    — on-disk files, human-inspectable, written atomically
//! bincode — compact encoding, and the input to the state digest
//! BLAKE3  — 32-byte digest of the bincode encoding
//! ```
//!
//! Every map in the record is a `BTreeMap`, so the encoding is canonical:
//! two vaults with identical state produce identical bytes and digests.

mod record;

pub use record::VaultRecord;

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading, writing, or validating persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// The record was written by an incompatible format version.
    #[error("unsupported state format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the record.
        found: u16,
        /// Version this build reads and writes.
        expected: u16,
    },

    /// The record decoded but its contents contradict each other.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// Writes `record` to `path` as pretty JSON.
///
/// The bytes go to a sibling temporary file first, which is then renamed
/// over `path`. A crash mid-write leaves the previous file intact.
pub fn save_json<P: AsRef<Path>>(path: P, record: &VaultRecord) -> StorageResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(record)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    {
        let mut file = fs::File::create(tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)?;

    debug!(path = %path.display(), bytes = json.len(), "vault state saved");
    Ok(())
}

/// Reads a record previously written by [`save_json`].
pub fn load_json<P: AsRef<Path>>(path: P) -> StorageResult<VaultRecord> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let record = serde_json::from_slice(&bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "vault state loaded");
    Ok(record)
}

// ---------------------------------------------------------------------------
// Binary encoding & digest
// ---------------------------------------------------------------------------

/// Compact binary encoding of a record.
pub fn encode(record: &VaultRecord) -> StorageResult<Vec<u8>> {
    Ok(bincode::serialize(record)?)
}

/// Inverse of [`encode`].
pub fn decode(bytes: &[u8]) -> StorageResult<VaultRecord> {
    Ok(bincode::deserialize(bytes)?)
}

/// BLAKE3 digest of the record's binary encoding.
pub fn digest(record: &VaultRecord) -> StorageResult<[u8; 32]> {
    let bytes = encode(record)?;
    Ok(*blake3::hash(&bytes).as_bytes())
}

/// [`digest`], hex-encoded.
pub fn digest_hex(record: &VaultRecord) -> StorageResult<String> {
    Ok(hex::encode(digest(record)?))
}
