//! Filesystem tier encoding: one zstd-compressed JSON envelope per key.

use super::key::CacheKey;
use crate::analytics::EpisodeAnalytics;
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Version written into every new blob. Bump together with a migration in
/// [`super::migrate`].
pub const CURRENT_FORMAT_VERSION: u32 = 3;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobEnvelope {
    pub format_version: u32,
    pub agent: String,
    pub scenario: String,
    pub created_at: DateTime<Utc>,
    pub payload_sha256: String,
    /// Kept as the exact bytes that were hashed.
    pub payload: Box<RawValue>,
}

/// Only the field that tells an envelope from a bare payload.
#[derive(Deserialize)]
struct VersionField {
    format_version: Option<u32>,
}

/// A blob read back from disk, not yet migrated.
#[derive(Debug, Clone)]
pub struct DecodedBlob {
    pub path: PathBuf,
    pub format_version: u32,
    pub payload: serde_json::Value,
    /// Read from the uncompressed location of older releases.
    pub legacy_location: bool,
}

/// Hash of the serialized payload text as stored in the envelope.
pub fn payload_sha256(payload: &str) -> String {
    let mut h = Sha256::new();
    h.update(payload.as_bytes());
    hex::encode(h.finalize())
}

pub fn encode(analytics: &EpisodeAnalytics, path: &Path) -> Result<Vec<u8>, StoreError> {
    let corrupt = |e: serde_json::Error| StoreError::CorruptArtifact {
        path: path.to_path_buf(),
        reason: format!("failed to serialize analytics: {e}"),
    };
    let payload = serde_json::to_string(analytics).map_err(corrupt)?;
    let envelope = BlobEnvelope {
        format_version: CURRENT_FORMAT_VERSION,
        agent: analytics.agent.clone(),
        scenario: analytics.scenario.clone(),
        created_at: Utc::now(),
        payload_sha256: payload_sha256(&payload),
        payload: RawValue::from_string(payload).map_err(corrupt)?,
    };
    let json = serde_json::to_vec(&envelope).map_err(corrupt)?;
    zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| StoreError::io(path, e))
}

/// Writes `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never observes a partially written blob.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blob".into());
    let tmp = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    std::fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

/// Deletes temp files that interrupted [`write_atomic`] calls left under
/// `cache_root/<scenario>/`, then scenario directories left empty. Returns
/// how many temp files were removed.
pub fn sweep_temp_files(cache_root: &Path) -> Result<usize, StoreError> {
    let entries = match std::fs::read_dir(cache_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io(cache_root, e)),
    };
    let mut removed = 0;
    for entry in entries {
        let dir = entry.map_err(|e| StoreError::io(cache_root, e))?.path();
        if !dir.is_dir() {
            continue;
        }
        let mut remaining = 0;
        for file in std::fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let file = file.map_err(|e| StoreError::io(&dir, e))?;
            if is_temp_file(&file.file_name().to_string_lossy()) {
                std::fs::remove_file(file.path()).map_err(|e| StoreError::io(file.path(), e))?;
                removed += 1;
            } else {
                remaining += 1;
            }
        }
        if remaining == 0 {
            std::fs::remove_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
    }
    Ok(removed)
}

pub fn exists(cache_root: &Path, key: &CacheKey) -> bool {
    key.legacy_blob_path(cache_root).is_file() || key.blob_path(cache_root).is_file()
}

/// Reads the blob for `key`, probing the legacy uncompressed path first.
pub fn read(cache_root: &Path, key: &CacheKey) -> Result<Option<DecodedBlob>, StoreError> {
    let legacy = key.legacy_blob_path(cache_root);
    if legacy.is_file() {
        let bytes = std::fs::read(&legacy).map_err(|e| StoreError::io(&legacy, e))?;
        return decode_json(&legacy, &bytes, true).map(Some);
    }

    let path = key.blob_path(cache_root);
    if !path.is_file() {
        return Ok(None);
    }
    let compressed = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
    let json = zstd::decode_all(compressed.as_slice()).map_err(|e| StoreError::CorruptArtifact {
        path: path.clone(),
        reason: format!("zstd decode failed: {e}"),
    })?;
    decode_json(&path, &json, false).map(Some)
}

fn decode_json(path: &Path, bytes: &[u8], legacy_location: bool) -> Result<DecodedBlob, StoreError> {
    let corrupt = |reason: String| StoreError::CorruptArtifact {
        path: path.to_path_buf(),
        reason,
    };
    let marker: VersionField =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;

    if marker.format_version.is_none() {
        // Bare payload from before envelopes existed.
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;
        return Ok(DecodedBlob {
            path: path.to_path_buf(),
            format_version: detect_unversioned(&value),
            payload: value,
            legacy_location,
        });
    }

    let envelope: BlobEnvelope =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid envelope: {e}")))?;
    let actual = payload_sha256(envelope.payload.get());
    if actual != envelope.payload_sha256 {
        return Err(corrupt(format!(
            "payload checksum mismatch (expected {}, got {})",
            envelope.payload_sha256, actual
        )));
    }
    let payload = serde_json::from_str(envelope.payload.get())
        .map_err(|e| corrupt(format!("invalid payload: {e}")))?;

    Ok(DecodedBlob {
        path: path.to_path_buf(),
        format_version: envelope.format_version,
        payload,
        legacy_location,
    })
}

/// Generation of a payload without envelope, inferred from which fields it
/// carries.
fn detect_unversioned(payload: &serde_json::Value) -> u32 {
    if payload.get("alarms").is_some() {
        3
    } else if payload.get("cumulative_rewards").is_some() {
        2
    } else {
        1
    }
}
