//! Snapshot persistence - encoding and decoding of the cache blob.
//!
//! The blob is one zstd frame (with content checksum) holding two postcard
//! values back to back: a small [`CacheHeader`] followed by the model. The
//! header can be decoded on its own, which is what the inspect tool does.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Cache format version - increment when changing the blob layout.
/// Version 1: zstd frame with checksum, postcard header + postcard model.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Metadata written in front of every persisted snapshot.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    /// Blob layout version.
    pub format_version: u32,
    /// Version of the model's serialized shape, supplied by the host.
    pub model_version: u32,
    /// Save counter, increasing across the lifetime of the slot.
    pub generation: u64,
    /// Timestamp when the snapshot was saved.
    pub saved_at: u64,
}

impl CacheHeader {
    pub fn new(model_version: u32, generation: u64, saved_at: u64) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            model_version,
            generation,
            saved_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// Encodes a snapshot into a complete cache blob.
pub fn encode_snapshot<M: Serialize>(
    header: &CacheHeader,
    model: &M,
    level: i32,
) -> Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), level).map_err(|error| {
        CacheError::Serialization(format!("failed to create zstd encoder: {error}"))
    })?;
    encoder.include_checksum(true).map_err(|error| {
        CacheError::Serialization(format!("failed to enable zstd checksum: {error}"))
    })?;

    postcard::to_io(header, &mut encoder).map_err(|error| {
        CacheError::Serialization(format!("failed to encode cache header: {error}"))
    })?;
    postcard::to_io(model, &mut encoder).map_err(|error| {
        CacheError::Serialization(format!("failed to encode model snapshot: {error}"))
    })?;

    encoder.finish().map_err(|error| {
        CacheError::Serialization(format!("failed to finish zstd frame: {error}"))
    })
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Decodes a cache blob, checking both the format and the model version.
pub fn decode_snapshot<M: DeserializeOwned>(
    bytes: &[u8],
    expected_model_version: u32,
) -> Result<(CacheHeader, M)> {
    let payload = decompress(bytes)?;
    let (header, rest) = take_header(&payload)?;

    if header.model_version != expected_model_version {
        return Err(CacheError::VersionMismatch(format!(
            "model version {} != {}",
            header.model_version, expected_model_version
        )));
    }

    let model = postcard::from_bytes(rest)
        .map_err(|error| CacheError::Corrupted(format!("model decode failed: {error}")))?;
    Ok((header, model))
}

/// Decodes only the header of a cache blob.
///
/// The format version is not enforced so tooling can report old blobs.
pub fn read_header(bytes: &[u8]) -> Result<CacheHeader> {
    let payload = decompress(bytes)?;
    let (header, _) = postcard::take_from_bytes::<CacheHeader>(&payload)
        .map_err(|error| CacheError::Corrupted(format!("header decode failed: {error}")))?;
    Ok(header)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(CacheError::Corrupted("empty cache blob".to_string()));
    }
    zstd::stream::decode_all(bytes)
        .map_err(|error| CacheError::Corrupted(format!("decompress failed: {error}")))
}

fn take_header(payload: &[u8]) -> Result<(CacheHeader, &[u8])> {
    let (header, rest) = postcard::take_from_bytes::<CacheHeader>(payload)
        .map_err(|error| CacheError::Corrupted(format!("header decode failed: {error}")))?;

    if header.format_version != CACHE_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch(format!(
            "format version {} != {}",
            header.format_version, CACHE_FORMAT_VERSION
        )));
    }
    Ok((header, rest))
}
