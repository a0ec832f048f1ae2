//! Snapshot persistence and rebuild-from-disk
//!
//! The snapshot is a JSON rendering of the [`RecordIndex`]. It is rewritten in
//! place after every mutation (not atomically), so a crash mid-write can leave
//! it unreadable; the blob directory is then the fallback source of truth.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::codec::decode_blob;
use super::index::RecordIndex;
use super::service::{ingest_into, BlobPlacement};
use super::types::{parse_blob_name, StoreError, VersionRecord, SKIPPED_SUFFIX};

// ============================================================================
// Types
// ============================================================================

/// How the index was obtained at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Decoded from the snapshot file
    Snapshot,
    /// Reconstructed from the blob directory
    Rebuilt(RebuildReport),
}

/// Outcome of a rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Blobs turned back into records
    pub restored: usize,
    /// Blobs that could not be restored and were set aside
    pub skipped: Vec<PathBuf>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Overwrite the snapshot file with the full record set
pub async fn save_snapshot(index: &RecordIndex, path: &Path) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(index)
        .map_err(|e| StoreError::Storage(format!("failed to serialize snapshot: {}", e)))?;

    tokio::fs::write(path, json)
        .await
        .map_err(|e| StoreError::storage("write", path, e))?;

    tracing::debug!(path = %path.display(), records = index.len(), "Saved snapshot");
    Ok(())
}

/// Load the snapshot, or rebuild from `blob_dir` when it is missing or unreadable.
///
/// A freshly rebuilt index is saved straight away. Failing to save it is
/// logged but not fatal, since the next mutation retries the save.
pub async fn load_or_rebuild(
    snapshot_path: &Path,
    blob_dir: &Path,
) -> Result<(RecordIndex, LoadSource), StoreError> {
    match tokio::fs::read(snapshot_path).await {
        Ok(bytes) => match serde_json::from_slice::<RecordIndex>(&bytes) {
            Ok(index) if index.is_well_formed() => {
                tracing::info!(
                    path = %snapshot_path.display(),
                    records = index.len(),
                    "Loaded snapshot"
                );
                return Ok((index, LoadSource::Snapshot));
            }
            Ok(_) => {
                tracing::warn!(
                    path = %snapshot_path.display(),
                    "Snapshot is inconsistent, rebuilding from blob directory"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %snapshot_path.display(),
                    error = %e,
                    "Snapshot is unreadable, rebuilding from blob directory"
                );
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %snapshot_path.display(),
                "Snapshot does not exist, rebuilding from blob directory"
            );
        }
        Err(e) => return Err(StoreError::storage("read", snapshot_path, e)),
    }

    let (index, report) = rebuild(blob_dir).await?;

    if let Err(e) = save_snapshot(&index, snapshot_path).await {
        tracing::warn!(error = %e, "Could not save rebuilt snapshot");
    }

    Ok((index, LoadSource::Rebuilt(report)))
}

// ============================================================================
// Rebuild
// ============================================================================

/// Reconstruct the index from the blobs in `blob_dir`.
///
/// Blobs are visited in `(identifier, version)` order and re-ingested, so
/// versions are reassigned from 1 and gaps left by deletions close up. A blob
/// whose number changes is renamed to its new storage id. Blobs that fail to
/// restore are renamed aside with a `.skipped` suffix and skipped.
pub async fn rebuild(blob_dir: &Path) -> Result<(RecordIndex, RebuildReport), StoreError> {
    let mut candidates = list_blobs(blob_dir).await?;
    candidates.sort();

    let mut index = RecordIndex::new();
    let mut report = RebuildReport::default();

    for (identifier, _, path) in candidates {
        match restore_blob(&mut index, blob_dir, &identifier, &path).await {
            Ok(record) => {
                tracing::debug!(
                    identifier = %record.identifier,
                    version = record.version,
                    filename = %record.filename,
                    "Restored blob"
                );
                report.restored += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping blob");
                set_aside(&path).await;
                report.skipped.push(path);
            }
        }
    }

    tracing::info!(
        blob_dir = %blob_dir.display(),
        restored = report.restored,
        skipped = report.skipped.len(),
        "Rebuilt index from blob directory"
    );

    Ok((index, report))
}

/// Well-formed blob files in `blob_dir` as `(identifier, version, path)`
async fn list_blobs(blob_dir: &Path) -> Result<Vec<(String, u32, PathBuf)>, StoreError> {
    let mut entries = tokio::fs::read_dir(blob_dir)
        .await
        .map_err(|e| StoreError::storage("list", blob_dir, e))?;

    let mut blobs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::storage("list", blob_dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        let file_name = entry.file_name();
        let parsed = file_name.to_str().and_then(parse_blob_name);

        match parsed {
            Some((identifier, version)) if is_file => {
                blobs.push((identifier, version, entry.path()));
            }
            _ => tracing::debug!(path = %entry.path().display(), "Ignoring non-blob entry"),
        }
    }

    Ok(blobs)
}

async fn restore_blob(
    index: &mut RecordIndex,
    blob_dir: &Path,
    identifier: &str,
    path: &Path,
) -> Result<VersionRecord, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::storage("read", path, e))?;
    let (filename, data) = decode_blob(&bytes)?;

    ingest_into(
        index,
        blob_dir,
        identifier,
        &filename,
        &data,
        BlobPlacement::Existing(path),
    )
    .await
}

/// Rename a blob that could not be restored so it no longer holds a version slot
async fn set_aside(path: &Path) {
    let mut renamed = OsString::from(path.as_os_str());
    renamed.push(".");
    renamed.push(SKIPPED_SUFFIX);

    if let Err(e) = tokio::fs::rename(path, &renamed).await {
        tracing::warn!(path = %path.display(), error = %e, "Could not set blob aside");
    }
}

// ============================================================================
// Tests
// ============================================================================
