//! Versioned Store Service
//!
//! Owns the record index behind one coarse lock:
//! - Mutations (`ingest_*`, `remove`) take the write lock for their whole
//!   duration, blob I/O and snapshot save included
//! - Reads (`list`, `get`, `find_by_hash`, `read_version`) share the read
//!   lock, so they never observe a half-applied mutation
//! - `diff` holds the read lock only to resolve both records

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::StorageConfig;
use crate::diff::{diff_versions, DiffReport};

use super::codec::{decode_blob, encode_blob};
use super::dedup::is_duplicate;
use super::hash::ContentHashes;
use super::index::RecordIndex;
use super::persistence::{load_or_rebuild, save_snapshot, LoadSource};
use super::types::{storage_id, validate_identifier, StoreError, VersionRecord};
use super::version::next_version;

// ============================================================================
// Versioned Store
// ============================================================================

/// Shared handle to the versioned file store
#[derive(Clone)]
pub struct VersionStore {
    inner: Arc<VersionStoreInner>,
}

struct VersionStoreInner {
    /// Snapshot file rewritten after every mutation
    snapshot_path: PathBuf,

    /// Directory of `<storage id>.zip` blobs
    blob_dir: PathBuf,

    /// Authoritative record set
    index: RwLock<RecordIndex>,
}

/// A decoded version, ready to be served
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub record: VersionRecord,
    pub filename: String,
    pub data: Vec<u8>,
}

impl VersionStore {
    /// Open the store, loading the snapshot or rebuilding from the blob directory
    pub async fn open(config: &StorageConfig) -> Result<(Self, LoadSource), StoreError> {
        tokio::fs::create_dir_all(&config.blob_dir)
            .await
            .map_err(|e| StoreError::storage("create", &config.blob_dir, e))?;

        let (index, source) = load_or_rebuild(&config.snapshot_path, &config.blob_dir).await?;

        tracing::info!(
            records = index.len(),
            snapshot = %config.snapshot_path.display(),
            blob_dir = %config.blob_dir.display(),
            "Version store opened"
        );

        let store = Self {
            inner: Arc::new(VersionStoreInner {
                snapshot_path: config.snapshot_path.clone(),
                blob_dir: config.blob_dir.clone(),
                index: RwLock::new(index),
            }),
        };

        Ok((store, source))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Store uploaded bytes as the next version of `identifier`
    pub async fn ingest_from_bytes(
        &self,
        identifier: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<VersionRecord, StoreError> {
        self.ingest(identifier, filename, data).await
    }

    /// Store a file from disk as the next version of `identifier`.
    ///
    /// The stored filename is the path's final component.
    pub async fn ingest_from_path(
        &self,
        identifier: &str,
        path: &Path,
    ) -> Result<VersionRecord, StoreError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StoreError::Validation(format!("'{}' does not name a file", path.display()))
            })?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::storage("read", path, e))?;

        self.ingest(identifier, &filename, &data).await
    }

    async fn ingest(
        &self,
        identifier: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<VersionRecord, StoreError> {
        let mut index = self.inner.index.write().await;

        let record = ingest_into(
            &mut index,
            &self.inner.blob_dir,
            identifier,
            filename,
            data,
            BlobPlacement::Write,
        )
        .await?;

        tracing::info!(
            identifier = %record.identifier,
            version = record.version,
            filename = %record.filename,
            size = data.len(),
            "Stored new version"
        );

        self.persist(&index).await?;
        Ok(record)
    }

    /// Delete one version and its blob. Later versions keep their numbers.
    pub async fn remove(&self, identifier: &str, version: u32) -> Result<VersionRecord, StoreError> {
        let mut index = self.inner.index.write().await;

        let blob_path = index
            .get(identifier, version)
            .map(|record| self.inner.blob_dir.join(record.blob_name()))
            .ok_or_else(|| not_found(identifier, version))?;

        match tokio::fs::remove_file(&blob_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %blob_path.display(),
                    "Blob already missing, removing record only"
                );
            }
            Err(e) => return Err(StoreError::storage("delete", &blob_path, e)),
        }

        let removed = index
            .remove(identifier, version)
            .ok_or_else(|| not_found(identifier, version))?;

        tracing::info!(identifier = %identifier, version = version, "Removed version");

        self.persist(&index).await?;
        Ok(removed)
    }

    async fn persist(&self, index: &RecordIndex) -> Result<(), StoreError> {
        save_snapshot(index, &self.inner.snapshot_path)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Snapshot save failed after mutation");
                StoreError::Persist(e.to_string())
            })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every record, ordered by identifier then version
    pub async fn list(&self) -> Vec<VersionRecord> {
        self.inner.index.read().await.iter().cloned().collect()
    }

    pub async fn get(&self, identifier: &str, version: u32) -> Result<VersionRecord, StoreError> {
        self.inner
            .index
            .read()
            .await
            .get(identifier, version)
            .cloned()
            .ok_or_else(|| not_found(identifier, version))
    }

    /// Look a record up by either its SHA-1 or its MD5
    pub async fn find_by_hash(&self, hash: &str) -> Result<VersionRecord, StoreError> {
        self.inner
            .index
            .read()
            .await
            .find_by_hash(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("no version with hash {}", hash)))
    }

    /// Decode the stored bytes of one version
    pub async fn read_version(&self, identifier: &str, version: u32) -> Result<StoredFile, StoreError> {
        let index = self.inner.index.read().await;
        let record = index
            .get(identifier, version)
            .cloned()
            .ok_or_else(|| not_found(identifier, version))?;

        let (filename, data) = self.read_blob(&record).await?;
        Ok(StoredFile {
            record,
            filename,
            data,
        })
    }

    /// Diff version `base` of `identifier` against version `base + 1`.
    ///
    /// Only the record lookup holds the read lock; blob reads and the diff
    /// itself run after it is released, the diff on the blocking pool.
    pub async fn diff(&self, identifier: &str, base: u32) -> Result<DiffReport, StoreError> {
        let target = base
            .checked_add(1)
            .ok_or_else(|| not_found(identifier, base))?;

        let (older, newer) = {
            let index = self.inner.index.read().await;
            let older = index
                .get(identifier, base)
                .cloned()
                .ok_or_else(|| not_found(identifier, base))?;
            let newer = index
                .get(identifier, target)
                .cloned()
                .ok_or_else(|| not_found(identifier, target))?;
            (older, newer)
        };

        let (_, old_data) = self.read_blob(&older).await?;
        let (_, new_data) = self.read_blob(&newer).await?;

        let report =
            tokio::task::spawn_blocking(move || diff_versions(base, &old_data, target, &new_data))
                .await
                .map_err(|e| StoreError::Storage(format!("diff task failed: {}", e)))?;

        tracing::debug!(
            identifier = %identifier,
            base = base,
            insertions = report.insertions,
            deletions = report.deletions,
            "Computed diff"
        );

        Ok(report)
    }

    async fn read_blob(&self, record: &VersionRecord) -> Result<(String, Vec<u8>), StoreError> {
        let path = self.inner.blob_dir.join(record.blob_name());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::storage("read", &path, e))?;
        decode_blob(&bytes)
    }
}

// ============================================================================
// Shared Ingest Routine
// ============================================================================

/// Where the blob for a freshly ingested record comes from
pub(crate) enum BlobPlacement<'a> {
    /// Encode the data and write a new blob
    Write,
    /// The blob is already on disk at this path; move it under the new storage id if needed
    Existing(&'a Path),
}

/// Hash, dedup-check, number and record `data` in `index`.
///
/// On error nothing is added to the index. Saving the snapshot is left to the caller.
pub(crate) async fn ingest_into(
    index: &mut RecordIndex,
    blob_dir: &Path,
    identifier: &str,
    filename: &str,
    data: &[u8],
    placement: BlobPlacement<'_>,
) -> Result<VersionRecord, StoreError> {
    validate_identifier(identifier)?;

    let hashes = ContentHashes::compute(data);
    if is_duplicate(identifier, &hashes, index) {
        return Err(StoreError::DuplicateContent {
            identifier: identifier.to_string(),
            hash: hashes.sha1,
        });
    }

    let version = next_version(identifier, index)?;
    let record = VersionRecord {
        storage_id: storage_id(identifier, version),
        version,
        identifier: identifier.to_string(),
        sha1: hashes.sha1,
        md5: hashes.md5,
        filename: filename.to_string(),
    };

    let target = blob_dir.join(record.blob_name());
    match placement {
        BlobPlacement::Write => {
            let blob = encode_blob(data, filename)?;
            tokio::fs::write(&target, blob)
                .await
                .map_err(|e| StoreError::storage("write", &target, e))?;
        }
        BlobPlacement::Existing(current) if current == target.as_path() => {}
        BlobPlacement::Existing(current) => {
            let occupied = tokio::fs::try_exists(&target)
                .await
                .map_err(|e| StoreError::storage("inspect", &target, e))?;
            if occupied {
                return Err(StoreError::Storage(format!(
                    "cannot move {} to {}: destination exists",
                    current.display(),
                    target.display()
                )));
            }
            tokio::fs::rename(current, &target)
                .await
                .map_err(|e| StoreError::storage("rename", current, e))?;
            tracing::info!(
                from = %current.display(),
                to = %target.display(),
                "Renumbered blob during rebuild"
            );
        }
    }

    index.insert(record.clone());
    Ok(record)
}

fn not_found(identifier: &str, version: u32) -> StoreError {
    StoreError::NotFound(format!("{} version {}", identifier, version))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_config(dir: &TempDir) -> StorageConfig {
        StorageConfig {
            snapshot_path: dir.path().join("file_status.json"),
            blob_dir: dir.path().join("storedconfs"),
        }
    }

    async fn open_store(dir: &TempDir) -> VersionStore {
        let (store, _) = VersionStore::open(&storage_config(dir)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_upload_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let first = store.ingest_from_bytes("doc", "a.txt", b"hello").await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.storage_id, "doc_v1");

        let again = store.ingest_from_bytes("doc", "a.txt", b"hello").await;
        assert!(matches!(again, Err(StoreError::DuplicateContent { .. })));

        let second = store.ingest_from_bytes("doc", "a.txt", b"hello world").await.unwrap();
        assert_eq!(second.version, 2);

        let report = store.diff("doc", 1).await.unwrap();
        assert_eq!(report.text, "hello{+ world+}");

        let file = store.read_version("doc", 1).await.unwrap();
        assert_eq!(file.data, b"hello");
        assert_eq!(file.filename, "a.txt");

        store.remove("doc", 1).await.unwrap();
        assert!(matches!(store.read_version("doc", 1).await, Err(StoreError::NotFound(_))));
        assert_eq!(store.read_version("doc", 2).await.unwrap().data, b"hello world");
    }

    #[tokio::test]
    async fn test_duplicate_leaves_state_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("doc", "a.txt", b"v1").await.unwrap();
        let before = store.list().await;
        let snapshot_before = std::fs::read(temp_dir.path().join("file_status.json")).unwrap();

        let result = store.ingest_from_bytes("doc", "renamed.txt", b"v1").await;
        assert!(matches!(result, Err(StoreError::DuplicateContent { .. })));

        assert_eq!(store.list().await, before);
        assert_eq!(
            std::fs::read(temp_dir.path().join("file_status.json")).unwrap(),
            snapshot_before
        );
        assert!(!temp_dir.path().join("storedconfs/doc_v2.zip").exists());
    }

    #[tokio::test]
    async fn test_same_content_under_other_identifier() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("doc", "a.txt", b"shared").await.unwrap();
        let other = store.ingest_from_bytes("other", "a.txt", b"shared").await.unwrap();
        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_assigns_contiguous_versions() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let body = format!("revision {}", i);
                    store
                        .ingest_from_bytes("doc", "app.conf", body.as_bytes())
                        .await
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut versions = Vec::new();
        for task in tasks {
            versions.push(task.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=16).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_remove_does_not_renumber() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        for body in ["one", "two", "three"] {
            store.ingest_from_bytes("doc", "f.txt", body.as_bytes()).await.unwrap();
        }

        let removed = store.remove("doc", 2).await.unwrap();
        assert_eq!(removed.storage_id, "doc_v2");
        assert!(!temp_dir.path().join("storedconfs/doc_v2.zip").exists());

        let versions: Vec<u32> = store.list().await.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 3]);

        let next = store.ingest_from_bytes("doc", "f.txt", b"four").await.unwrap();
        assert_eq!(next.version, 4);

        assert!(matches!(store.remove("doc", 2).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("doc", "f.txt", b"data").await.unwrap();
        std::fs::remove_file(temp_dir.path().join("storedconfs/doc_v1.zip")).unwrap();

        store.remove("doc", 1).await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let source = temp_dir.path().join("nginx.conf");
        std::fs::write(&source, b"worker_processes 4;").unwrap();

        let record = store.ingest_from_path("nginx", &source).await.unwrap();
        assert_eq!(record.filename, "nginx.conf");
        assert_eq!(record.version, 1);

        let file = store.read_version("nginx", 1).await.unwrap();
        assert_eq!(file.data, b"worker_processes 4;");

        let missing = store
            .ingest_from_path("nginx", &temp_dir.path().join("absent.conf"))
            .await;
        assert!(matches!(missing, Err(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn test_find_by_either_hash() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let record = store.ingest_from_bytes("doc", "a.txt", b"hello").await.unwrap();

        let by_sha1 = store.find_by_hash("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d").await.unwrap();
        let by_md5 = store.find_by_hash("5d41402abc4b2a76b9719d911017c592").await.unwrap();
        assert_eq!(by_sha1, record);
        assert_eq!(by_md5, record);

        assert!(matches!(store.find_by_hash("deadbeef").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_diff_requires_both_versions() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("doc", "a.txt", b"only").await.unwrap();

        assert!(matches!(store.diff("doc", 1).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.diff("doc", 0).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.diff("missing", 1).await, Err(StoreError::NotFound(_))));
    }

    fn pseudo_text(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b'a' + ((state >> 16) % 26) as u8
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writers_progress_during_slow_diff() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("big", "big.txt", &pseudo_text(1, 80_000)).await.unwrap();
        store.ingest_from_bytes("big", "big.txt", &pseudo_text(2, 80_000)).await.unwrap();

        let diff = tokio::spawn({
            let store = store.clone();
            async move { store.diff("big", 1).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let write = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            store.ingest_from_bytes("doc", "a.txt", b"meanwhile"),
        )
        .await;
        assert!(write.expect("writer blocked behind diff").is_ok());

        let removed = tokio::time::timeout(std::time::Duration::from_secs(2), store.remove("doc", 1)).await;
        assert!(removed.expect("remove blocked behind diff").is_ok());

        let report = diff.await.unwrap().unwrap();
        assert!(report.has_changes());
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let result = store.ingest_from_bytes("../escape", "a.txt", b"x").await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_keeps_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            // A directory cannot be overwritten as a file
            snapshot_path: temp_dir.path().to_path_buf(),
            blob_dir: temp_dir.path().join("storedconfs"),
        };
        std::fs::create_dir_all(&config.blob_dir).unwrap();

        let store = VersionStore {
            inner: Arc::new(VersionStoreInner {
                snapshot_path: config.snapshot_path.clone(),
                blob_dir: config.blob_dir.clone(),
                index: RwLock::new(RecordIndex::new()),
            }),
        };

        let result = store.ingest_from_bytes("doc", "a.txt", b"kept").await;
        assert!(matches!(result, Err(StoreError::Persist(_))));

        let records = store.list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_keeps_removal() {
        let temp_dir = TempDir::new().unwrap();
        let config = storage_config(&temp_dir);
        let store = open_store(&temp_dir).await;

        store.ingest_from_bytes("doc", "a.txt", b"one").await.unwrap();
        store.ingest_from_bytes("doc", "a.txt", b"two").await.unwrap();

        // A directory cannot be overwritten as a file
        std::fs::remove_file(&config.snapshot_path).unwrap();
        std::fs::create_dir(&config.snapshot_path).unwrap();

        let result = store.remove("doc", 1).await;
        assert!(matches!(result, Err(StoreError::Persist(_))));

        let versions: Vec<u32> = store.list().await.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![2]);
        assert!(!config.blob_dir.join("doc_v1.zip").exists());
        assert!(matches!(store.get("doc", 1).await, Err(StoreError::NotFound(_))));
    }
}
