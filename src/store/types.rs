//! Store types: version records, errors and on-disk naming

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Extension of every blob file in the blob directory
pub const BLOB_EXTENSION: &str = "zip";

/// Suffix given to blobs a rebuild could not restore
pub const SKIPPED_SUFFIX: &str = "skipped";

/// Separator between identifier and version number in a storage id
const VERSION_SEPARATOR: &str = "_v";

// ============================================================================
// Version Record
// ============================================================================

/// Immutable metadata describing one stored upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Storage id, `<identifier>_v<version>`
    #[serde(rename = "id")]
    pub storage_id: String,

    /// Version number within the identifier, starting at 1
    pub version: u32,

    /// Caller-supplied logical name
    pub identifier: String,

    /// SHA-1 of the original bytes (lowercase hex)
    pub sha1: String,

    /// MD5 of the original bytes (lowercase hex)
    pub md5: String,

    /// Filename the bytes were uploaded under
    pub filename: String,
}

impl VersionRecord {
    /// Whether either stored hash equals `hash`
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.sha1 == hash || self.md5 == hash
    }

    /// File name of this record's blob inside the blob directory
    pub fn blob_name(&self) -> String {
        blob_name(&self.storage_id)
    }
}

/// Build the storage id for an identifier/version pair
pub fn storage_id(identifier: &str, version: u32) -> String {
    format!("{}{}{}", identifier, VERSION_SEPARATOR, version)
}

/// Blob file name for a storage id
pub fn blob_name(storage_id: &str) -> String {
    format!("{}.{}", storage_id, BLOB_EXTENSION)
}

/// Split a blob file name (`doc_v3.zip`) back into identifier and version.
///
/// Returns `None` for anything that is not a well-formed blob name.
pub fn parse_blob_name(file_name: &str) -> Option<(String, u32)> {
    let stem = file_name.strip_suffix(&format!(".{}", BLOB_EXTENSION))?;
    let (identifier, version) = stem.rsplit_once(VERSION_SEPARATOR)?;
    if identifier.is_empty() || version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version: u32 = version.parse().ok()?;
    if version == 0 {
        return None;
    }
    Some((identifier.to_string(), version))
}

/// Check that an identifier is usable as part of a file name
pub fn validate_identifier(identifier: &str) -> Result<(), StoreError> {
    if identifier.is_empty() {
        return Err(StoreError::Validation("identifier is required".to_string()));
    }
    if identifier == "." || identifier == ".." {
        return Err(StoreError::Validation(format!(
            "identifier '{}' is reserved",
            identifier
        )));
    }
    if identifier.contains(['/', '\\', '\0']) {
        return Err(StoreError::Validation(format!(
            "identifier '{}' contains a path separator",
            identifier
        )));
    }
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the versioned store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Content already stored under '{identifier}' (hash {hash})")]
    DuplicateContent { identifier: String, hash: String },

    #[error("Blob format error: {0}")]
    Format(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The in-memory index changed but the snapshot could not be written
    #[error("Change applied but snapshot not persisted: {0}")]
    Persist(String),
}

impl StoreError {
    pub(crate) fn storage(action: &str, path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("failed to {} {}: {}", action, path.display(), err))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_id_and_blob_name() {
        assert_eq!(storage_id("doc", 3), "doc_v3");
        assert_eq!(blob_name("doc_v3"), "doc_v3.zip");
    }

    #[test]
    fn test_parse_blob_name() {
        assert_eq!(parse_blob_name("doc_v3.zip"), Some(("doc".to_string(), 3)));
        // Last separator wins so identifiers may contain "_v"
        assert_eq!(
            parse_blob_name("my_var_v12.zip"),
            Some(("my_var".to_string(), 12))
        );
        assert_eq!(parse_blob_name("doc_v0.zip"), None);
        assert_eq!(parse_blob_name("doc_vx.zip"), None);
        assert_eq!(parse_blob_name("_v1.zip"), None);
        assert_eq!(parse_blob_name("doc_v1.zip.skipped"), None);
        assert_eq!(parse_blob_name("notes.txt"), None);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("doc").is_ok());
        assert!(validate_identifier("nginx.conf").is_ok());
        assert!(matches!(validate_identifier(""), Err(StoreError::Validation(_))));
        assert!(matches!(validate_identifier(".."), Err(StoreError::Validation(_))));
        assert!(matches!(validate_identifier("a/b"), Err(StoreError::Validation(_))));
        assert!(matches!(validate_identifier("a\\b"), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_record_wire_shape() {
        let record = VersionRecord {
            storage_id: "doc_v1".to_string(),
            version: 1,
            identifier: "doc".to_string(),
            sha1: "aa".to_string(),
            md5: "bb".to_string(),
            filename: "a.txt".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "doc_v1");
        assert_eq!(json["version"], 1);
        assert_eq!(json["filename"], "a.txt");
        assert!(record.matches_hash("bb"));
        assert!(!record.matches_hash("cc"));
    }
}
