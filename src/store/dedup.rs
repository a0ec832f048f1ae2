//! Per-identifier duplicate detection
//!
//! Content counts as already stored when *either* digest matches a record of
//! the same identifier. A collision on one digest alone is enough to block an
//! upload; identical content under a different identifier is never blocked.

use super::hash::ContentHashes;
use super::index::RecordIndex;

/// Whether `identifier` already has a record matching `hashes` on SHA-1 or MD5
pub fn is_duplicate(identifier: &str, hashes: &ContentHashes, existing: &RecordIndex) -> bool {
    existing
        .records_for(identifier)
        .iter()
        .any(|r| r.sha1 == hashes.sha1 || r.md5 == hashes.md5)
}
