//! Version number assignment

use super::index::RecordIndex;
use super::types::StoreError;

/// Next version for `identifier`: one past the highest existing version, or 1.
///
/// Always derived from the current record set rather than a counter, so it
/// stays correct after a rebuild that visits blobs out of upload order.
/// Fails once `u32::MAX` is taken.
pub fn next_version(identifier: &str, existing: &RecordIndex) -> Result<u32, StoreError> {
    match existing.records_for(identifier).iter().map(|r| r.version).max() {
        None => Ok(1),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            StoreError::Storage(format!("version numbers exhausted for '{}'", identifier))
        }),
    }
}
