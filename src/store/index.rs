//! In-memory record index
//!
//! Canonical representation of the record set: identifier mapped to that
//! identifier's records in ascending version order. The same shape is what
//! gets written to the snapshot file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{storage_id, VersionRecord};

/// All version records known to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIndex {
    files: BTreeMap<String, Vec<VersionRecord>>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for one identifier, ascending by version
    pub fn records_for(&self, identifier: &str) -> &[VersionRecord] {
        self.files
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert a record, keeping the identifier's sequence ordered
    pub fn insert(&mut self, record: VersionRecord) {
        let versions = self.files.entry(record.identifier.clone()).or_default();
        let position = versions.partition_point(|r| r.version < record.version);
        versions.insert(position, record);
    }

    pub fn get(&self, identifier: &str, version: u32) -> Option<&VersionRecord> {
        self.records_for(identifier)
            .iter()
            .find(|r| r.version == version)
    }

    /// First record whose SHA-1 or MD5 equals `hash`
    pub fn find_by_hash(&self, hash: &str) -> Option<&VersionRecord> {
        self.iter().find(|r| r.matches_hash(hash))
    }

    /// Remove one record. Remaining versions keep their numbers.
    pub fn remove(&mut self, identifier: &str, version: u32) -> Option<VersionRecord> {
        let versions = self.files.get_mut(identifier)?;
        let position = versions.iter().position(|r| r.version == version)?;
        let removed = versions.remove(position);
        if versions.is_empty() {
            self.files.remove(identifier);
        }
        Some(removed)
    }

    /// Every record, ordered by identifier then version
    pub fn iter(&self) -> impl Iterator<Item = &VersionRecord> {
        self.files.values().flatten()
    }

    /// Every record sits under its own identifier with a matching storage id,
    /// and versions strictly ascend within an identifier.
    pub fn is_well_formed(&self) -> bool {
        self.files.iter().all(|(identifier, versions)| {
            versions.iter().all(|r| {
                &r.identifier == identifier
                    && r.version > 0
                    && r.storage_id == storage_id(identifier, r.version)
            }) && versions.windows(2).all(|pair| pair[0].version < pair[1].version)
        })
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
