//! Versioned, Deduplicated Blob Store
//!
//! Stores uploads as numbered versions per identifier:
//! - SHA-1 + MD5 fingerprinting, duplicates rejected per identifier
//! - One single-entry zip blob per version on disk
//! - JSON snapshot of the index, rebuilt from the blobs when lost
//!
//! Layout on disk:
//! - `<blob_dir>/<identifier>_v<N>.zip`
//! - `<snapshot_path>` holding `{"files": {"<identifier>": [record, ...]}}`

pub mod codec;
pub mod dedup;
pub mod hash;
pub mod index;
pub mod persistence;
pub mod service;
pub mod types;
pub mod version;

pub use codec::{decode_blob, encode_blob};
pub use hash::ContentHashes;
pub use index::RecordIndex;
pub use persistence::{load_or_rebuild, rebuild, save_snapshot, LoadSource, RebuildReport};
pub use service::{StoredFile, VersionStore};
pub use types::*;
