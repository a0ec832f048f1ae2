//! Content hashing
//!
//! Every upload is fingerprinted with two independent digests. Either one
//! matching an existing record is enough to reject the upload as a duplicate.

use md5::Md5;
use sha1::{Digest, Sha1};

/// SHA-1 and MD5 of a byte buffer, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHashes {
    pub sha1: String,
    pub md5: String,
}

impl ContentHashes {
    /// Hash `data` with both digests
    pub fn compute(data: &[u8]) -> Self {
        let mut sha1 = Sha1::new();
        sha1.update(data);

        let mut md5 = Md5::new();
        md5.update(data);

        Self {
            sha1: hex::encode(sha1.finalize()),
            md5: hex::encode(md5.finalize()),
        }
    }
}
