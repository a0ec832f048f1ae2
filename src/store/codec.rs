//! Blob codec
//!
//! A blob is a zip archive holding exactly one deflated entry: the original
//! filename mapped to the original bytes. Entry timestamps are pinned so that
//! identical input always encodes to identical bytes.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::types::StoreError;

/// Pack `data` into a single-entry archive named `filename`
pub fn encode_blob(data: &[u8], filename: &str) -> Result<Vec<u8>, StoreError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(filename, options)
        .map_err(|e| StoreError::Format(format!("failed to start entry '{}': {}", filename, e)))?;
    writer
        .write_all(data)
        .map_err(|e| StoreError::Format(format!("failed to write entry '{}': {}", filename, e)))?;

    let cursor = writer
        .finish()
        .map_err(|e| StoreError::Format(format!("failed to finish archive: {}", e)))?;

    Ok(cursor.into_inner())
}

/// Unpack a blob into `(filename, data)`.
///
/// Fails with [`StoreError::Format`] unless the archive has exactly one entry.
pub fn decode_blob(archive: &[u8]) -> Result<(String, Vec<u8>), StoreError> {
    let mut archive = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| StoreError::Format(format!("not a readable archive: {}", e)))?;

    if archive.len() != 1 {
        return Err(StoreError::Format(format!(
            "archive must contain exactly one entry, found {}",
            archive.len()
        )));
    }

    let mut entry = archive
        .by_index(0)
        .map_err(|e| StoreError::Format(format!("failed to open entry: {}", e)))?;

    // The declared size is untrusted header data; never allocate from it
    let filename = entry.name().to_string();
    let declared = entry.size();
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|e| StoreError::Format(format!("failed to read entry '{}': {}", filename, e)))?;

    if data.len() as u64 != declared {
        return Err(StoreError::Format(format!(
            "entry '{}' declares {} bytes but holds {}",
            filename,
            declared,
            data.len()
        )));
    }

    Ok((filename, data))
}

/// Build a zip64 blob and overwrite every copy of its uncompressed size
#[cfg(test)]
pub(crate) fn blob_with_forged_size(data: &[u8], filename: &str, forged: u64) -> Vec<u8> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .large_file(true);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(filename, options).unwrap();
    writer.write_all(data).unwrap();
    let mut bytes = writer.finish().unwrap().into_inner();

    let real = (data.len() as u64).to_le_bytes();
    let mut patched = 0;
    let mut i = 0;
    while i + 8 <= bytes.len() {
        if bytes[i..i + 8] == real {
            bytes[i..i + 8].copy_from_slice(&forged.to_le_bytes());
            patched += 1;
            i += 8;
        } else {
            i += 1;
        }
    }
    assert!(patched > 0, "no zip64 size field found");
    bytes
}
