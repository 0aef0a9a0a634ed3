use std::io::{self, Cursor, Read, Write};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::domain::ArchiveEntry;
use crate::error::AdxError;

/// A finished `.adx` container held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlob {
    bytes: Vec<u8>,
    entry_names: Vec<String>,
}

impl ArchiveBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub stored: bool,
}

/// Writes `entries` into a ZIP container in the given order.
///
/// Entries are stored without compression and carry a fixed timestamp and
/// permission set, so identical entries always produce identical bytes.
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<ArchiveBlob, AdxError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|err| AdxError::Packaging(format!("{}: {err}", entry.name)))?;
        writer
            .write_all(&entry.payload)
            .map_err(|err| AdxError::Packaging(format!("{}: {err}", entry.name)))?;
    }
    let cursor = writer
        .finish()
        .map_err(|err| AdxError::Packaging(err.to_string()))?;

    Ok(ArchiveBlob {
        bytes: cursor.into_inner(),
        entry_names: entries.iter().map(|entry| entry.name.clone()).collect(),
    })
}

pub fn list_entries(bytes: &[u8]) -> Result<Vec<EntryInfo>, AdxError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| AdxError::Filesystem(err.to_string()))?;

    let mut infos = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| AdxError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| AdxError::Filesystem(err.to_string()))?;
        infos.push(EntryInfo {
            name: entry.name().to_string(),
            size: entry.size(),
            stored: entry.compression() == CompressionMethod::Stored,
        });
    }
    Ok(infos)
}

pub fn read_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, AdxError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| AdxError::Filesystem(err.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| AdxError::Filesystem(err.to_string()))?;
        let mut payload = Vec::new();
        entry
            .read_to_end(&mut payload)
            .map_err(|err| AdxError::Filesystem(err.to_string()))?;
        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            payload,
        });
    }
    Ok(entries)
}
