// ABOUTME: Archive codec bundling table snapshots into a zip with a JSON manifest and one CSV per table.
// ABOUTME: Parsing validates the manifest before any table data is handed back to the caller.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::codec::{CodecError, decode_rows, encode_rows};
use crate::table::{Column, TableSnapshot, validate_table_name};

/// Name of the manifest entry inside every archive.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Extension appended to a table name to form its data entry name.
pub const DATA_EXTENSION: &str = "csv";

/// Manifest format version written by this codec.
pub const FORMAT_VERSION: &str = "1.0";

/// Errors raised while building or parsing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive format error: {0}")]
    Format(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Describes one table in the manifest. `row_count` is advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<Column>,
}

/// The manifest entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    pub format_version: String,
    pub export_date: String,
    pub tables: Vec<TableDescriptor>,
}

impl ArchiveManifest {
    pub fn new(created_at: DateTime<Utc>, tables: Vec<TableDescriptor>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            export_date: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            tables,
        }
    }

    /// Parsed export date, when it is valid RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.export_date)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

/// A table that could not be written to or read from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub name: String,
    pub error_detail: String,
}

/// Result of [`build_archive`]: the bytes plus which tables made it in.
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub bytes: Vec<u8>,
    pub included: Vec<String>,
    pub failures: Vec<TableFailure>,
}

/// What to do when the manifest lists a table whose data entry is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingEntryPolicy {
    /// Reject the whole archive before any table is touched.
    #[default]
    Reject,
    /// Drop the table from the parsed set and report it as a failure.
    Skip,
}

/// One table's manifest descriptor and its raw data entry.
#[derive(Debug, Clone)]
pub struct ArchivedTable {
    pub descriptor: TableDescriptor,
    pub data: Vec<u8>,
}

impl ArchivedTable {
    /// Decode the data entry against the manifest columns. The snapshot's
    /// row_count reflects the rows actually present, not the manifest.
    pub fn decode(&self) -> Result<TableSnapshot, CodecError> {
        let text = std::str::from_utf8(&self.data)?;
        let rows = decode_rows(&self.descriptor.columns, text)?;
        Ok(TableSnapshot::new(
            self.descriptor.name.clone(),
            self.descriptor.columns.clone(),
            rows,
        ))
    }
}

/// A validated archive: the manifest and each table's data in manifest order.
#[derive(Debug, Clone)]
pub struct ParsedArchive {
    pub manifest: ArchiveManifest,
    pub tables: Vec<ArchivedTable>,
    /// Tables dropped under [`MissingEntryPolicy::Skip`].
    pub skipped: Vec<TableFailure>,
}

impl ParsedArchive {
    pub fn table(&self, name: &str) -> Option<&ArchivedTable> {
        self.tables.iter().find(|t| t.descriptor.name == name)
    }

    /// Raw data entries keyed by table name.
    pub fn table_data(&self) -> BTreeMap<&str, &[u8]> {
        self.tables
            .iter()
            .map(|t| (t.descriptor.name.as_str(), t.data.as_slice()))
            .collect()
    }
}

/// Data entry name for a table.
pub fn data_entry_name(table: &str) -> String {
    format!("{}.{}", table, DATA_EXTENSION)
}

/// Build an archive from snapshots, in the order given. A table whose rows
/// cannot be encoded is left out and reported in `failures`; the manifest is
/// always written, even when no table survives.
pub fn build_archive(tables: &[TableSnapshot]) -> Result<BuiltArchive, ArchiveError> {
    build_archive_at(tables, Utc::now())
}

/// [`build_archive`] with an explicit export timestamp.
pub fn build_archive_at(
    tables: &[TableSnapshot],
    created_at: DateTime<Utc>,
) -> Result<BuiltArchive, ArchiveError> {
    let mut encoded: Vec<(TableDescriptor, String)> = Vec::with_capacity(tables.len());
    let mut failures = Vec::new();

    for table in tables {
        let result = if encoded.iter().any(|(d, _)| d.name == table.name) {
            Err("table appears more than once".to_string())
        } else {
            validate_table_name(&table.name)
                .map_err(|e| e.to_string())
                .and_then(|()| encode_rows(&table.columns, &table.rows).map_err(|e| e.to_string()))
        };
        match result {
            Ok(text) => encoded.push((
                TableDescriptor {
                    name: table.name.clone(),
                    row_count: table.rows.len() as u64,
                    columns: table.columns.clone(),
                },
                text,
            )),
            Err(detail) => {
                tracing::warn!("leaving table {} out of archive: {}", table.name, detail);
                failures.push(TableFailure {
                    name: table.name.clone(),
                    error_detail: detail,
                });
            }
        }
    }

    let manifest = ArchiveManifest::new(
        created_at,
        encoded.iter().map(|(d, _)| d.clone()).collect(),
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    writer.start_file(MANIFEST_ENTRY, entry_options())?;
    writer.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    for (descriptor, text) in &encoded {
        writer.start_file(data_entry_name(&descriptor.name), entry_options())?;
        writer.write_all(text.as_bytes())?;
    }

    let bytes = writer.finish()?.into_inner();
    Ok(BuiltArchive {
        bytes,
        included: encoded.into_iter().map(|(d, _)| d.name).collect(),
        failures,
    })
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Parse and validate an archive. Fails with [`ArchiveError::Format`] when the
/// manifest is absent or malformed, names an invalid or duplicate table, or
/// (under [`MissingEntryPolicy::Reject`]) references a missing data entry.
pub fn parse_archive(
    bytes: &[u8],
    policy: MissingEntryPolicy,
) -> Result<ParsedArchive, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ArchiveError::Format(format!("not a readable archive: {}", e)))?;

    let manifest_text = match archive.by_name(MANIFEST_ENTRY) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            text
        }
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ArchiveError::Format(format!(
                "archive has no {} entry",
                MANIFEST_ENTRY
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let manifest: ArchiveManifest = serde_json::from_str(&manifest_text)
        .map_err(|e| ArchiveError::Format(format!("malformed manifest: {}", e)))?;

    let mut seen = std::collections::HashSet::new();
    for descriptor in &manifest.tables {
        validate_table_name(&descriptor.name).map_err(|e| {
            ArchiveError::Format(format!("manifest lists an invalid table: {}", e))
        })?;
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ArchiveError::Format(format!(
                "manifest lists table {} more than once",
                descriptor.name
            )));
        }
    }

    // Validate every reference before reading any data.
    let present: std::collections::HashSet<String> =
        archive.file_names().map(str::to_string).collect();
    let mut skipped = Vec::new();
    for descriptor in &manifest.tables {
        let entry = data_entry_name(&descriptor.name);
        if present.contains(&entry) {
            continue;
        }
        match policy {
            MissingEntryPolicy::Reject => {
                return Err(ArchiveError::Format(format!(
                    "manifest lists table {} but the archive has no {} entry",
                    descriptor.name, entry
                )));
            }
            MissingEntryPolicy::Skip => {
                tracing::warn!("skipping table {}: no {} entry", descriptor.name, entry);
                skipped.push(TableFailure {
                    name: descriptor.name.clone(),
                    error_detail: format!("archive has no {} entry", entry),
                });
            }
        }
    }

    let mut tables = Vec::with_capacity(manifest.tables.len());
    for descriptor in &manifest.tables {
        let entry = data_entry_name(&descriptor.name);
        if !present.contains(&entry) {
            continue;
        }
        let mut file = archive.by_name(&entry)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        tables.push(ArchivedTable {
            descriptor: descriptor.clone(),
            data,
        });
    }

    Ok(ParsedArchive {
        manifest,
        tables,
        skipped,
    })
}
