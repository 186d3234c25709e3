use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use zip::ZipArchive;
use zip::result::ZipError;
use zip::write::ZipWriter;

use crate::models::problem::Meta;

const TESTS_DIR: &str = "tests/";
const OUTPUT_SUFFIX: &str = ".a";
const BYTES_PER_MIB: i64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid zip archive: {0}")]
    Malformed(#[from] ZipError),
    #[error("{0} not found")]
    MissingProperties(String),
    #[error("failed to read problem-properties.json: {0}")]
    Properties(#[from] serde_json::Error),
    #[error("{field} out of range: {value}")]
    LimitOutOfRange { field: &'static str, value: i64 },
    #[error("missing output file for test input {0}")]
    MissingOutput(String),
    #[error("missing input file for test output {0}")]
    MissingInput(String),
    #[error("unsafe archive path: {0}")]
    UnsafePath(String),
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded `problem-properties.json`. Memory limit is in bytes as declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProblemProperties {
    #[serde(rename = "name")]
    pub title: String,
    #[serde(rename = "timeLimit")]
    pub time_limit: i64,
    #[serde(rename = "memoryLimit")]
    pub memory_limit: i64,

    pub legend: Option<String>,
    pub scoring: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "output")]
    pub output_format: Option<String>,
    #[serde(rename = "input")]
    pub input_format: Option<String>,
}

impl ProblemProperties {
    pub fn time_limit_ms(&self) -> Result<i32, ArchiveError> {
        non_negative_i32("timeLimit", self.time_limit)
    }

    /// Declared memory limit converted from bytes to mebibytes.
    pub fn memory_limit_mib(&self) -> Result<i32, ArchiveError> {
        if self.memory_limit < 0 {
            return Err(ArchiveError::LimitOutOfRange {
                field: "memoryLimit",
                value: self.memory_limit,
            });
        }
        non_negative_i32("memoryLimit", self.memory_limit / BYTES_PER_MIB)
    }
}

fn non_negative_i32(field: &'static str, value: i64) -> Result<i32, ArchiveError> {
    match i32::try_from(value) {
        Ok(v) if v >= 0 => Ok(v),
        _ => Err(ArchiveError::LimitOutOfRange { field, value }),
    }
}

/// Result of validating an uploaded problem package.
#[derive(Debug)]
pub struct ParsedArchive {
    pub properties: ProblemProperties,
    /// A fresh zip holding only the validated `tests/` entries.
    pub tests_archive: Vec<u8>,
    pub meta: Meta,
}

/// Path of the properties document for a statement locale.
pub fn properties_path(locale: &str) -> String {
    format!("statements/{locale}/problem-properties.json")
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Validate a problem package and repackage its test files.
///
/// Every `tests/<name>` input must have a `tests/<name>.a` output and vice
/// versa. Test entries are copied without recompression. Hidden or unnamed
/// entries are skipped.
pub fn parse_problem_archive<R: Read + Seek>(
    reader: R,
    locale: &str,
) -> Result<ParsedArchive, ArchiveError> {
    let mut archive = ZipArchive::new(reader)?;
    let properties_path = properties_path(locale);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut properties: Option<ProblemProperties> = None;
    let mut inputs: BTreeSet<String> = BTreeSet::new();
    let mut outputs: BTreeSet<String> = BTreeSet::new();

    for i in 0..archive.len() {
        let (name, is_dir) = {
            let entry = archive.by_index_raw(i)?;
            (entry.name().to_string(), entry.is_dir())
        };
        if is_dir {
            continue;
        }

        let base = base_name(&name);
        if base.is_empty() || base.starts_with('.') {
            if name.starts_with(TESTS_DIR) {
                warn!(entry = %name, "Skipping hidden or unnamed test file");
            }
            continue;
        }

        if name == properties_path {
            let entry = archive.by_index(i)?;
            properties = Some(serde_json::from_reader(entry)?);
            continue;
        }

        let Some(file_name) = name.strip_prefix(TESTS_DIR) else {
            continue;
        };
        if file_name.contains('/') {
            continue;
        }

        match file_name.strip_suffix(OUTPUT_SUFFIX) {
            Some(stem) => outputs.insert(stem.to_string()),
            None => inputs.insert(file_name.to_string()),
        };

        let entry = archive.by_index_raw(i)?;
        writer.raw_copy_file(entry)?;
    }

    let properties = properties.ok_or(ArchiveError::MissingProperties(properties_path))?;

    if let Some(input) = inputs.difference(&outputs).next() {
        return Err(ArchiveError::MissingOutput(input.clone()));
    }
    if let Some(output) = outputs.difference(&inputs).next() {
        return Err(ArchiveError::MissingInput(output.clone()));
    }

    // Reject bad limits before the caller persists anything.
    properties.time_limit_ms()?;
    properties.memory_limit_mib()?;

    let meta = Meta::from_names(inputs.into_iter().collect());
    let tests_archive = writer.finish()?.into_inner();

    Ok(ParsedArchive {
        properties,
        tests_archive,
        meta,
    })
}
