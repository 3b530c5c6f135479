#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tabular export of extracted billing records.
//!
//! One row per record, one column per field: the schema fields in template
//! order, then any extra fields the model produced, in first-seen order.
//! Missing fields are written as empty cells. The table is written once,
//! as CSV or as a JSON array of objects.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use medbill_extract_models::{Record, RecordSet, SchemaTemplate};
use serde::ser::{Serialize, SerializeMap, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors that can occur while writing the output table.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Creating or writing the output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output table format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// A JSON array with one object per row.
    Json,
}

impl ExportFormat {
    /// Infers the format from a file extension, falling back to CSV.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("csv") | None => Self::Csv,
            Some(other) => {
                log::warn!("Unrecognized output extension .{other}; writing CSV");
                Self::Csv
            }
        }
    }

    /// Conventional file extension for the format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// What was written by [`export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Output file.
    pub path: PathBuf,
    /// Format written.
    pub format: ExportFormat,
    /// Number of data rows.
    pub rows: usize,
    /// Column headers, in order.
    pub columns: Vec<String>,
}

/// Writes `records` to `path` in the given format.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be created or written.
pub fn export(
    records: &RecordSet,
    schema: &SchemaTemplate,
    path: &Path,
    format: ExportFormat,
) -> Result<ExportSummary, ExportError> {
    let columns = records.column_names(schema);
    let mut writer = BufWriter::new(File::create(path)?);

    match format {
        ExportFormat::Csv => write_csv(records, &columns, &mut writer)?,
        ExportFormat::Json => write_json(records, &columns, &mut writer)?,
    }
    writer.flush()?;

    log::info!(
        "Wrote {} record(s) x {} column(s) to {} ({format})",
        records.len(),
        columns.len(),
        path.display()
    );

    Ok(ExportSummary {
        path: path.to_path_buf(),
        format,
        rows: records.len(),
        columns,
    })
}

/// Writes a header row followed by one row per record.
///
/// # Errors
///
/// Returns [`ExportError::Csv`] if writing fails.
pub fn write_csv<W: Write>(
    records: &RecordSet,
    columns: &[String],
    writer: W,
) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns)?;

    for record in records {
        csv_writer.write_record(columns.iter().map(|c| record.get(c).unwrap_or("")))?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Writes a pretty-printed JSON array of row objects, keys in column order.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if writing fails.
pub fn write_json<W: Write>(
    records: &RecordSet,
    columns: &[String],
    writer: W,
) -> Result<(), ExportError> {
    let rows: Vec<Row<'_>> = records.iter().map(|record| Row { columns, record }).collect();
    serde_json::to_writer_pretty(writer, &rows)?;
    Ok(())
}

/// A record viewed through the table's column layout.
struct Row<'a> {
    columns: &'a [String],
    record: &'a Record,
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(column, self.record.get(column).unwrap_or(""))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    fn sample() -> (SchemaTemplate, RecordSet) {
        let schema = SchemaTemplate::new(["PROVIDER", "AMOUNT"]).unwrap();
        let mut set = RecordSet::new();
        set.insert(
            [("AMOUNT", "120.00"), ("PROVIDER", "ACME, Inc."), ("NOTE", "copay")]
                .into_iter()
                .collect(),
        );
        set.insert([("PROVIDER", "Mercy"), ("AMOUNT", "")].into_iter().collect());
        (schema, set)
    }

    #[test]
    fn csv_has_schema_columns_then_extras() {
        let (schema, set) = sample();
        let mut out = Vec::new();
        write_csv(&set, &set.column_names(&schema), &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "PROVIDER,AMOUNT,NOTE\n\"ACME, Inc.\",120.00,copay\nMercy,,\n"
        );
    }

    #[test]
    fn json_rows_keep_column_order() {
        let (schema, set) = sample();
        let mut out = Vec::new();
        write_json(&set, &set.column_names(&schema), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let provider = text.find("\"PROVIDER\"").unwrap();
        let amount = text.find("\"AMOUNT\"").unwrap();
        let note = text.find("\"NOTE\"").unwrap();
        assert!(provider < amount && amount < note);

        let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(rows[0]["PROVIDER"], "ACME, Inc.");
        assert_eq!(rows[1]["NOTE"], "");
        assert_eq!(rows.as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_set_writes_header_only() {
        let schema = SchemaTemplate::new(["A", "B"]).unwrap();
        let set = RecordSet::new();
        let mut out = Vec::new();
        write_csv(&set, &set.column_names(&schema), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A,B\n");
    }

    #[test]
    fn format_from_path_and_name() {
        assert_eq!(ExportFormat::from_path(Path::new("out.JSON")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.xlsx")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_str("Json").unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn export_writes_file_and_reports_summary() {
        let dir = std::env::temp_dir().join("medbill_export_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("billing.csv");

        let (schema, set) = sample();
        let summary = export(&set, &schema, &path, ExportFormat::Csv).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.columns, ["PROVIDER", "AMOUNT", "NOTE"]);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("PROVIDER,AMOUNT,NOTE\n"));
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let (schema, set) = sample();
        let path = std::env::temp_dir()
            .join("medbill_export_missing_dir")
            .join("nested")
            .join("out.csv");
        let _ = std::fs::remove_dir_all(std::env::temp_dir().join("medbill_export_missing_dir"));

        assert!(matches!(
            export(&set, &schema, &path, ExportFormat::Csv),
            Err(ExportError::Io(_))
        ));
    }
}
