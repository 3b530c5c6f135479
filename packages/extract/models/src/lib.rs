#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Schema template, record, and record set types for billing extraction.
//!
//! A [`SchemaTemplate`] names the fields every billing line item must carry.
//! Model output accumulates in an [`ExtractedText`] buffer, is parsed into
//! [`Record`]s, and the valid, unique records end up in a [`RecordSet`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Fields of the default medical billing schema, in output order.
pub const BILLING_FIELDS: &[&str] = &[
    "MEDICAL_SERVICE_PROVIDER",
    "DATE_OF_SERVICE",
    "PAGE_NO",
    "DESCRIPTION",
    "CPT_CODE",
    "ICD_CODE",
    "AMOUNT_CHARGED",
    "INSURANCE_PAID",
    "INSURANCE_ADJUSTMENT",
    "PLAINTIFF_PAID",
];

/// Errors that can occur while building or loading a [`SchemaTemplate`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Reading the schema file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The schema file is not valid TOML.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The schema lists no fields.
    #[error("Schema template must contain at least one field")]
    Empty,

    /// A field name is empty or whitespace.
    #[error("Schema template contains a blank field name")]
    BlankField,

    /// A field name appears more than once.
    #[error("Duplicate field in schema template: {field}")]
    Duplicate {
        /// The repeated field name.
        field: String,
    },
}

/// On-disk layout of a schema template file.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    fields: Vec<String>,
}

/// Ordered set of field names that every billing record must contain.
///
/// The first field doubles as the record-start marker: the model is told to
/// open each record with it, and a response without it means there is
/// nothing left to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTemplate {
    fields: Vec<String>,
}

impl SchemaTemplate {
    /// Creates a schema template from an ordered list of field names.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the list is empty, contains a blank name,
    /// or repeats a name.
    pub fn new<I, S>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for field in fields {
            let field = field.into().trim().to_string();
            if field.is_empty() {
                return Err(SchemaError::BlankField);
            }
            if !seen.insert(field.clone()) {
                return Err(SchemaError::Duplicate { field });
            }
            ordered.push(field);
        }

        if ordered.is_empty() {
            return Err(SchemaError::Empty);
        }

        Ok(Self { fields: ordered })
    }

    /// The default medical billing schema ([`BILLING_FIELDS`]).
    #[must_use]
    pub fn billing() -> Self {
        Self {
            fields: BILLING_FIELDS.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// Parses a schema template from TOML of the form
    /// `fields = ["A", "B"]`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the TOML is invalid or the field list is
    /// rejected by [`SchemaTemplate::new`].
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;
        Self::new(file.fields)
    }

    /// Loads a schema template from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Field names in template order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The record-start marker token (the first field).
    #[must_use]
    pub fn marker(&self) -> &str {
        // `new` and `billing` both guarantee at least one field.
        self.fields.first().map_or("", String::as_str)
    }

    /// Returns `true` if `field` is part of the template.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Renders the template as a JSON object whose keys are the fields and
    /// whose values are empty strings, one key per line.
    #[must_use]
    pub fn to_json_template(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|f| format!("  {}: \"\"", serde_json::Value::String(f.clone())))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{{\n{body}\n}}")
    }
}

impl Default for SchemaTemplate {
    fn default() -> Self {
        Self::billing()
    }
}

/// Raw model output accumulated across extraction iterations.
///
/// Append-only: responses are pushed verbatim and never edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(String::new())
    }

    /// Appends a model response verbatim.
    pub fn push_response(&mut self, response: &str) {
        self.0.push_str(response);
    }

    /// The accumulated text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if nothing has been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of the accumulated text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Consumes the buffer, returning the accumulated text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ExtractedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single billing record: field name to string value.
///
/// Keys keep the order in which they were first inserted. Re-inserting a
/// key replaces its value without moving it. Equality ignores key order.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Sets `field` to `value`, returning the previous value if the field
    /// was already present.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let field = field.into();
        let value = value.into();

        if let Some((_, existing)) = self.fields.iter_mut().find(|(k, _)| *k == field) {
            return Some(std::mem::replace(existing, value));
        }

        self.fields.push((field, value));
        None
    }

    /// Value of `field`, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if `field` is present (even with an empty value).
    #[must_use]
    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == field)
    }

    /// Returns `true` if every field of `schema` is present.
    #[must_use]
    pub fn has_all_fields(&self, schema: &SchemaTemplate) -> bool {
        schema.fields().iter().all(|f| self.contains_key(f))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates `(field, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// The full set of `(field, value)` pairs, independent of insertion
    /// order. Two records are duplicates iff their identities are equal.
    #[must_use]
    pub fn identity(&self) -> BTreeMap<String, String> {
        self.fields.iter().cloned().collect()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for Record {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Ordered set of unique records.
///
/// Insertion order is preserved; a record whose [`Record::identity`] has
/// already been seen is rejected.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
    seen: HashSet<BTreeMap<String, String>>,
}

impl RecordSet {
    /// Creates an empty record set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` unless an identical record is already present.
    ///
    /// Returns `true` if the record was added.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.seen.insert(record.identity()) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterates records in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Consumes the set, returning the records in first-seen order.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Column layout for tabular output: the schema fields in template
    /// order, followed by any other field seen in the records, in
    /// first-seen order.
    #[must_use]
    pub fn column_names(&self, schema: &SchemaTemplate) -> Vec<String> {
        let mut columns: Vec<String> = schema.fields().to_vec();
        let mut known: HashSet<&str> = schema.fields().iter().map(String::as_str).collect();

        for record in &self.records {
            for key in record.keys() {
                if known.insert(key) {
                    columns.push(key.to_string());
                }
            }
        }

        columns
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
