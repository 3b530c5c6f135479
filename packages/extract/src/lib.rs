#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Billing record extraction.
//!
//! Drives a [`medbill_ai::ModelClient`] over a document until it stops
//! producing new records ([`extraction`]), parses the accumulated
//! `FIELD=VALUE` output into records ([`parser`]), and keeps the complete,
//! unique ones ([`filter`]).

pub mod extraction;
pub mod filter;
pub mod parser;
pub mod progress;
pub mod prompt;

use medbill_extract_models::{ExtractedText, RecordSet, SchemaTemplate};

pub use extraction::{
    ExtractOptions, ExtractionOutcome, StopReason, extract_all, run_extraction,
};

/// Errors that can occur during extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A model call failed after its transport retries.
    #[error("Model call failed: {0}")]
    Model(#[from] medbill_ai::AiError),

    /// The document payload could not be prepared for the prompt.
    #[error("Document error: {0}")]
    Document(#[from] medbill_document::DocumentError),
}

/// Parses extracted text and keeps the complete, unique records.
#[must_use]
pub fn collect_records(text: &ExtractedText, schema: &SchemaTemplate) -> RecordSet {
    let records = parser::parse(text.as_str());
    let parsed = records.len();
    let set = filter::filter(records, schema);

    log::info!(
        "Parsed {parsed} block(s) into {} valid unique record(s)",
        set.len()
    );

    set
}
