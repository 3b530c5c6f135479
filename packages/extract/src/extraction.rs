//! Iterative extraction loop.
//!
//! A single model call has a bounded output length, so one call may not
//! cover every billing item in a long document. The loop calls the model
//! repeatedly with the whole document plus everything extracted so far and
//! asks it to continue past that point. The model is trusted, not
//! verified, to avoid repeating records; exact duplicates are removed later
//! by [`crate::filter::filter`].

use std::sync::Arc;

use medbill_ai::ModelClient;
use medbill_document::DocumentPayload;
use medbill_extract_models::{ExtractedText, SchemaTemplate};

use crate::ExtractError;
use crate::progress::ProgressCallback;
use crate::prompt::render_prompt;

/// Default cap on model calls per document.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Tuning for the extraction loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Maximum number of model calls.
    pub max_iterations: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Why the extraction loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every allowed call was made and each returned new records.
    IterationCap,
    /// The model returned an empty response.
    EmptyResponse,
    /// The model's response did not contain the record-start marker.
    MissingMarker,
}

/// Result of a completed extraction loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Every accepted response, concatenated verbatim.
    pub text: ExtractedText,
    /// Number of model calls made.
    pub calls: u32,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
}

/// Runs the extraction loop and returns the accumulated model output.
///
/// See [`run_extraction`] for the loop semantics.
///
/// # Errors
///
/// Returns [`ExtractError`] if the document cannot be serialized or a model
/// call fails after its transport retries.
pub async fn extract_all(
    model: &dyn ModelClient,
    document: &DocumentPayload,
    schema: &SchemaTemplate,
    options: &ExtractOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<ExtractedText, ExtractError> {
    Ok(run_extraction(model, document, schema, options, progress)
        .await?
        .text)
}

/// Runs the extraction loop.
///
/// Makes at most `options.max_iterations` sequential model calls. Each
/// prompt carries the full document, the schema template, and all text
/// accepted so far. The loop stops early, without appending, the first
/// time a response is empty or lacks the schema's marker field; otherwise
/// the response is appended verbatim.
///
/// # Errors
///
/// Returns [`ExtractError`] if the document cannot be serialized or a model
/// call fails after its transport retries. Text accumulated before the
/// failure is discarded.
pub async fn run_extraction(
    model: &dyn ModelClient,
    document: &DocumentPayload,
    schema: &SchemaTemplate,
    options: &ExtractOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<ExtractionOutcome, ExtractError> {
    let document_json = document.to_json()?;
    let marker = schema.marker();
    let max = options.max_iterations;

    let mut text = ExtractedText::new();
    let mut calls = 0;
    let mut stop_reason = StopReason::IterationCap;

    progress.started(max);

    while calls < max {
        calls += 1;
        log::info!("Model call {calls}/{max}");
        progress.call_started(calls);

        let prompt = render_prompt(schema, &document_json, text.as_str());
        log::debug!("Prompt is {} bytes", prompt.len());

        let response = model.complete(&prompt).await?;
        progress.call_finished(calls, response.len());
        log::debug!("Model call {calls} returned {} bytes", response.len());

        if response.is_empty() {
            log::info!("Empty response; no new data found, stopping extraction");
            stop_reason = StopReason::EmptyResponse;
            break;
        }

        if !response.contains(marker) {
            log::info!("Response has no {marker} marker; no new data found, stopping extraction");
            stop_reason = StopReason::MissingMarker;
            break;
        }

        text.push_response(&response);
    }

    if stop_reason == StopReason::IterationCap {
        log::info!("Reached the limit of {max} model call(s)");
    }

    progress.finished(calls, text.len(), stop_reason);

    Ok(ExtractionOutcome {
        text,
        calls,
        stop_reason,
    })
}
