//! Progress events from the extraction loop.
//!
//! The loop reports each model call through a [`ProgressCallback`] so a
//! front end can show a bar, log, or stay silent. A single document can
//! take several minutes of model time, so the events are per call rather
//! than per record.

use std::sync::Arc;

use crate::extraction::StopReason;

/// Receives extraction loop events.
///
/// Shared behind an [`Arc`], hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// The loop is starting and will make at most `max_calls` calls.
    fn started(&self, max_calls: u32);

    /// Model call `call` (1-based) is about to be sent.
    fn call_started(&self, call: u32);

    /// Model call `call` returned a response of `response_bytes` bytes.
    fn call_finished(&self, call: u32, response_bytes: usize);

    /// The loop stopped after `calls` calls with `extracted_bytes`
    /// bytes of output accumulated.
    fn finished(&self, calls: u32, extracted_bytes: usize, reason: StopReason);
}

/// Ignores every event.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn started(&self, _max_calls: u32) {}
    fn call_started(&self, _call: u32) {}
    fn call_finished(&self, _call: u32, _response_bytes: usize) {}
    fn finished(&self, _calls: u32, _extracted_bytes: usize, _reason: StopReason) {}
}

/// Returns a shared [`NullProgress`] for callers that want no reporting.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
