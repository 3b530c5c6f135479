#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for medbill.
//!
//! Provides `indicatif`-backed progress bars behind the [`ProgressCallback`]
//! trait, plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use medbill_extract::StopReason;
use medbill_extract::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `started()` provides the call cap.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a progress bar for model calls. It spins until the loop
    /// starts (model calls can take minutes) and then becomes a
    /// `pos/len` bar over the call cap.
    #[must_use]
    pub fn calls_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "{spinner:.cyan} {msg} {wide_bar:.cyan/dim} {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn started(&self, max_calls: u32) {
        self.bar.set_length(u64::from(max_calls));
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn call_started(&self, call: u32) {
        self.bar.set_message(format!("Model call {call}"));
    }

    fn call_finished(&self, call: u32, response_bytes: usize) {
        self.bar.set_position(u64::from(call));
        self.bar
            .set_message(format!("Model call {call} returned {response_bytes} bytes"));
    }

    fn finished(&self, calls: u32, extracted_bytes: usize, reason: StopReason) {
        let why = match reason {
            StopReason::IterationCap => "call limit reached",
            StopReason::EmptyResponse | StopReason::MissingMarker => "no new records",
        };
        self.bar.finish_with_message(format!(
            "Extraction finished after {calls} call(s), {extracted_bytes} bytes ({why})"
        ));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_bar_tracks_position() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let bar = IndicatifProgress {
            bar: multi.add(ProgressBar::new_spinner()),
            bar_style: ProgressStyle::default_bar(),
        };

        bar.started(3);
        bar.call_started(1);
        bar.call_finished(1, 120);
        bar.call_started(2);
        bar.call_finished(2, 0);
        assert_eq!(bar.bar.length(), Some(3));
        assert_eq!(bar.bar.position(), 2);

        bar.finished(2, 120, StopReason::EmptyResponse);
        assert!(bar.bar.is_finished());
        assert!(bar.bar.message().contains("no new records"));
    }
}
