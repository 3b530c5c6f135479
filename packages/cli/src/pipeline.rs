//! One batch run: document in, billing table out.
//!
//! Loads the document, drives the extraction loop, filters the parsed
//! records, and writes the table. Optional side artifacts (the page
//! payload and the raw model output) are written along the way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use medbill_ai::ModelClient;
use medbill_document::LoadOptions;
use medbill_export::{ExportError, ExportFormat, ExportSummary};
use medbill_extract::progress::ProgressCallback;
use medbill_extract::{ExtractError, ExtractOptions, StopReason};
use medbill_extract_models::SchemaTemplate;

/// Errors that can end a batch run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The input document could not be loaded.
    #[error(transparent)]
    Document(#[from] medbill_document::DocumentError),

    /// The extraction loop failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The output table could not be written.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Writing the raw model output failed.
    #[error("Failed to write {path}: {source}")]
    RawOutput {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything a batch run needs besides the model.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: ExportFormat,
    pub schema: SchemaTemplate,
    pub options: ExtractOptions,
    /// How PDFs are read (text layer or OCR).
    pub load: LoadOptions,
    /// Where to save the page payload sent to the model, if anywhere.
    pub payload_output: Option<PathBuf>,
    /// Where to save the accumulated model output, if anywhere.
    pub raw_output: Option<PathBuf>,
}

/// What a finished batch run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pages: usize,
    pub calls: u32,
    pub stop_reason: StopReason,
    pub export: ExportSummary,
}

/// Default table path: `<input stem>_billing.<ext>` next to the input, or
/// in the working directory for `s3://` inputs.
#[must_use]
pub fn default_output_path(input: &Path, format: ExportFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "document".into(), |s| s.to_string_lossy());
    let name = format!("{stem}_billing.{}", format.extension());

    if input.to_str().is_some_and(|p| p.starts_with("s3://")) {
        PathBuf::from(name)
    } else {
        input.with_file_name(name)
    }
}

/// Runs a batch job to completion.
///
/// # Errors
///
/// Returns [`RunError`] if any stage fails. No table is written unless
/// extraction succeeded.
pub async fn run(
    job: &Job,
    model: &dyn ModelClient,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RunSummary, RunError> {
    let start = Instant::now();

    let document = medbill_document::load_document_with(&job.input, &job.load).await?;

    if let Some(path) = &job.payload_output {
        document.save_json(path)?;
    }

    let outcome =
        medbill_extract::run_extraction(model, &document, &job.schema, &job.options, progress)
            .await?;

    if let Some(path) = &job.raw_output {
        std::fs::write(path, outcome.text.as_str()).map_err(|source| RunError::RawOutput {
            path: path.clone(),
            source,
        })?;
        log::info!("Saved raw model output to {}", path.display());
    }

    let records = medbill_extract::collect_records(&outcome.text, &job.schema);
    if records.is_empty() {
        log::warn!("No complete billing records were extracted");
    }

    let export = medbill_export::export(&records, &job.schema, &job.output, job.format)?;

    log::info!("Run finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(RunSummary {
        pages: document.page_count(),
        calls: outcome.calls,
        stop_reason: outcome.stop_reason,
        export,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use medbill_ai::AiError;
    use medbill_extract::progress::null_progress;

    use super::*;

    struct Replay(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl ModelClient for Replay {
        async fn complete(&self, _prompt: &str) -> Result<String, AiError> {
            let mut responses = self.0.lock().unwrap();
            Ok(if responses.is_empty() {
                String::new()
            } else {
                responses.remove(0)
            })
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job(dir: &Path, format: ExportFormat) -> Job {
        let input = dir.join("statement.txt");
        std::fs::write(&input, "Mercy Hospital\n99213 Office visit $120.00").unwrap();
        Job {
            output: default_output_path(&input, format),
            input,
            format,
            schema: SchemaTemplate::new(["PROVIDER", "CPT_CODE", "AMOUNT"]).unwrap(),
            options: ExtractOptions::default(),
            load: LoadOptions::default(),
            payload_output: Some(dir.join("payload.json")),
            raw_output: Some(dir.join("raw.txt")),
        }
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/bills/march.pdf"), ExportFormat::Csv),
            PathBuf::from("/bills/march_billing.csv")
        );
        assert_eq!(
            default_output_path(Path::new("march.pdf"), ExportFormat::Json),
            PathBuf::from("march_billing.json")
        );
        assert_eq!(
            default_output_path(Path::new("s3://claims/2024/march.pdf"), ExportFormat::Csv),
            PathBuf::from("march_billing.csv")
        );
    }

    #[tokio::test]
    async fn writes_table_and_side_artifacts() {
        let dir = scratch_dir("medbill_cli_pipeline_test");
        let job = job(&dir, ExportFormat::Csv);
        let response = "PROVIDER=Mercy Hospital\nCPT_CODE=99213\nAMOUNT=120.00\n\n";
        let model = Replay(Mutex::new(vec![response.to_string(), response.to_string()]));

        let summary = run(&job, &model, &null_progress()).await.unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.calls, 3);
        assert_eq!(summary.stop_reason, StopReason::EmptyResponse);
        assert_eq!(summary.export.rows, 1);
        assert_eq!(summary.export.path, dir.join("statement_billing.csv"));

        let table = std::fs::read_to_string(dir.join("statement_billing.csv")).unwrap();
        assert_eq!(
            table,
            "PROVIDER,CPT_CODE,AMOUNT\nMercy Hospital,99213,120.00\n"
        );
        let raw = std::fs::read_to_string(dir.join("raw.txt")).unwrap();
        assert_eq!(raw, response.repeat(2));
        let payload = std::fs::read_to_string(dir.join("payload.json")).unwrap();
        assert!(payload.contains("99213 Office visit"));
    }

    #[tokio::test]
    async fn model_that_finds_nothing_writes_empty_table() {
        let dir = scratch_dir("medbill_cli_pipeline_empty_test");
        let job = job(&dir, ExportFormat::Json);
        let model = Replay(Mutex::new(vec!["Nothing to report.".to_string()]));

        let summary = run(&job, &model, &null_progress()).await.unwrap();

        assert_eq!(summary.calls, 1);
        assert_eq!(summary.stop_reason, StopReason::MissingMarker);
        assert_eq!(summary.export.rows, 0);
        let table = std::fs::read_to_string(&job.output).unwrap();
        assert_eq!(table.trim(), "[]");
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_model_call() {
        let dir = scratch_dir("medbill_cli_pipeline_missing_test");
        let mut job = job(&dir, ExportFormat::Csv);
        job.input = dir.join("absent.pdf");
        let model = Replay(Mutex::new(Vec::new()));

        let result = run(&job, &model, &null_progress()).await;

        assert!(matches!(result, Err(RunError::Document(_))));
        assert!(!job.output.exists());
    }
}
