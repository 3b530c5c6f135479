#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for medbill.
//!
//! Reads a billing document, asks the configured model to list every
//! billing item in it, and writes the complete, unique records as a table.
//! The model provider is configured through environment variables (see
//! [`medbill_ai::ModelConfig::from_lookup`]).
//!
//! Uses `indicatif-log-bridge` (via [`medbill_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod pipeline;

use std::path::PathBuf;

use clap::Parser;
use dialoguer::Input;
use medbill_ai::ModelConfig;
use medbill_cli_utils::IndicatifProgress;
use medbill_document::{LoadOptions, PdfLoader};
use medbill_export::ExportFormat;
use medbill_extract::ExtractOptions;
use medbill_extract::extraction::DEFAULT_MAX_ITERATIONS;
use medbill_extract_models::SchemaTemplate;

use crate::pipeline::{Job, default_output_path};

#[derive(Parser)]
#[command(
    name = "medbill",
    about = "Extract medical billing line items from a document into a table"
)]
struct Cli {
    /// Billing document (.pdf, .txt, a saved .json page payload, or an
    /// `s3://bucket/key` PDF for OCR). Prompted for when omitted.
    #[arg(env = "MEDBILL_INPUT")]
    input: Option<PathBuf>,

    /// Output table path. Defaults to `<input stem>_billing.<format>`
    /// next to the input
    #[arg(long, short, env = "MEDBILL_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format (`csv` or `json`). Inferred from `--output` when omitted
    #[arg(long)]
    format: Option<ExportFormat>,

    /// TOML file with a `fields = [...]` list replacing the billing fields
    #[arg(long)]
    schema: Option<PathBuf>,

    /// How PDFs are read: `auto` (text layer, OCR when it is empty),
    /// `text`, or `textract`
    #[arg(long, env = "MEDBILL_PDF_LOADER", default_value_t = PdfLoader::Auto)]
    pdf_loader: PdfLoader,

    /// Maximum number of model calls for the document
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS, value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: u32,

    /// Also write the accumulated raw model output to this path
    #[arg(long)]
    raw_output: Option<PathBuf>,

    /// Also write the page payload sent to the model to this path
    #[arg(long)]
    payload_output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = medbill_cli_utils::init_logger();
    let cli = Cli::parse();

    let input = match cli.input {
        Some(path) => path,
        None => {
            let path: String = Input::new()
                .with_prompt("Path to the billing document")
                .interact_text()?;
            PathBuf::from(path.trim())
        }
    };

    let format = cli.format.unwrap_or_else(|| {
        cli.output
            .as_deref()
            .map_or(ExportFormat::Csv, ExportFormat::from_path)
    });
    let output = cli
        .output
        .unwrap_or_else(|| default_output_path(&input, format));

    let schema = match &cli.schema {
        Some(path) => {
            let schema = SchemaTemplate::load(path)?;
            log::info!(
                "Loaded {} field(s) from {}",
                schema.fields().len(),
                path.display()
            );
            schema
        }
        None => SchemaTemplate::billing(),
    };

    let config = ModelConfig::from_env()?;
    let model = medbill_ai::create_client(&config).await?;

    let job = Job {
        input,
        output,
        format,
        schema,
        options: ExtractOptions {
            max_iterations: cli.max_iterations,
        },
        load: LoadOptions {
            pdf_loader: cli.pdf_loader,
            region: config.region.clone(),
            ..LoadOptions::default()
        },
        payload_output: cli.payload_output,
        raw_output: cli.raw_output,
    };

    let progress = IndicatifProgress::calls_bar(&multi, "Extracting billing records");
    let summary = pipeline::run(&job, model.as_ref(), &progress).await?;

    println!(
        "Extracted {} record(s) from {} page(s) in {} model call(s); wrote {}",
        summary.export.rows,
        summary.pages,
        summary.calls,
        summary.export.path.display()
    );
    log::debug!("Extraction stopped: {:?}", summary.stop_reason);

    Ok(())
}
