//! OCR through Amazon Textract.
//!
//! Scanned bills have no text layer, so they are sent to Textract's
//! `AnalyzeDocument` (local single-page files) or
//! `StartDocumentAnalysis` (multi-page files already in S3) with the
//! `TABLES` and `FORMS` features. The returned blocks are folded into
//! [`Page`]s: `LINE` blocks become the page text, `TABLE` blocks become
//! [`Table`]s, and `KEY_VALUE_SET` key blocks become [`FormField`]s.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use aws_sdk_textract::error::DisplayErrorContext;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{
    Block, BlockType, Document, DocumentLocation, EntityType, FeatureType, JobStatus,
    RelationshipType, S3Object, SelectionStatus,
};

use crate::{DocumentError, DocumentPayload, FormField, LoadOptions, Page, Table};

async fn client(options: &LoadOptions) -> aws_sdk_textract::Client {
    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = &options.region {
        config_loader = config_loader.region(aws_config::Region::new(region.clone()));
    }

    aws_sdk_textract::Client::new(&config_loader.load().await)
}

fn ocr_error(source: &str, err: impl std::error::Error) -> DocumentError {
    DocumentError::Ocr(format!(
        "Textract failed for {source}: {}",
        DisplayErrorContext(err)
    ))
}

/// Runs synchronous OCR on an in-memory single-page document.
///
/// # Errors
///
/// Returns [`DocumentError::Ocr`] if the Textract call fails (including
/// multi-page PDFs, which the synchronous API rejects).
pub async fn analyze_bytes(
    source: String,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    let client = client(options).await;
    log::info!("Running Textract OCR on {source} ({} bytes)", bytes.len());

    let output = client
        .analyze_document()
        .document(Document::builder().bytes(Blob::new(bytes.to_vec())).build())
        .feature_types(FeatureType::Tables)
        .feature_types(FeatureType::Forms)
        .send()
        .await
        .map_err(|e| ocr_error(&source, &e))?;

    log::debug!("Textract returned {} block(s) for {source}", output.blocks().len());

    Ok(payload_from_blocks(source, output.blocks()))
}

/// Runs an asynchronous OCR job on a document stored in S3 and waits for
/// it, paging through every result set.
///
/// # Errors
///
/// Returns [`DocumentError::Ocr`] if the job cannot be started, fails, or
/// is still running after `options.max_wait`.
pub async fn analyze_s3(
    bucket: &str,
    key: &str,
    options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    let source = format!("s3://{bucket}/{key}");
    let client = client(options).await;

    let started = client
        .start_document_analysis()
        .document_location(
            DocumentLocation::builder()
                .s3_object(S3Object::builder().bucket(bucket).name(key).build())
                .build(),
        )
        .feature_types(FeatureType::Tables)
        .feature_types(FeatureType::Forms)
        .send()
        .await
        .map_err(|e| ocr_error(&source, &e))?;

    let job_id = started
        .job_id()
        .ok_or_else(|| DocumentError::Ocr(format!("Textract returned no job id for {source}")))?
        .to_string();
    log::info!("Started Textract job {job_id} for {source}");

    let deadline = Instant::now() + options.max_wait;
    let mut blocks = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let response = client
            .get_document_analysis()
            .job_id(&job_id)
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|e| ocr_error(&source, &e))?;

        match response.job_status() {
            Some(JobStatus::InProgress) => {
                if Instant::now() >= deadline {
                    return Err(DocumentError::Ocr(format!(
                        "Textract job {job_id} for {source} did not finish within {}s",
                        options.max_wait.as_secs()
                    )));
                }
                log::debug!("Textract job {job_id} still running");
                tokio::time::sleep(options.poll_interval).await;
            }
            Some(status @ (JobStatus::Succeeded | JobStatus::PartialSuccess)) => {
                if *status == JobStatus::PartialSuccess {
                    log::warn!(
                        "Textract job {job_id} only partially succeeded: {}",
                        response.status_message().unwrap_or("no status message")
                    );
                }
                blocks.extend_from_slice(response.blocks());
                match response.next_token() {
                    Some(token) => next_token = Some(token.to_string()),
                    None => break,
                }
            }
            other => {
                return Err(DocumentError::Ocr(format!(
                    "Textract job {job_id} for {source} ended with {other:?}: {}",
                    response.status_message().unwrap_or("no status message")
                )));
            }
        }
    }

    log::debug!("Textract job {job_id} returned {} block(s)", blocks.len());

    Ok(payload_from_blocks(source, &blocks))
}

#[derive(Default)]
struct PageParts {
    lines: Vec<String>,
    tables: Vec<Table>,
    forms: Vec<FormField>,
}

/// Folds Textract blocks into pages. Blocks without a page number belong
/// to page 1 (synchronous responses omit it).
#[must_use]
pub fn payload_from_blocks(source: String, blocks: &[Block]) -> DocumentPayload {
    let by_id: HashMap<&str, &Block> = blocks
        .iter()
        .filter_map(|b| b.id().map(|id| (id, b)))
        .collect();

    let mut pages: BTreeMap<u32, PageParts> = BTreeMap::new();

    for block in blocks {
        let page = block
            .page()
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1);

        match block.block_type() {
            Some(BlockType::Page) => {
                pages.entry(page).or_default();
            }
            Some(BlockType::Line) => {
                if let Some(text) = block.text() {
                    pages.entry(page).or_default().lines.push(text.to_string());
                }
            }
            Some(BlockType::Table) => {
                pages
                    .entry(page)
                    .or_default()
                    .tables
                    .push(table(block, &by_id));
            }
            Some(BlockType::KeyValueSet) if block.entity_types().contains(&EntityType::Key) => {
                if let Some(field) = form_field(block, &by_id) {
                    pages.entry(page).or_default().forms.push(field);
                }
            }
            _ => {}
        }
    }

    DocumentPayload {
        source,
        pages: pages
            .into_iter()
            .map(|(page, parts)| Page {
                tables: parts.tables,
                forms: parts.forms,
                ..Page::from_text(
                    page,
                    crate::normalize::normalize_page_text(&parts.lines.join("\n")),
                )
            })
            .collect(),
    }
}

fn related<'a>(
    block: &'a Block,
    kind: RelationshipType,
    by_id: &'a HashMap<&str, &'a Block>,
) -> impl Iterator<Item = &'a Block> {
    block
        .relationships()
        .iter()
        .filter(move |r| r.r#type() == Some(&kind))
        .flat_map(|r| r.ids().iter())
        .filter_map(|id| by_id.get(id.as_str()).copied())
}

/// Words under `block`, space separated. Ticked checkboxes read as `[X]`.
fn child_text(block: &Block, by_id: &HashMap<&str, &Block>) -> String {
    related(block, RelationshipType::Child, by_id)
        .filter_map(|child| match child.block_type() {
            Some(BlockType::Word) => child.text().map(str::to_string),
            Some(BlockType::SelectionElement)
                if child.selection_status() == Some(&SelectionStatus::Selected) =>
            {
                Some("[X]".to_string())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn table(block: &Block, by_id: &HashMap<&str, &Block>) -> Table {
    let cells: Vec<(usize, usize, String)> = related(block, RelationshipType::Child, by_id)
        .filter(|cell| cell.block_type() == Some(&BlockType::Cell))
        .filter_map(|cell| {
            let row = usize::try_from(cell.row_index()?).ok()?.checked_sub(1)?;
            let column = usize::try_from(cell.column_index()?).ok()?.checked_sub(1)?;
            Some((row, column, child_text(cell, by_id)))
        })
        .collect();

    let height = cells.iter().map(|(row, _, _)| row + 1).max().unwrap_or(0);
    let width = cells.iter().map(|(_, column, _)| column + 1).max().unwrap_or(0);

    let mut rows = vec![vec![String::new(); width]; height];
    for (row, column, text) in cells {
        rows[row][column] = text;
    }

    Table { rows }
}

fn form_field(key_block: &Block, by_id: &HashMap<&str, &Block>) -> Option<FormField> {
    let key = child_text(key_block, by_id);
    if key.is_empty() {
        return None;
    }

    let value = related(key_block, RelationshipType::Value, by_id)
        .map(|value_block| child_text(value_block, by_id))
        .collect::<Vec<_>>()
        .join(" ");

    Some(FormField { key, value })
}
