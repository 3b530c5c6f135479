#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loads billing documents into a structured page payload.
//!
//! PDFs with a text layer are read with pure-Rust text extraction
//! ([`pdf_extract`]), one entry per page, so that the model can attribute
//! each billing line to a page number. Scanned PDFs have no text layer and
//! go through Amazon Textract OCR (the `textract` feature), which also
//! recovers tables and form key/value pairs. A payload can be saved as
//! JSON and loaded back.
//!
//! Entry points are [`load_document`] (local text extraction only) and
//! [`load_document_with`] (OCR-capable).

pub mod normalize;
#[cfg(feature = "textract")]
pub mod textract;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors that can occur while loading a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PDF text extraction failed.
    #[error("PDF extraction error: {0}")]
    Extraction(String),

    /// OCR failed or is not available in this build.
    #[error("OCR error: {0}")]
    Ocr(String),

    /// A saved payload is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not one the loader understands.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// A table recovered by OCR, as rows of cell text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

/// A form key/value pair recovered by OCR (e.g. `Patient Name:` / `J. Doe`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    pub value: String,
}

/// Content of a single document page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub page: u32,
    /// Extracted page text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<FormField>,
}

impl Page {
    /// A text-only page.
    #[must_use]
    pub const fn from_text(page: u32, text: String) -> Self {
        Self {
            page,
            text,
            tables: Vec::new(),
            forms: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.tables.is_empty() && self.forms.is_empty()
    }
}

/// Structured content of one document.
///
/// Produced once per run and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    /// Where the content came from (usually the file path).
    pub source: String,
    /// Pages in document order.
    pub pages: Vec<Page>,
}

impl DocumentPayload {
    /// Builds a payload from raw per-page text, normalizing whitespace.
    #[must_use]
    pub fn from_pages<I, S>(source: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pages = pages
            .into_iter()
            .zip(1u32..)
            .map(|(text, page)| Page::from_text(page, normalize::normalize_page_text(text.as_ref())))
            .collect();

        Self {
            source: source.into(),
            pages,
        }
    }

    /// Extracts per-page text from an in-memory PDF.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Extraction`] if the PDF cannot be parsed.
    pub fn from_pdf_bytes(source: impl Into<String>, bytes: &[u8]) -> Result<Self, DocumentError> {
        let source = source.into();
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
            DocumentError::Extraction(format!("failed to extract text from {source}: {e}"))
        })?;

        log::debug!("Extracted {} page(s) of text from {source}", pages.len());

        Ok(Self::from_pages(source, pages))
    }

    /// Number of pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total number of characters of page text.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    /// Returns `true` if no page has any content (e.g. an image-only scan
    /// read without OCR).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(Page::is_blank)
    }

    /// Serializes the payload as pretty-printed JSON for the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the payload as JSON so it can be reloaded with
    /// [`load_document`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if serialization or the write fails.
    pub fn save_json(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved document payload to {}", path.display());
        Ok(())
    }
}

/// How PDFs are turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PdfLoader {
    /// Use the text layer; fall back to OCR when it is empty or unreadable.
    #[default]
    Auto,
    /// Text layer only.
    Text,
    /// Always OCR.
    Textract,
}

/// Options for [`load_document_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub pdf_loader: PdfLoader,
    /// AWS region for Textract. `None` uses the default AWS chain.
    pub region: Option<String>,
    /// Delay between status checks of an asynchronous (S3) OCR job.
    pub poll_interval: Duration,
    /// Give up on an asynchronous OCR job after this long.
    pub max_wait: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            pdf_loader: PdfLoader::Auto,
            region: None,
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(15 * 60),
        }
    }
}

const OCR_AVAILABLE: bool = cfg!(feature = "textract");

/// Loads a document from disk using local text extraction only.
///
/// Supported formats, by extension:
///
/// * `.pdf`: per-page text extraction
/// * `.json`: a payload previously written by [`DocumentPayload::save_json`]
/// * `.txt`: plain text, treated as a single page
///
/// # Errors
///
/// Returns [`DocumentError`] if the file cannot be read, has an unsupported
/// extension, or cannot be parsed.
pub fn load_document(path: &Path) -> Result<DocumentPayload, DocumentError> {
    let source = path.display().to_string();

    let payload = match extension_of(path).as_str() {
        "pdf" => DocumentPayload::from_pdf_bytes(source, &read_bytes(path)?)?,
        "json" => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        "txt" => DocumentPayload::from_pages(source, [std::fs::read_to_string(path)?]),
        other => return Err(unsupported(other, &source)),
    };

    Ok(loaded(payload))
}

/// Loads a document, running OCR on PDFs when `options` call for it.
///
/// Besides local paths, `s3://bucket/key` locations are accepted and are
/// always OCR'd with an asynchronous Textract job, which is the only way
/// Textract reads multi-page PDFs. Local PDFs are sent to Textract's
/// synchronous API, which accepts single-page documents.
///
/// # Errors
///
/// Returns [`DocumentError`] if the file cannot be read or parsed, or if
/// OCR is needed and fails or was not compiled in.
pub async fn load_document_with(
    path: &Path,
    options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    if let Some(location) = path.to_str().and_then(|p| p.strip_prefix("s3://")) {
        let (bucket, key) = location
            .split_once('/')
            .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
            .ok_or_else(|| {
                DocumentError::UnsupportedFormat(format!(
                    "{} is not an s3://bucket/key location",
                    path.display()
                ))
            })?;
        return Ok(loaded(ocr_s3(bucket, key, options).await?));
    }

    if extension_of(path) != "pdf" {
        return load_document(path);
    }

    let source = path.display().to_string();
    let bytes = read_bytes(path)?;

    let payload = match options.pdf_loader {
        PdfLoader::Text => DocumentPayload::from_pdf_bytes(source, &bytes)?,
        PdfLoader::Textract => ocr_bytes(source, &bytes, options).await?,
        PdfLoader::Auto => match DocumentPayload::from_pdf_bytes(source.clone(), &bytes) {
            Ok(payload) if !payload.is_blank() || !OCR_AVAILABLE => payload,
            Ok(_) => {
                log::info!("{source} has no text layer; running OCR");
                ocr_bytes(source, &bytes, options).await?
            }
            Err(e) if OCR_AVAILABLE => {
                log::info!("{e}; running OCR instead");
                ocr_bytes(source, &bytes, options).await?
            }
            Err(e) => return Err(e),
        },
    };

    Ok(loaded(payload))
}

#[cfg(feature = "textract")]
async fn ocr_bytes(
    source: String,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    textract::analyze_bytes(source, bytes, options).await
}

#[cfg(feature = "textract")]
async fn ocr_s3(
    bucket: &str,
    key: &str,
    options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    textract::analyze_s3(bucket, key, options).await
}

#[cfg(not(feature = "textract"))]
#[allow(clippy::unused_async)]
async fn ocr_bytes(
    source: String,
    _bytes: &[u8],
    _options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    Err(ocr_unavailable(&source))
}

#[cfg(not(feature = "textract"))]
#[allow(clippy::unused_async)]
async fn ocr_s3(
    bucket: &str,
    key: &str,
    _options: &LoadOptions,
) -> Result<DocumentPayload, DocumentError> {
    Err(ocr_unavailable(&format!("s3://{bucket}/{key}")))
}

#[cfg(not(feature = "textract"))]
fn ocr_unavailable(source: &str) -> DocumentError {
    DocumentError::Ocr(format!(
        "{source} needs OCR but Textract support is not compiled. Rebuild with --features textract"
    ))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, DocumentError> {
    let bytes = std::fs::read(path)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

fn unsupported(extension: &str, source: &str) -> DocumentError {
    DocumentError::UnsupportedFormat(if extension.is_empty() {
        format!("{source} has no file extension")
    } else {
        format!(".{extension} ({source})")
    })
}

fn loaded(payload: DocumentPayload) -> DocumentPayload {
    if payload.is_blank() {
        log::warn!(
            "{} contains no extractable text; scanned images need OCR before extraction",
            payload.source
        );
    }

    log::info!(
        "Loaded {}: {} page(s), {} characters",
        payload.source,
        payload.page_count(),
        payload.char_count()
    );

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("medbill_document_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pages_are_numbered_from_one() {
        let payload = DocumentPayload::from_pages("mem", ["first  \n", "", "third"]);
        assert_eq!(payload.page_count(), 3);
        assert_eq!(payload.pages[0], Page::from_text(1, "first".to_string()));
        assert_eq!(payload.pages[2].page, 3);
        assert!(!payload.is_blank());
        assert_eq!(payload.char_count(), 10);
    }

    #[test]
    fn blank_payload_is_detected() {
        let payload = DocumentPayload::from_pages("mem", ["  ", "\n\n"]);
        assert!(payload.is_blank());
    }

    #[test]
    fn loads_plain_text_as_single_page() {
        let dir = scratch_dir("txt");
        let path = dir.join("bill.TXT");
        std::fs::write(&path, "ACME Clinic\n99213  $120.00\n").unwrap();

        let payload = load_document(&path).unwrap();
        assert_eq!(payload.page_count(), 1);
        assert_eq!(payload.pages[0].text, "ACME Clinic\n99213  $120.00");
    }

    #[test]
    fn saved_payload_loads_back() {
        let dir = scratch_dir("json");
        let path = dir.join("payload.json");
        let payload = DocumentPayload::from_pages("scan.pdf", ["page one", "page two"]);
        payload.save_json(&path).unwrap();

        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(loaded.source, "scan.pdf");
    }

    #[test]
    fn prompt_json_has_source_and_pages() {
        let payload = DocumentPayload::from_pages("scan.pdf", ["hello"]);
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["source"], "scan.pdf");
        assert_eq!(json["pages"][0]["page"], 1);
        assert_eq!(json["pages"][0]["text"], "hello");
    }

    #[test]
    fn rejects_unknown_extensions_and_missing_files() {
        let dir = scratch_dir("errors");
        let docx = dir.join("bill.docx");
        std::fs::write(&docx, "x").unwrap();
        assert!(matches!(
            load_document(&docx),
            Err(DocumentError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            load_document(&dir.join("missing.pdf")),
            Err(DocumentError::Io(_))
        ));
    }

    #[test]
    fn text_pages_serialize_without_ocr_fields() {
        let payload = DocumentPayload::from_pages("scan.pdf", ["hello"]);
        let json = payload.to_json().unwrap();
        assert!(!json.contains("tables"));
        assert!(!json.contains("forms"));

        let with_table = DocumentPayload {
            source: "scan.pdf".to_string(),
            pages: vec![Page {
                tables: vec![Table {
                    rows: vec![vec!["CPT".to_string(), "Amount".to_string()]],
                }],
                ..Page::from_text(1, String::new())
            }],
        };
        assert!(!with_table.is_blank());
        let json: serde_json::Value =
            serde_json::from_str(&with_table.to_json().unwrap()).unwrap();
        assert_eq!(json["pages"][0]["tables"][0]["rows"][0][1], "Amount");
    }

    #[test]
    fn pdf_loader_names_parse() {
        use std::str::FromStr as _;

        assert_eq!(PdfLoader::from_str("TEXTRACT").unwrap(), PdfLoader::Textract);
        assert_eq!(PdfLoader::from_str("auto").unwrap(), PdfLoader::Auto);
        assert_eq!(PdfLoader::Text.to_string(), "text");
        assert!(PdfLoader::from_str("tesseract").is_err());
    }

    #[tokio::test]
    async fn load_with_options_reads_non_pdf_locally() {
        let dir = scratch_dir("with_options");
        let path = dir.join("bill.txt");
        std::fs::write(&path, "Mercy Hospital").unwrap();

        let options = LoadOptions {
            pdf_loader: PdfLoader::Textract,
            ..LoadOptions::default()
        };
        let payload = load_document_with(&path, &options).await.unwrap();
        assert_eq!(payload.pages[0].text, "Mercy Hospital");
    }

    #[tokio::test]
    async fn text_loader_reports_unreadable_pdf() {
        let dir = scratch_dir("bad_pdf");
        let path = dir.join("scan.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let options = LoadOptions {
            pdf_loader: PdfLoader::Text,
            ..LoadOptions::default()
        };
        assert!(matches!(
            load_document_with(&path, &options).await,
            Err(DocumentError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_s3_locations() {
        for location in ["s3://bucket-only", "s3:///key.pdf"] {
            assert!(matches!(
                load_document_with(Path::new(location), &LoadOptions::default()).await,
                Err(DocumentError::UnsupportedFormat(_))
            ));
        }
    }

    #[cfg(not(feature = "textract"))]
    #[tokio::test]
    async fn forced_ocr_without_textract_is_an_error() {
        let dir = scratch_dir("no_ocr");
        let path = dir.join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let options = LoadOptions {
            pdf_loader: PdfLoader::Textract,
            ..LoadOptions::default()
        };
        assert!(matches!(
            load_document_with(&path, &options).await,
            Err(DocumentError::Ocr(_))
        ));
    }
}
