//! Format-aware text extraction with an OCR fallback for scanned PDFs.
//!
//! [`TextExtractor`] never fails from the caller's point of view: every internal error is
//! logged and turned into an empty result, which the metadata pipeline treats as an
//! extraction failure.

pub mod docx;
pub mod ocr;
pub mod pdf;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::document::{Document, MediaType};

pub use ocr::{OcrEngine, UnavailableOcr, build_ocr_engine};
pub use pdf::{LopdfTextLayer, PdfPageRenderer, PdfTextLayer, PdfiumRenderer, UnavailableRenderer};

/// Errors raised inside the extraction strategies. They never leave [`TextExtractor`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Payload contained no bytes.
    #[error("document is empty")]
    EmptyPayload,
    /// Declared media type has no extraction strategy.
    #[error("unsupported media type: {0}")]
    UnsupportedFormat(String),
    /// PDF structure could not be read.
    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),
    /// PDF is password protected.
    #[error("PDF is encrypted")]
    PdfEncrypted,
    /// A single page could not be rasterized.
    #[error("rendering page {page} failed: {reason}")]
    PdfRendering {
        /// One-based page number.
        page: usize,
        /// Renderer diagnostic.
        reason: String,
    },
    /// The page renderer library is not available.
    #[error("PDF renderer unavailable: {0}")]
    RendererUnavailable(String),
    /// Rendered bitmap could not be encoded.
    #[error("image processing failed: {0}")]
    ImageProcessing(String),
    /// No OCR engine could be initialized.
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),
    /// OCR engine failed on a page image.
    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),
    /// DOCX archive or XML was malformed.
    #[error("DOCX parsing failed: {0}")]
    DocxParsing(String),
    /// Plain text was not valid UTF-8.
    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    /// Reading an archive member failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// When a PDF's text layer is considered too thin and OCR takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrPolicy {
    /// Minimum number of characters (after trimming) the text layer must provide.
    pub min_text_chars: usize,
    /// Rasterization resolution used for OCR.
    pub dpi: u32,
}

impl OcrPolicy {
    /// Whether `direct_text` is too short to trust.
    pub fn requires_ocr(&self, direct_text: &str) -> bool {
        direct_text.trim().chars().count() < self.min_text_chars
    }
}

impl Default for OcrPolicy {
    fn default() -> Self {
        Self {
            min_text_chars: 100,
            dpi: 300,
        }
    }
}

/// Strategy that produced an extraction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    PdfTextLayer,
    /// OCR over rendered PDF pages.
    PdfOcr,
    /// DOCX paragraphs.
    Docx,
    /// UTF-8 decode.
    PlainText,
    /// Extraction failed; text is empty.
    Failed,
}

/// Extracted text together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted text; empty on failure.
    pub text: String,
    /// Strategy used.
    pub method: ExtractionMethod,
}

impl Extraction {
    fn failed() -> Self {
        Self {
            text: String::new(),
            method: ExtractionMethod::Failed,
        }
    }
}

/// Dispatches on the declared media type to a format-specific strategy.
///
/// Holds process-wide, read-only handles to the PDF and OCR backends; share it through an
/// `Arc` and reuse it across documents.
pub struct TextExtractor {
    text_layer: Arc<dyn PdfTextLayer>,
    renderer: Arc<dyn PdfPageRenderer>,
    ocr: Arc<dyn OcrEngine>,
    policy: OcrPolicy,
}

impl TextExtractor {
    /// Assemble an extractor from explicit backends.
    pub fn new(
        text_layer: Arc<dyn PdfTextLayer>,
        renderer: Arc<dyn PdfPageRenderer>,
        ocr: Arc<dyn OcrEngine>,
        policy: OcrPolicy,
    ) -> Self {
        Self {
            text_layer,
            renderer,
            ocr,
            policy,
        }
    }

    /// Build the production extractor. Missing PDFium or Tesseract installs degrade OCR to
    /// an always-failing stand-in instead of aborting startup.
    pub fn from_config(config: &Config) -> Self {
        let renderer: Arc<dyn PdfPageRenderer> = match PdfiumRenderer::new() {
            Ok(renderer) => Arc::new(renderer),
            Err(error) => {
                tracing::warn!(error = %error, "PDF renderer unavailable; scanned PDFs cannot be OCR'd");
                Arc::new(UnavailableRenderer::new(error.to_string()))
            }
        };
        let ocr = build_ocr_engine(config).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "OCR engine unavailable; scanned PDFs cannot be OCR'd");
            Arc::new(UnavailableOcr::new(error.to_string()))
        });
        Self::new(
            Arc::new(LopdfTextLayer),
            renderer,
            ocr,
            OcrPolicy {
                min_text_chars: config.ocr_min_text_chars,
                dpi: config.ocr_dpi,
            },
        )
    }

    /// Extract the text of `document`. Returns an empty string on any failure.
    pub fn extract(&self, document: &Document) -> String {
        self.extract_detailed(document).text
    }

    /// Extract the text of `document`, reporting which strategy produced it.
    pub fn extract_detailed(&self, document: &Document) -> Extraction {
        let media_type = document.media_type();
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_extract(document))) {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(error)) => {
                tracing::warn!(
                    file = document.name(),
                    media_type = %media_type,
                    error = %error,
                    "Text extraction failed"
                );
                Extraction::failed()
            }
            Err(_) => {
                tracing::error!(
                    file = document.name(),
                    media_type = %media_type,
                    "Text extraction panicked"
                );
                Extraction::failed()
            }
        }
    }

    fn try_extract(&self, document: &Document) -> Result<Extraction, ExtractionError> {
        let bytes = document.bytes();
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyPayload);
        }

        match document.media_type() {
            MediaType::Pdf => self.extract_pdf(bytes),
            MediaType::Docx => Ok(Extraction {
                text: docx::read_paragraphs(bytes)?.join("\n"),
                method: ExtractionMethod::Docx,
            }),
            MediaType::PlainText => Ok(Extraction {
                text: String::from_utf8(bytes.to_vec())?,
                method: ExtractionMethod::PlainText,
            }),
            MediaType::Other(mime) => Err(ExtractionError::UnsupportedFormat(mime.clone())),
        }
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<Extraction, ExtractionError> {
        let mut direct = String::new();
        for page in self.text_layer.page_texts(bytes)? {
            append_page(&mut direct, &page);
        }

        if !self.policy.requires_ocr(&direct) {
            return Ok(Extraction {
                text: direct,
                method: ExtractionMethod::PdfTextLayer,
            });
        }

        tracing::info!(
            direct_chars = direct.trim().chars().count(),
            threshold = self.policy.min_text_chars,
            dpi = self.policy.dpi,
            "Direct text extraction yielded minimal text; attempting OCR"
        );
        // OCR output replaces the text layer entirely.
        Ok(Extraction {
            text: self.ocr_pages(bytes)?,
            method: ExtractionMethod::PdfOcr,
        })
    }

    fn ocr_pages(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut text = String::new();
        let mut recognized = 0usize;
        let pages = self
            .renderer
            .render_pages(bytes, self.policy.dpi, &mut |index, rendered| {
                let image = match rendered {
                    Ok(image) => image,
                    Err(error) => {
                        tracing::warn!(page = index + 1, error = %error, "Page could not be rendered for OCR");
                        return;
                    }
                };
                match self.ocr.recognize(&image) {
                    Ok(page_text) => {
                        append_page(&mut text, &page_text);
                        recognized += 1;
                    }
                    Err(error) => {
                        tracing::warn!(page = index + 1, error = %error, "OCR failed for page");
                    }
                }
            })?;

        tracing::debug!(pages, recognized, chars = text.len(), "OCR pass complete");
        Ok(text)
    }
}

/// Append a page's text, keeping a line break between consecutive pages.
fn append_page(buffer: &mut String, page: &str) {
    if page.is_empty() {
        return;
    }
    if !buffer.is_empty() && !buffer.ends_with(char::is_whitespace) {
        buffer.push('\n');
    }
    buffer.push_str(page);
}
