//! Uploaded documents and their declared media types.

use std::fmt;

/// MIME type of an Office Open XML word-processing document.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// MIME type of a PDF document.
pub const PDF_MIME: &str = "application/pdf";
/// MIME type of a plain-text document.
pub const PLAIN_TEXT_MIME: &str = "text/plain";

/// Declared media type of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    /// Paginated PDF document.
    Pdf,
    /// Word-processing document (DOCX).
    Docx,
    /// UTF-8 plain text.
    PlainText,
    /// Any other declared type; extraction yields no text.
    Other(String),
}

impl MediaType {
    /// Resolve a declared MIME type, ignoring parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => Self::Pdf,
            DOCX_MIME => Self::Docx,
            PLAIN_TEXT_MIME => Self::PlainText,
            _ => Self::Other(mime.trim().to_string()),
        }
    }

    /// Resolve a media type from a file extension (without the leading dot).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Canonical MIME string reported in the file descriptor.
    pub fn as_mime(&self) -> &str {
        match self {
            Self::Pdf => PDF_MIME,
            Self::Docx => DOCX_MIME,
            Self::PlainText => PLAIN_TEXT_MIME,
            Self::Other(mime) => mime,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Raw document payload handed to the pipeline.
///
/// A document is immutable once built and is dropped when the pipeline invocation that
/// consumed it completes.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    media_type: MediaType,
    bytes: Vec<u8>,
    original_size: u64,
}

impl Document {
    /// Wrap an uploaded payload. The original size is taken from the payload length.
    pub fn new(name: impl Into<String>, media_type: MediaType, bytes: Vec<u8>) -> Self {
        let original_size = bytes.len() as u64;
        Self {
            name: name.into(),
            media_type,
            bytes,
            original_size,
        }
    }

    /// Wrap a payload whose size was reported separately by the upload surface.
    pub fn with_original_size(mut self, original_size: u64) -> Self {
        self.original_size = original_size;
        self
    }

    /// Original filename supplied by the uploader.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type.
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Raw payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size reported at upload time, in bytes.
    pub fn original_size(&self) -> u64 {
        self.original_size
    }
}
