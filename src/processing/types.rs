//! Metadata record and pipeline error definitions.

use serde::Serialize;
use thiserror::Error;

use crate::document::Document;
use crate::entities::EntityMap;
use crate::summarization::Summary;

/// Message reported when no text could be extracted from a document.
pub const EXTRACTION_FAILURE_MESSAGE: &str = "Could not extract text from the document. The file might be empty, corrupted, or an image-based PDF requiring OCR.";

/// Errors emitted by the metadata pipeline.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Extraction produced no text, so no record was built.
    #[error("{}", EXTRACTION_FAILURE_MESSAGE)]
    ExtractionFailure,
}

/// Metadata derived from one document. Serializes to the public JSON shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// Descriptor of the uploaded file.
    pub file_info: FileInfo,
    /// Statistics over the extracted text.
    pub extracted_content: ContentStats,
    /// Summary, keywords, and entities.
    pub generated_metadata: GeneratedMetadata,
    /// Stage timings in seconds.
    pub processing_stats: ProcessingStats,
}

/// Uploaded file descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    /// Original file name.
    pub name: String,
    /// Declared media type.
    #[serde(rename = "type")]
    pub media_type: String,
    /// Original size in kibibytes, rounded to two decimals.
    #[serde(rename = "sizeKB")]
    pub size_kb: f64,
}

impl FileInfo {
    /// Describe `document`.
    pub fn describe(document: &Document) -> Self {
        Self {
            name: document.name().to_string(),
            media_type: document.media_type().as_mime().to_string(),
            size_kb: round2(document.original_size() as f64 / 1024.0),
        }
    }
}

/// Counts over the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    /// Number of characters (Unicode scalar values).
    pub character_count: usize,
    /// Number of whitespace-separated tokens.
    pub word_count: usize,
}

impl ContentStats {
    /// Count characters and words in `text`.
    pub fn measure(text: &str) -> Self {
        Self {
            character_count: text.chars().count(),
            word_count: text.split_whitespace().count(),
        }
    }
}

/// Results of the enrichment stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMetadata {
    /// Generated summary or a placeholder.
    pub summary: Summary,
    /// Keywords, best first.
    pub keywords: Vec<String>,
    /// Entity surfaces grouped by label.
    pub named_entities: EntityMap,
}

/// Stage timings, in seconds rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessingStats {
    /// Time spent extracting text.
    #[serde(rename = "textExtractionTime_s")]
    pub text_extraction_time_s: f64,
    /// Time spent in summary, keyword, and entity extraction combined.
    #[serde(rename = "nlpProcessingTime_s")]
    pub nlp_processing_time_s: f64,
    /// Sum of both stages.
    #[serde(rename = "totalTime_s")]
    pub total_time_s: f64,
}

impl ProcessingStats {
    /// Build rounded stats from raw stage durations in seconds.
    pub fn from_seconds(extraction: f64, enrichment: f64) -> Self {
        Self {
            text_extraction_time_s: round2(extraction),
            nlp_processing_time_s: round2(enrichment),
            total_time_s: round2(extraction + enrichment),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
