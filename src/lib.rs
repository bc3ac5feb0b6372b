#![deny(missing_docs)]

//! Core library for docmeta: turns PDF, DOCX, and plain-text documents into structured
//! metadata (summary, keywords, named entities).

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Uploaded documents and media types.
pub mod document;
/// Named-entity recognition.
pub mod entities;
/// Format-aware text extraction with OCR fallback.
pub mod extraction;
/// Statistical keyword extraction.
pub mod keywords;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document-to-metadata pipeline.
pub mod processing;
/// Remote abstractive summarization.
pub mod summarization;
