//! Document-to-metadata pipeline: extraction, enrichment, and record assembly.

mod service;
pub mod types;

pub use service::{MetadataApi, MetadataService};
pub use types::{
    ContentStats, EXTRACTION_FAILURE_MESSAGE, FileInfo, GeneratedMetadata, MetadataError,
    MetadataRecord, ProcessingStats,
};
