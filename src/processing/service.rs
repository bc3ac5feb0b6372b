//! Metadata service coordinating extraction and the three enrichment stages.

use crate::{
    config::Config,
    document::Document,
    entities::{EntityExtractor, EntityMap},
    extraction::{Extraction, ExtractionMethod, TextExtractor},
    keywords::KeywordExtractor,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::types::{
        ContentStats, FileInfo, GeneratedMetadata, MetadataError, MetadataRecord, ProcessingStats,
    },
    summarization::Summarizer,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Turns documents into metadata records.
///
/// The service owns long-lived, read-only handles to every engine (PDF backends, OCR,
/// summarization client, keyword scorer, entity recognizer) plus the metrics registry.
/// Construct it once near process start and share it through an `Arc`.
pub struct MetadataService {
    extractor: Arc<TextExtractor>,
    summarizer: Arc<Summarizer>,
    keywords: KeywordExtractor,
    entities: EntityExtractor,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the metadata pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// Extract text from `document` and enrich it into a metadata record.
    async fn build_metadata(&self, document: Document) -> Result<MetadataRecord, MetadataError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl MetadataService {
    /// Assemble a service from explicit components.
    pub fn new(
        extractor: TextExtractor,
        summarizer: Summarizer,
        keywords: KeywordExtractor,
        entities: EntityExtractor,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            summarizer: Arc::new(summarizer),
            keywords,
            entities,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the production service from configuration.
    pub fn from_config(config: &Config) -> Self {
        tracing::info!("Initializing metadata engines");
        let service = Self::new(
            TextExtractor::from_config(config),
            Summarizer::from_config(config),
            KeywordExtractor::from_config(config),
            EntityExtractor::from_config(config),
        );
        tracing::info!(
            entity_recognizer = service.entities.is_available(),
            "Metadata engines initialized"
        );
        service
    }

    /// Extract, enrich, and assemble the record for one document.
    pub async fn build_metadata(&self, document: Document) -> Result<MetadataRecord, MetadataError> {
        let document_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "document",
            %document_id,
            file = %document.name(),
            media_type = %document.media_type()
        );
        self.run_pipeline(document).instrument(span).await
    }

    async fn run_pipeline(&self, document: Document) -> Result<MetadataRecord, MetadataError> {
        tracing::info!(size = document.original_size(), "Processing document");
        let file_info = FileInfo::describe(&document);

        let extraction_started = Instant::now();
        let extraction = self.extract(document).await;
        let extraction_seconds = extraction_started.elapsed().as_secs_f64();

        if extraction.text.is_empty() {
            self.metrics.record_extraction_failure();
            tracing::warn!("No text extracted; skipping enrichment");
            return Err(MetadataError::ExtractionFailure);
        }
        if extraction.method == ExtractionMethod::PdfOcr {
            self.metrics.record_ocr_fallback();
        }

        let content = ContentStats::measure(&extraction.text);
        tracing::debug!(
            method = ?extraction.method,
            characters = content.character_count,
            words = content.word_count,
            "Text extracted"
        );

        let enrichment_started = Instant::now();
        let generated = self.enrich(Arc::from(extraction.text)).await;
        let enrichment_seconds = enrichment_started.elapsed().as_secs_f64();

        if generated.summary.is_degraded() {
            self.metrics.record_degraded_summary();
        }
        self.metrics.record_document();

        let processing_stats = ProcessingStats::from_seconds(extraction_seconds, enrichment_seconds);
        tracing::info!(
            keywords = generated.keywords.len(),
            entity_categories = generated.named_entities.len(),
            summary_degraded = generated.summary.is_degraded(),
            total_s = processing_stats.total_time_s,
            "Metadata generated"
        );

        Ok(MetadataRecord {
            file_info,
            extracted_content: content,
            generated_metadata: generated,
            processing_stats,
        })
    }

    /// Run extraction on the blocking pool; a crashed worker counts as a failed extraction.
    async fn extract(&self, document: Document) -> Extraction {
        let extractor = Arc::clone(&self.extractor);
        match tokio::task::spawn_blocking(move || extractor.extract_detailed(&document)).await {
            Ok(extraction) => extraction,
            Err(error) => {
                tracing::error!(error = %error, "Extraction worker failed");
                Extraction {
                    text: String::new(),
                    method: ExtractionMethod::Failed,
                }
            }
        }
    }

    /// Run the three enrichment stages concurrently. Each one degrades on its own.
    async fn enrich(&self, text: Arc<str>) -> GeneratedMetadata {
        let keyword_task = {
            let keywords = self.keywords.clone();
            let text = Arc::clone(&text);
            tokio::task::spawn_blocking(move || keywords.extract_keywords(&text))
        };
        let entity_task = {
            let entities = self.entities.clone();
            let text = Arc::clone(&text);
            tokio::task::spawn_blocking(move || entities.extract_entities(&text))
        };

        let (summary, keywords, named_entities) =
            tokio::join!(self.summarizer.summarize(&text), keyword_task, entity_task);

        let keywords = keywords.unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Keyword worker failed");
            Vec::new()
        });
        let named_entities = named_entities.unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Entity worker failed");
            EntityMap::new()
        });

        GeneratedMetadata {
            summary,
            keywords,
            named_entities,
        }
    }

    /// Return a snapshot of the pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl MetadataApi for MetadataService {
    async fn build_metadata(&self, document: Document) -> Result<MetadataRecord, MetadataError> {
        MetadataService::build_metadata(self, document).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetadataService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use crate::entities::{EntityMention, EntityRecognizer, RecognitionError, RuleBasedRecognizer};
    use crate::extraction::{
        ExtractionError, OcrEngine, OcrPolicy, PdfPageRenderer, PdfTextLayer, UnavailableOcr,
        UnavailableRenderer,
    };
    use crate::keywords::YakeScorer;
    use crate::summarization::{
        EMPTY_INPUT_MESSAGE, MISSING_CREDENTIAL_MESSAGE, SummarizationClient, SummarizationError,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PRESS_RELEASE: &str = "Apple Inc. announced a new product line in Paris, France. \
        Tim Cook presented the product line to investors.";

    struct EmptyTextLayer;

    impl PdfTextLayer for EmptyTextLayer {
        fn page_texts(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
            Ok(vec![String::new(), String::new()])
        }
    }

    struct TwoPageRenderer;

    impl PdfPageRenderer for TwoPageRenderer {
        fn render_pages(
            &self,
            _pdf_bytes: &[u8],
            _dpi: u32,
            visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
        ) -> Result<usize, ExtractionError> {
            visit(0, Ok(vec![0]));
            visit(1, Ok(vec![1]));
            Ok(2)
        }
    }

    struct ScannedPageOcr;

    impl OcrEngine for ScannedPageOcr {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, ExtractionError> {
            Ok(format!("Scanned invoice page {} from Berlin.\n", image_bytes[0] + 1))
        }
    }

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SummarizationClient for CountingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, SummarizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("**Title:** Product launch".into())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl SummarizationClient for FailingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, SummarizationError> {
            Err(SummarizationError::Transport("connection refused".into()))
        }
    }

    struct PanickingRecognizer;

    impl EntityRecognizer for PanickingRecognizer {
        fn max_length(&self) -> usize {
            100
        }

        fn recognize(&self, _text: &str) -> Result<Vec<EntityMention>, RecognitionError> {
            panic!("recognizer crashed");
        }
    }

    fn offline_extractor() -> TextExtractor {
        TextExtractor::new(
            Arc::new(crate::extraction::LopdfTextLayer),
            Arc::new(UnavailableRenderer::new("test")),
            Arc::new(UnavailableOcr::new("test")),
            OcrPolicy::default(),
        )
    }

    fn service_with(
        extractor: TextExtractor,
        client: Option<Arc<dyn SummarizationClient>>,
        entities: EntityExtractor,
    ) -> MetadataService {
        MetadataService::new(
            extractor,
            Summarizer::new(client, 8000, Duration::from_secs(5)),
            KeywordExtractor::new(Arc::new(YakeScorer::default())),
            entities,
        )
    }

    fn rule_based_entities() -> EntityExtractor {
        EntityExtractor::new(Arc::new(RuleBasedRecognizer::new(1_000_000)))
    }

    fn text_document(text: &str) -> Document {
        Document::new("notes.txt", MediaType::PlainText, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn plain_text_record_is_complete() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(offline_extractor(), Some(client.clone()), rule_based_entities());

        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");

        assert_eq!(record.file_info.name, "notes.txt");
        assert_eq!(record.file_info.media_type, "text/plain");
        assert_eq!(
            record.extracted_content.word_count,
            PRESS_RELEASE.split_whitespace().count()
        );
        assert_eq!(record.extracted_content.character_count, PRESS_RELEASE.chars().count());
        assert_eq!(record.generated_metadata.summary.as_str(), "**Title:** Product launch");
        assert!(!record.generated_metadata.keywords.is_empty());
        assert!(record.generated_metadata.named_entities.get("ORG").is_some());
        assert!(record.generated_metadata.named_entities.get("GPE").is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let stats = record.processing_stats;
        assert!(stats.total_time_s >= stats.text_extraction_time_s);
        assert_eq!(service.metrics_snapshot().documents_processed, 1);
    }

    #[tokio::test]
    async fn empty_extraction_halts_before_enrichment() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(offline_extractor(), Some(client.clone()), rule_based_entities());

        let error = service
            .build_metadata(Document::new("empty.txt", MediaType::PlainText, Vec::new()))
            .await
            .expect_err("no text");

        assert!(matches!(error, MetadataError::ExtractionFailure));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.documents_processed, 0);
    }

    #[tokio::test]
    async fn unsupported_media_type_is_an_extraction_failure() {
        let service = service_with(offline_extractor(), None, rule_based_entities());
        let document = Document::new(
            "photo.png",
            MediaType::from_mime("image/png"),
            vec![0x89, b'P', b'N', b'G'],
        );
        assert!(matches!(
            service.build_metadata(document).await,
            Err(MetadataError::ExtractionFailure)
        ));
    }

    #[tokio::test]
    async fn degraded_summary_does_not_block_other_stages() {
        let service = service_with(
            offline_extractor(),
            Some(Arc::new(FailingClient)),
            rule_based_entities(),
        );
        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");

        assert!(record.generated_metadata.summary.is_degraded());
        assert!(!record.generated_metadata.keywords.is_empty());
        assert!(!record.generated_metadata.named_entities.is_empty());
        assert_eq!(service.metrics_snapshot().degraded_summaries, 1);
    }

    #[tokio::test]
    async fn missing_credential_still_produces_a_record() {
        let service = service_with(offline_extractor(), None, rule_based_entities());
        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");
        assert_eq!(
            record.generated_metadata.summary.as_str(),
            MISSING_CREDENTIAL_MESSAGE
        );
        assert_ne!(record.generated_metadata.summary.as_str(), EMPTY_INPUT_MESSAGE);
    }

    #[tokio::test]
    async fn crashed_entity_worker_yields_empty_map() {
        let service = service_with(
            offline_extractor(),
            None,
            EntityExtractor::new(Arc::new(PanickingRecognizer)),
        );
        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");
        assert!(record.generated_metadata.named_entities.is_empty());
        assert!(!record.generated_metadata.keywords.is_empty());
    }

    #[tokio::test]
    async fn unavailable_recognizer_surfaces_sentinel() {
        let service = service_with(offline_extractor(), None, EntityExtractor::unavailable("test"));
        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");
        assert!(record.generated_metadata.named_entities.is_unavailable());
    }

    #[tokio::test]
    async fn scanned_pdf_counts_an_ocr_fallback() {
        let extractor = TextExtractor::new(
            Arc::new(EmptyTextLayer),
            Arc::new(TwoPageRenderer),
            Arc::new(ScannedPageOcr),
            OcrPolicy::default(),
        );
        let service = service_with(extractor, None, rule_based_entities());
        let document = Document::new("scan.pdf", MediaType::Pdf, b"%PDF-1.4 scanned".to_vec());

        let record = service.build_metadata(document).await.expect("record");

        assert_eq!(record.extracted_content.word_count, 12);
        assert_eq!(
            record.generated_metadata.named_entities.get("GPE"),
            Some(&["Berlin".to_string()][..])
        );
        assert_eq!(service.metrics_snapshot().ocr_fallbacks, 1);
    }

    #[tokio::test]
    async fn record_serializes_to_public_shape() {
        let service = service_with(offline_extractor(), None, rule_based_entities());
        let record = service
            .build_metadata(text_document(PRESS_RELEASE))
            .await
            .expect("record");
        let json = serde_json::to_value(&record).expect("json");

        for key in ["fileInfo", "extractedContent", "generatedMetadata", "processingStats"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["fileInfo"]["sizeKB"].is_number());
        assert!(json["extractedContent"]["characterCount"].is_number());
        assert!(json["generatedMetadata"]["summary"].is_string());
        assert!(json["generatedMetadata"]["keywords"].is_array());
        assert!(json["generatedMetadata"]["namedEntities"].is_object());
        assert!(json["processingStats"]["nlpProcessingTime_s"].is_number());
    }
}
