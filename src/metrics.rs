use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    extraction_failures: AtomicU64,
    ocr_fallbacks: AtomicU64,
    degraded_summaries: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that produced a metadata record.
    pub fn record_document(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document whose text could not be extracted.
    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a PDF whose text came from OCR.
    pub fn record_ocr_fallback(&self) {
        self.ocr_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a summary replaced by a placeholder.
    pub fn record_degraded_summary(&self) {
        self.degraded_summaries.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            ocr_fallbacks: self.ocr_fallbacks.load(Ordering::Relaxed),
            degraded_summaries: self.degraded_summaries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that produced a metadata record since startup.
    pub documents_processed: u64,
    /// Documents rejected because no text could be extracted.
    pub extraction_failures: u64,
    /// PDFs whose text layer was replaced by OCR output.
    pub ocr_fallbacks: u64,
    /// Records whose summary is a placeholder.
    pub degraded_summaries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = PipelineMetrics::new();
        metrics.record_document();
        metrics.record_document();
        metrics.record_ocr_fallback();
        metrics.record_extraction_failure();
        metrics.record_degraded_summary();
        metrics.record_degraded_summary();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.ocr_fallbacks, 1);
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.degraded_summaries, 2);
    }

    #[test]
    fn fresh_snapshot_is_zeroed() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
