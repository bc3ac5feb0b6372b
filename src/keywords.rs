//! Unsupervised keyword extraction.
//!
//! [`YakeScorer`] adapts the `yake-rust` engine: every term gets a weight from its casing,
//! position, frequency, context dispersion, and sentence spread, and candidate phrases of up
//! to `max_ngram` words combine those weights. Lower scores are more relevant.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use thiserror::Error;
use yake_rust::{StopWords, get_n_best};

use crate::config::Config;

const STOPWORD_LANGUAGE: &str = "en";

/// Errors raised by a keyword scoring engine.
#[derive(Debug, Error)]
pub enum KeywordError {
    /// Scorer was configured with unusable parameters.
    #[error("invalid keyword parameters: {0}")]
    InvalidParameters(String),
    /// Engine failed while scoring.
    #[error("keyword engine failure: {0}")]
    Engine(String),
}

/// A candidate phrase and its relevance score (lower is better).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKeyword {
    /// Phrase as it appears in the text.
    pub phrase: String,
    /// Relevance score; lower means more relevant.
    pub score: f64,
}

/// Statistical keyword scoring engine.
pub trait KeywordScorer: Send + Sync {
    /// Score candidate phrases, returning them in ascending score order.
    fn score(&self, text: &str) -> Result<Vec<ScoredKeyword>, KeywordError>;
}

/// Produces ranked keyword lists, swallowing engine failures.
#[derive(Clone)]
pub struct KeywordExtractor {
    scorer: Arc<dyn KeywordScorer>,
}

impl KeywordExtractor {
    /// Wrap an explicit scoring engine.
    pub fn new(scorer: Arc<dyn KeywordScorer>) -> Self {
        Self { scorer }
    }

    /// Build the YAKE-backed extractor from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(YakeScorer::new(
            config.keyword_top_n,
            config.keyword_max_ngram,
        )))
    }

    /// Extract keywords best-first. Empty input or engine failure yields an empty list.
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.scorer.score(text) {
            Ok(scored) => scored.into_iter().map(|keyword| keyword.phrase).collect(),
            Err(error) => {
                tracing::warn!(error = %error, "Keyword extraction degraded");
                Vec::new()
            }
        }
    }
}

/// YAKE keyword scorer over English text.
pub struct YakeScorer {
    top_n: usize,
    max_ngram: usize,
    stop_words: Option<StopWords>,
}

impl YakeScorer {
    /// Return at most `top_n` phrases of up to `max_ngram` words.
    pub fn new(top_n: usize, max_ngram: usize) -> Self {
        let stop_words = StopWords::predefined(STOPWORD_LANGUAGE);
        if stop_words.is_none() {
            tracing::warn!(language = STOPWORD_LANGUAGE, "YAKE stopword list missing");
        }
        Self {
            top_n,
            max_ngram,
            stop_words,
        }
    }
}

impl Default for YakeScorer {
    fn default() -> Self {
        Self::new(20, 3)
    }
}

impl KeywordScorer for YakeScorer {
    fn score(&self, text: &str) -> Result<Vec<ScoredKeyword>, KeywordError> {
        if self.max_ngram == 0 {
            return Err(KeywordError::InvalidParameters(
                "max_ngram must be at least 1".into(),
            ));
        }
        if self.top_n == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stop_words = self.stop_words.as_ref().ok_or_else(|| {
            KeywordError::Engine(format!("no stopword list for `{STOPWORD_LANGUAGE}`"))
        })?;

        let config = yake_rust::Config {
            ngrams: self.max_ngram,
            ..yake_rust::Config::default()
        };
        let results = catch_unwind(AssertUnwindSafe(|| {
            get_n_best(self.top_n, text, stop_words, &config)
        }))
        .map_err(|_| KeywordError::Engine("YAKE panicked while scoring".into()))?;

        let mut scored: Vec<ScoredKeyword> = results
            .into_iter()
            .map(|item| ScoredKeyword {
                phrase: item.raw,
                score: item.score,
            })
            .collect();
        if scored.iter().any(|keyword| !keyword.score.is_finite()) {
            return Err(KeywordError::Engine("non-finite phrase score".into()));
        }
        scored.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(scored)
    }
}
