use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Placeholder value shipped in sample `.env` files; treated the same as a missing key.
pub const API_KEY_PLACEHOLDER: &str = "PASTE_YOUR_GOOGLE_AI_STUDIO_API_KEY_HERE";

const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the metadata pipeline and its outer surfaces.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential for the remote summarization service. `None` puts the summarizer in
    /// configuration-error mode.
    pub gemini_api_key: Option<String>,
    /// Base URL of the text-generation service.
    pub gemini_api_url: String,
    /// Model identifier used for summarization.
    pub gemini_model: String,
    /// Upper bound on the single remote summarization call.
    pub summary_timeout_secs: u64,
    /// Number of leading characters submitted for summarization.
    pub summary_max_chars: usize,
    /// Trimmed text-layer length below which a PDF is treated as scanned.
    pub ocr_min_text_chars: usize,
    /// Rasterization resolution for OCR.
    pub ocr_dpi: u32,
    /// Tesseract language specification (e.g. `eng`, `eng+fra`).
    pub ocr_language: String,
    /// Optional directory holding Tesseract `*.traineddata` files.
    pub tessdata_dir: Option<PathBuf>,
    /// Maximum number of keywords returned per document.
    pub keyword_top_n: usize,
    /// Longest keyword phrase, in words.
    pub keyword_max_ngram: usize,
    /// Maximum number of characters handed to the entity recognizer.
    pub ner_max_length: usize,
    /// Optional gazetteer file extending the built-in entity lists.
    pub ner_gazetteer_path: Option<PathBuf>,
    /// Largest accepted upload on the HTTP surface.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gemini_api_key: load_env_optional("GEMINI_API_KEY")
                .filter(|key| key != API_KEY_PLACEHOLDER),
            gemini_api_url: load_env_optional("GEMINI_API_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_URL.to_string()),
            gemini_model: load_env_optional("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            summary_timeout_secs: load_parsed("SUMMARY_TIMEOUT_SECS")?.unwrap_or(60),
            summary_max_chars: load_parsed("SUMMARY_MAX_CHARS")?.unwrap_or(8000),
            ocr_min_text_chars: load_parsed("OCR_MIN_TEXT_CHARS")?.unwrap_or(100),
            ocr_dpi: load_parsed("OCR_DPI")?.unwrap_or(300),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or_else(|| "eng".into()),
            tessdata_dir: load_env_optional("TESSDATA_DIR").map(PathBuf::from),
            keyword_top_n: load_parsed("KEYWORD_TOP_N")?.unwrap_or(20),
            keyword_max_ngram: load_parsed("KEYWORD_MAX_NGRAM")?.unwrap_or(3),
            ner_max_length: load_parsed("NER_MAX_LENGTH")?.unwrap_or(1_000_000),
            ner_gazetteer_path: load_env_optional("NER_GAZETTEER_PATH").map(PathBuf::from),
            max_upload_bytes: load_parsed("MAX_UPLOAD_BYTES")?.unwrap_or(25 * 1024 * 1024),
            server_port: load_parsed("SERVER_PORT")?,
        })
    }

    /// Timeout applied to the remote summarization call.
    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            summary_timeout_secs: 60,
            summary_max_chars: 8000,
            ocr_min_text_chars: 100,
            ocr_dpi: 300,
            ocr_language: "eng".into(),
            tessdata_dir: None,
            keyword_top_n: 20,
            keyword_max_ngram: 3,
            ner_max_length: 1_000_000,
            ner_gazetteer_path: None,
            max_upload_bytes: 25 * 1024 * 1024,
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        gemini_api_url = %config.gemini_api_url,
        gemini_model = %config.gemini_model,
        credential_present = config.gemini_api_key.is_some(),
        ocr_min_text_chars = config.ocr_min_text_chars,
        ocr_dpi = config.ocr_dpi,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
