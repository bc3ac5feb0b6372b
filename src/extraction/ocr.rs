//! Optical character recognition over rendered page images.
//!
//! Tesseract backs the engine when the `ocr` feature is enabled; otherwise the factory
//! returns a stand-in that reports why recognition is unavailable.

#[cfg(feature = "ocr")]
use std::path::PathBuf;
use std::sync::Arc;

use super::ExtractionError;
use crate::config::Config;

/// Recognizes text in a rasterized page image.
pub trait OcrEngine: Send + Sync {
    /// Run recognition over PNG-encoded image bytes.
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Tesseract OCR engine. Only available when compiled with the `ocr` feature.
#[cfg(feature = "ocr")]
pub struct TesseractOcr {
    tessdata_dir: Option<PathBuf>,
    language: String,
}

#[cfg(feature = "ocr")]
impl TesseractOcr {
    /// Initialize the engine once to verify that the language data can be loaded.
    pub fn new(tessdata_dir: Option<PathBuf>, language: &str) -> Result<Self, ExtractionError> {
        let engine = Self {
            tessdata_dir,
            language: language.to_string(),
        };
        engine.init()?;
        tracing::info!(language, "Tesseract OCR ready");
        Ok(engine)
    }

    fn init(&self) -> Result<tesseract::Tesseract, ExtractionError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrUnavailable("invalid tessdata path".into()))?,
            ),
            None => None,
        };
        tesseract::Tesseract::new(datapath, Some(&self.language))
            .map_err(|e| ExtractionError::OcrUnavailable(format!("{e:?}")))
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut tess = self
            .init()?
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        tess.get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))
    }
}

/// Stand-in used when no OCR engine could be initialized; every call fails.
#[derive(Debug, Clone)]
pub struct UnavailableOcr {
    reason: String,
}

impl UnavailableOcr {
    /// Record why OCR is unavailable.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableOcr {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, ExtractionError> {
        Err(ExtractionError::OcrUnavailable(self.reason.clone()))
    }
}

/// Build the OCR engine described by configuration.
#[cfg(feature = "ocr")]
pub fn build_ocr_engine(config: &Config) -> Result<Arc<dyn OcrEngine>, ExtractionError> {
    let engine = TesseractOcr::new(config.tessdata_dir.clone(), &config.ocr_language)?;
    Ok(Arc::new(engine))
}

/// Build the OCR engine described by configuration.
#[cfg(not(feature = "ocr"))]
pub fn build_ocr_engine(_config: &Config) -> Result<Arc<dyn OcrEngine>, ExtractionError> {
    Err(ExtractionError::OcrUnavailable(
        "built without the `ocr` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_engine_always_fails() {
        let engine = UnavailableOcr::new("tessdata missing");
        let error = engine.recognize(&[0x89, b'P', b'N', b'G']).expect_err("unavailable");
        assert!(matches!(error, ExtractionError::OcrUnavailable(reason) if reason == "tessdata missing"));
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn default_build_has_no_ocr_engine() {
        assert!(build_ocr_engine(&Config::default()).is_err());
    }
}
