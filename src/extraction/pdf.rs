//! PDF text-layer reading and page rasterization.
//!
//! The text layer comes from lopdf, which is pure Rust and always available. Rasterization
//! for OCR goes through PDFium, bound dynamically at runtime. Each render pass loads the
//! library and document once, and both are released when the pass returns.

use std::io::Cursor;

use image::ImageOutputFormat;
use lopdf::Document as LopdfDocument;
use pdfium_render::prelude::*;

use super::ExtractionError;

/// Largest width or height, in pixels, of a rendered page.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Reads the embedded text layer of a PDF, one entry per page in page order.
pub trait PdfTextLayer: Send + Sync {
    /// Return the text of every page. Pages that cannot be decoded yield an empty string so
    /// one bad page does not sink the document.
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Rasterizes PDF pages to PNG images for OCR.
pub trait PdfPageRenderer: Send + Sync {
    /// Render every page at `dpi`, handing each page index and its PNG (or the per-page
    /// failure) to `visit` in page order. Returns the number of pages visited.
    fn render_pages(
        &self,
        pdf_bytes: &[u8],
        dpi: u32,
        visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) -> Result<usize, ExtractionError>;
}

/// Text-layer reader backed by lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextLayer;

impl PdfTextLayer for LopdfTextLayer {
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let mut document = LopdfDocument::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(format!("failed to load PDF: {e}")))?;

        // Owner-password-only PDFs open with an empty user password.
        if document.is_encrypted() && document.decrypt("").is_err() {
            return Err(ExtractionError::PdfEncrypted);
        }

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        Ok(texts_by_page(&page_numbers, |page_number| {
            document.extract_text(&[page_number])
        }))
    }
}

/// Extract each page independently; a page that fails contributes empty text.
fn texts_by_page<E: std::fmt::Display>(
    page_numbers: &[u32],
    mut extract: impl FnMut(u32) -> Result<String, E>,
) -> Vec<String> {
    page_numbers
        .iter()
        .map(|&page_number| match extract(page_number) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(page = page_number, error = %error, "Unreadable PDF page skipped");
                String::new()
            }
        })
        .collect()
}

/// Page renderer backed by Google PDFium.
///
/// Stateless: the library handle is bound per render pass because the upstream `Pdfium`
/// type is not `Send`. Repeat binds hit the OS library cache.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, failing fast when the PDFium library cannot be found.
    ///
    /// Lookup order: `PDFIUM_DYNAMIC_LIB_PATH`, the executable's directory, then the system
    /// library path.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        tracing::debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::RendererUnavailable(format!("failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            tracing::debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::RendererUnavailable(format!(
            "PDFium library not found; set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Pixel dimensions for a page rendered at `dpi`, capped at [`MAX_DIMENSION_PX`] while
/// preserving the aspect ratio.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

fn render_page_png(page: &PdfPage, index: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let (target_w, target_h) = compute_render_dimensions(page.width().value, page.height().value, dpi);
    let config = PdfRenderConfig::new()
        .set_target_width(target_w as i32)
        .set_maximum_height(target_h as i32);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ExtractionError::PdfRendering {
            page: index + 1,
            reason: e.to_string(),
        })?;

    let mut cursor = Cursor::new(Vec::new());
    bitmap
        .as_image()
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

    let png = cursor.into_inner();
    tracing::debug!(
        page = index + 1,
        width = target_w,
        height = target_h,
        png_size = png.len(),
        "Rendered PDF page"
    );
    Ok(png)
}

impl PdfPageRenderer for PdfiumRenderer {
    fn render_pages(
        &self,
        pdf_bytes: &[u8],
        dpi: u32,
        visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| {
                let message = e.to_string();
                if message.to_lowercase().contains("password") {
                    ExtractionError::PdfEncrypted
                } else {
                    ExtractionError::PdfParsing(format!("failed to load PDF: {message}"))
                }
            })?;

        let mut visited = 0;
        for (index, page) in document.pages().iter().enumerate() {
            visit(index, render_page_png(&page, index, dpi));
            visited += 1;
        }
        Ok(visited)
    }
}

/// Stand-in used when PDFium could not be loaded at startup; every render pass fails.
#[derive(Debug, Clone)]
pub struct UnavailableRenderer {
    reason: String,
}

impl UnavailableRenderer {
    /// Record why the real renderer is missing.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PdfPageRenderer for UnavailableRenderer {
    fn render_pages(
        &self,
        _pdf_bytes: &[u8],
        _dpi: u32,
        _visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) -> Result<usize, ExtractionError> {
        Err(ExtractionError::RendererUnavailable(self.reason.clone()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_layer_reads_pages_in_order() {
        let pdf = fixtures::text_pdf(&["Quarterly revenue grew", "Second page closes"]);
        let pages = LopdfTextLayer.page_texts(&pdf).expect("pages");
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Quarterly"), "got: {:?}", pages[0]);
        assert!(pages[1].contains("Second"), "got: {:?}", pages[1]);
    }

    #[test]
    fn undecodable_page_is_skipped_and_the_rest_kept() {
        let texts = texts_by_page(&[1, 2, 3], |page| match page {
            2 => Err("bad content stream"),
            other => Ok(format!("page {other}")),
        });
        assert_eq!(texts, vec!["page 1", "", "page 3"]);
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let error = LopdfTextLayer.page_texts(b"not a pdf").expect_err("invalid");
        assert!(matches!(error, ExtractionError::PdfParsing(_)));
    }

    #[test]
    fn letter_page_at_300_dpi() {
        let (w, h) = compute_render_dimensions(612.0, 792.0, 300);
        assert!((2545..=2550).contains(&w), "letter width at 300dpi: got {w}");
        assert!((3295..=3300).contains(&h), "letter height at 300dpi: got {h}");
    }

    #[test]
    fn oversized_pages_are_capped() {
        let (w, h) = compute_render_dimensions(5000.0, 7000.0, 300);
        assert_eq!(h, MAX_DIMENSION_PX);
        assert!(w < MAX_DIMENSION_PX);
        let ratio = w as f32 / h as f32;
        assert!((ratio - 5000.0 / 7000.0).abs() < 0.01);
    }

    #[test]
    fn unavailable_renderer_reports_reason() {
        let renderer = UnavailableRenderer::new("no pdfium");
        let error = renderer
            .render_pages(b"%PDF", 300, &mut |_, _| {})
            .expect_err("unavailable");
        assert!(matches!(error, ExtractionError::RendererUnavailable(reason) if reason == "no pdfium"));
    }
}
