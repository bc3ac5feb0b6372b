//! Paragraph reader for DOCX (Office Open XML) documents.
//!
//! Only top-level body paragraphs are returned, in document order. Paragraphs nested in
//! tables, text boxes or content controls (`<w:sdt>`) are skipped. A paragraph's text is the concatenation of its runs,
//! with `<w:tab/>` rendered as `\t` and `<w:br/>`/`<w:cr/>` as `\n`.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::ExtractionError;

const MAIN_PART: &str = "word/document.xml";

/// Read every body paragraph of a DOCX payload.
pub fn read_paragraphs(bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::DocxParsing(format!("not a DOCX archive: {e}")))?;
    let mut part = archive
        .by_name(MAIN_PART)
        .map_err(|e| ExtractionError::DocxParsing(format!("missing {MAIN_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    parse_paragraphs(&xml)
}

#[derive(Default)]
struct ParagraphState {
    paragraphs: Vec<String>,
    current: Option<String>,
    table_depth: usize,
    sdt_depth: usize,
    paragraph_depth: usize,
    run_depth: usize,
    in_text: bool,
}

impl ParagraphState {
    /// Text is only collected from runs directly inside a top-level paragraph.
    fn collecting(&self) -> bool {
        self.current.is_some() && self.paragraph_depth == 1 && self.run_depth == 1 && self.sdt_depth == 0
    }

    fn push_str(&mut self, text: &str) {
        if self.collecting() {
            if let Some(current) = self.current.as_mut() {
                current.push_str(text);
            }
        }
    }

    fn at_body_level(&self) -> bool {
        self.table_depth == 0 && self.sdt_depth == 0 && self.paragraph_depth == 0
    }

    fn open_paragraph(&mut self) {
        if self.at_body_level() {
            self.current = Some(String::new());
        }
        self.paragraph_depth += 1;
    }

    fn close_paragraph(&mut self) {
        self.paragraph_depth = self.paragraph_depth.saturating_sub(1);
        if self.paragraph_depth == 0 {
            if let Some(text) = self.current.take() {
                self.paragraphs.push(text);
            }
        }
    }
}

fn parse_paragraphs(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut state = ParagraphState::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractionError::DocxParsing(format!("malformed document XML: {e}")))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"w:tbl" => state.table_depth += 1,
                b"w:sdt" => state.sdt_depth += 1,
                b"w:p" => state.open_paragraph(),
                b"w:r" => state.run_depth += 1,
                b"w:t" => state.in_text = true,
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"w:p" if state.at_body_level() => {
                    state.paragraphs.push(String::new());
                }
                b"w:tab" => state.push_str("\t"),
                b"w:br" | b"w:cr" => state.push_str("\n"),
                _ => {}
            },
            Event::End(ref e) => match e.name().as_ref() {
                b"w:tbl" => state.table_depth = state.table_depth.saturating_sub(1),
                b"w:sdt" => state.sdt_depth = state.sdt_depth.saturating_sub(1),
                b"w:p" => state.close_paragraph(),
                b"w:r" => state.run_depth = state.run_depth.saturating_sub(1),
                b"w:t" => state.in_text = false,
                _ => {}
            },
            Event::Text(ref text) if state.in_text => {
                let decoded = text.unescape().map_err(|e| {
                    ExtractionError::DocxParsing(format!("invalid text escape: {e}"))
                })?;
                state.push_str(&decoded);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(state.paragraphs)
}
