//! Text extraction for uploaded documents.
//!
//! The entry point is [`extract_text`], which takes the raw upload bytes, the
//! declared content type and the original filename, and returns plain UTF-8
//! text together with [`ExtractionMetadata`].
//!
//! # Supported types
//!
//! | Content type | Strategy |
//! |--------------|----------|
//! | `text/plain`, `text/markdown`, `text/csv`, `application/json` | UTF-8 decode, Latin-1 fallback |
//! | `text/html` | text nodes joined by spaces, `<script>`/`<style>` removed |
//! | PDF | page by page, newline-joined |
//! | DOCX | one paragraph per line, table rows as `cell | cell` |
//! | XLSX / XLS | `=== Sheet: name ===` then one `a | b` line per non-empty row |
//! | PPTX | `=== Slide N ===` then one line per non-empty shape |
//! | DOC / PPT | fixed placeholder |
//!
//! # Failure model
//!
//! An unsupported type is reported through the metadata (`extraction_success
//! = false`, `error = "Unsupported file type: ..."`) with empty text. A parser
//! failure for a supported type never fails the upload: the text becomes a
//! bracketed placeholder naming the format, e.g.
//! `[Word document - extraction failed]`.
//!
//! When the declared type is empty or `application/octet-stream`, the type is
//! inferred from the filename extension and then from signature bytes
//! (`%PDF`, or a ZIP container classified by its entries).

use calamine::Reader;
use serde::Serialize;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{info, warn};

pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_JSON: &str = "application/json";
pub const MIME_HTML: &str = "text/html";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum rows to flatten per spreadsheet sheet.
const MAX_ROWS_PER_SHEET: usize = 100_000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
}

/// Description of one extraction run. Serialized into the chunk metadata of
/// the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionMetadata {
    pub content_type: String,
    pub filename: String,
    pub character_count: usize,
    pub word_count: usize,
    pub extraction_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    pub fn is_success(&self) -> bool {
        self.metadata.extraction_success
    }
}

/// Extract plain text from uploaded bytes. Never fails; see the module docs
/// for how unsupported and broken inputs are reported.
pub fn extract_text(bytes: &[u8], content_type: &str, filename: &str) -> Extraction {
    let mut resolved = normalize_content_type(content_type);
    if resolved.is_empty() || resolved == "application/octet-stream" {
        if let Some(detected) = detect_content_type(bytes, filename) {
            info!(filename, content_type = %detected, "Auto-detected content type");
            resolved = detected;
        }
    }

    let text = match resolved.as_str() {
        MIME_PLAIN | MIME_MARKDOWN | MIME_CSV | MIME_JSON => decode_plain(bytes),
        MIME_HTML => extract_html(bytes),
        MIME_PDF => with_placeholder(
            extract_pdf(bytes),
            "[PDF content - extraction failed]",
            "[PDF content - text extraction not available or document contains only images]",
        ),
        MIME_DOCX => with_placeholder(
            extract_docx(bytes),
            "[Word document - extraction failed]",
            "[Word document - no text content found]",
        ),
        MIME_XLSX => with_placeholder(
            extract_spreadsheet(bytes),
            "[Excel spreadsheet - extraction failed]",
            "[Excel spreadsheet - no cell content found]",
        ),
        MIME_XLS => with_placeholder(
            extract_spreadsheet(bytes),
            "[Legacy Excel file - extraction failed]",
            "[Legacy Excel file (.xls) - no cell content found, convert to .xlsx]",
        ),
        MIME_PPTX => with_placeholder(
            extract_pptx(bytes),
            "[PowerPoint presentation - extraction failed]",
            "[PowerPoint presentation - no slide text found]",
        ),
        MIME_DOC => {
            "[Legacy Word document (.doc) - conversion to .docx recommended for text extraction]"
                .to_string()
        }
        MIME_PPT => {
            "[Legacy PowerPoint file (.ppt) - conversion to .pptx recommended for text extraction]"
                .to_string()
        }
        other => {
            warn!(filename, content_type = other, "Unsupported content type");
            return Extraction {
                text: String::new(),
                metadata: ExtractionMetadata {
                    content_type: other.to_string(),
                    filename: filename.to_string(),
                    character_count: 0,
                    word_count: 0,
                    extraction_success: false,
                    error: Some(format!("Unsupported file type: {}", other)),
                },
            };
        }
    };

    let metadata = ExtractionMetadata {
        content_type: resolved,
        filename: filename.to_string(),
        character_count: text.chars().count(),
        word_count: text.split_whitespace().count(),
        extraction_success: true,
        error: None,
    };
    info!(
        filename,
        characters = metadata.character_count,
        "Extracted document text"
    );
    Extraction { text, metadata }
}

/// Lowercase the type and drop any `;`-parameters.
fn normalize_content_type(content_type: &str) -> String {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "text/x-markdown" => MIME_MARKDOWN.to_string(),
        "application/x-pdf" => MIME_PDF.to_string(),
        _ => base,
    }
}

/// Infer a content type from the filename extension, then from signature bytes.
pub fn detect_content_type(bytes: &[u8], filename: &str) -> Option<String> {
    if !filename.is_empty() {
        if let Some(mime) = mime_guess::from_path(filename).first() {
            if mime.essence_str() != "application/octet-stream" {
                return Some(normalize_content_type(mime.essence_str()));
            }
        }
    }

    if bytes.starts_with(b"%PDF") {
        return Some(MIME_PDF.to_string());
    }
    if bytes.starts_with(b"PK") {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
        let mut names = archive.file_names();
        let kind = names.find_map(|name| {
            if name.starts_with("word/") {
                Some(MIME_DOCX)
            } else if name.starts_with("xl/") {
                Some(MIME_XLSX)
            } else if name.starts_with("ppt/") {
                Some(MIME_PPTX)
            } else {
                None
            }
        });
        return kind.map(str::to_string);
    }
    None
}

fn with_placeholder(
    result: Result<String, ExtractError>,
    on_error: &str,
    on_empty: &str,
) -> String {
    match result {
        Ok(text) if text.trim().is_empty() => on_empty.to_string(),
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Format extraction failed, using placeholder");
            on_error.to_string()
        }
    }
}

fn decode_plain(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn extract_html(bytes: &[u8]) -> String {
    let html = String::from_utf8_lossy(bytes);
    let document = scraper::Html::parse_document(&html);
    let mut parts: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style"))
                .unwrap_or(false)
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.join("\n"))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    docx_lines(&xml)
}

/// Body paragraphs first, then table rows, one per line.
fn docx_lines(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut rows: Vec<String> = Vec::new();

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut table_depth = 0usize;
    let mut in_t = false;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"tr" if table_depth > 0 => row.clear(),
                b"tc" if table_depth > 0 => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if table_depth > 0 {
                        if !cell.is_empty() && !paragraph.is_empty() {
                            cell.push('\n');
                        }
                        cell.push_str(&paragraph);
                    } else if !paragraph.trim().is_empty() {
                        paragraphs.push(paragraph.clone());
                    }
                    paragraph.clear();
                }
                b"tc" if table_depth > 0 => {
                    if !cell.trim().is_empty() {
                        row.push(cell.clone());
                    }
                }
                b"tr" if table_depth > 0 => {
                    if !row.is_empty() {
                        rows.push(row.join(" | "));
                    }
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    paragraphs.extend(rows);
    Ok(paragraphs.join("\n"))
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut lines: Vec<String> = Vec::new();
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        lines.push(format!("=== Slide {} ===", idx + 1));
        lines.extend(slide_shape_texts(&xml)?);
    }
    Ok(lines.join("\n"))
}

/// Text of each shape on a slide; paragraphs within a shape are newline-joined.
fn slide_shape_texts(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut shapes = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut shape_depth = 0usize;
    let mut in_t = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut paragraph = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => {
                    if shape_depth == 0 {
                        paragraphs.clear();
                    }
                    shape_depth += 1;
                }
                b"p" if shape_depth > 0 => paragraph.clear(),
                b"t" if shape_depth > 0 => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" if shape_depth > 0 => paragraphs.push(std::mem::take(&mut paragraph)),
                b"sp" if shape_depth > 0 => {
                    shape_depth -= 1;
                    if shape_depth == 0 {
                        let text = paragraphs.join("\n");
                        if !text.trim().is_empty() {
                            shapes.push(text);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}

fn extract_spreadsheet(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let mut lines = Vec::new();
    for name in workbook.sheet_names() {
        lines.push(format!("=== Sheet: {} ===", name));
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;
        for row in range.rows().take(MAX_ROWS_PER_SHEET) {
            let cells: Vec<String> = row
                .iter()
                .map(cell_to_string)
                .filter(|c| !c.trim().is_empty())
                .collect();
            if !cells.is_empty() {
                lines.push(cells.join(" | "));
            }
        }
    }
    Ok(lines.join("\n"))
}

fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data as D;
    match cell {
        D::Empty => String::new(),
        D::String(s) => s.clone(),
        D::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        D::Int(i) => i.to_string(),
        D::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
