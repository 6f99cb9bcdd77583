//! Multi-format extraction: PDF and OOXML fixtures built in memory, content
//! type detection, and ingestion of the extracted text.

use std::io::Write;
use std::sync::Arc;

use docdesk::embedding::EmbeddingClient;
use docdesk::extract::{detect_content_type, extract_text, MIME_DOCX, MIME_PDF, MIME_PPTX};
use docdesk::ingest::Ingestor;
use docdesk::models::DocumentStatus;
use docdesk::store::memory::InMemoryStore;
use docdesk::store::{ChunkStore, RecordStore};

/// Minimal valid PDF containing the text "memo test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 44 >> stream\nBT /F1 12 Tf 100 700 Td (memo test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn zip_of(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";

fn docx_fixture() -> Vec<u8> {
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"{W_NS}\"><w:body>\
         <w:p><w:r><w:t>Project kickoff</w:t></w:r></w:p>\
         <w:p><w:r><w:t xml:space=\"preserve\">Owner: </w:t></w:r><w:r><w:t>Ada</w:t></w:r></w:p>\
         <w:tbl><w:tr>\
         <w:tc><w:p><w:r><w:t>Milestone</w:t></w:r></w:p></w:tc>\
         <w:tc><w:p><w:r><w:t>Date</w:t></w:r></w:p></w:tc>\
         </w:tr></w:tbl>\
         </w:body></w:document>"
    );
    zip_of(&[("word/document.xml", xml)])
}

fn slide(texts: &[&str]) -> String {
    let shapes: String = texts
        .iter()
        .map(|t| {
            format!("<p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>", t)
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?><p:sld xmlns:p=\"{P_NS}\" xmlns:a=\"{A_NS}\">\
         <p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"
    )
}

fn pptx_fixture() -> Vec<u8> {
    // Slide 10 sorts after slide 2 numerically.
    zip_of(&[
        ("ppt/slides/slide10.xml", slide(&["Closing"])),
        ("ppt/slides/slide1.xml", slide(&["Roadmap", "Q3 goals"])),
        ("ppt/slides/slide2.xml", slide(&["Budget"])),
    ])
}

#[test]
fn pdf_text_is_extracted() {
    let extraction = extract_text(&minimal_pdf_with_phrase(), MIME_PDF, "memo.pdf");
    assert!(extraction.is_success());
    assert!(
        extraction.text.contains("memo test phrase"),
        "got: {:?}",
        extraction.text
    );
}

#[test]
fn corrupt_pdf_yields_placeholder_not_error() {
    let extraction = extract_text(b"%PDF-1.4\nthis is not a pdf", MIME_PDF, "broken.pdf");
    assert!(extraction.is_success());
    assert!(extraction.text.starts_with("[PDF content"));
}

#[test]
fn docx_paragraphs_then_table_rows() {
    let extraction = extract_text(&docx_fixture(), MIME_DOCX, "kickoff.docx");
    assert!(extraction.is_success());
    assert_eq!(
        extraction.text,
        "Project kickoff\nOwner: Ada\nMilestone | Date"
    );
    assert_eq!(extraction.metadata.word_count, 7);
}

#[test]
fn pptx_slides_are_numbered_in_order() {
    let extraction = extract_text(&pptx_fixture(), MIME_PPTX, "deck.pptx");
    assert_eq!(
        extraction.text,
        "=== Slide 1 ===\nRoadmap\nQ3 goals\n=== Slide 2 ===\nBudget\n=== Slide 3 ===\nClosing"
    );
}

#[test]
fn extraction_is_deterministic() {
    let bytes = docx_fixture();
    let first = extract_text(&bytes, MIME_DOCX, "kickoff.docx");
    let second = extract_text(&bytes, MIME_DOCX, "kickoff.docx");
    assert_eq!(first.text, second.text);
    assert_eq!(first.metadata.character_count, second.metadata.character_count);
}

#[test]
fn octet_stream_is_detected_from_content() {
    assert_eq!(
        detect_content_type(&docx_fixture(), "").as_deref(),
        Some(MIME_DOCX)
    );
    assert_eq!(
        detect_content_type(&pptx_fixture(), "").as_deref(),
        Some(MIME_PPTX)
    );
    assert_eq!(
        detect_content_type(&minimal_pdf_with_phrase(), "").as_deref(),
        Some(MIME_PDF)
    );

    let extraction = extract_text(&docx_fixture(), "application/octet-stream", "upload.bin");
    assert_eq!(extraction.metadata.content_type, MIME_DOCX);
    assert!(extraction.text.starts_with("Project kickoff"));
}

#[test]
fn legacy_office_formats_get_placeholders() {
    let extraction = extract_text(b"\xD0\xCF\x11\xE0", "application/msword", "old.doc");
    assert!(extraction.is_success());
    assert!(extraction.text.contains(".doc"));
}

#[tokio::test]
async fn uploaded_docx_is_searchable() {
    let store = Arc::new(InMemoryStore::new());
    let ingestor = Ingestor::new(
        store.clone(),
        store.clone(),
        EmbeddingClient::disabled(4),
        Default::default(),
    );
    let user = store.create_user("ada@example.com", "Ada").await.unwrap();

    let outcome = ingestor
        .upload(&user.id, "kickoff.docx", "", &docx_fixture())
        .await
        .unwrap();
    assert_eq!(outcome.document.status, DocumentStatus::Completed);
    assert_eq!(outcome.document.file_type, MIME_DOCX);

    let hits = store.text_search("milestone", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_title, "kickoff.docx");
    assert_eq!(
        hits[0].metadata["extraction_metadata"]["content_type"],
        MIME_DOCX
    );
}
