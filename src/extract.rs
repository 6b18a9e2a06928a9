//! Per-file text extraction for uploaded documents.
//!
//! Dispatches on the file extension: PDF via `pdf-extract`, DOCX via
//! `zip` + `quick-xml`, plain text read as UTF-8. Extraction failures are
//! a per-file concern: the failing file is logged and skipped so one bad
//! upload never aborts a batch.

use std::io::Read;
use std::path::Path;

use tracing::{error, warn};

use crate::config::UnknownFileMode;
use crate::models::Document;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Callers treat any variant the same way: log and skip.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Docx(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract the text of one file into a [`Document`] tagged with the
/// file's basename.
///
/// Returns `None` when the file should be skipped: extraction failed, or
/// the extension is unsupported and `unknown_files = "strict"`. With the
/// default lenient mode an unsupported file yields an empty-bodied
/// document, which downstream chunking turns into zero chunks.
pub fn extract_file(path: &Path, unknown_files: UnknownFileMode) -> Option<Document> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let result = match ext.as_str() {
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        "txt" => extract_txt(path),
        _ => match unknown_files {
            UnknownFileMode::Lenient => Ok(String::new()),
            UnknownFileMode::Strict => {
                warn!(file = %filename, "skipping file with unsupported extension");
                return None;
            }
        },
    };

    match result {
        Ok(content) => Some(Document {
            content,
            source: filename,
        }),
        Err(e) => {
            error!(file = %filename, error = %e, "text extraction failed, skipping file");
            None
        }
    }
}

/// Page texts come back concatenated; `pdf-extract` inserts newlines
/// between pages.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_txt(path: &Path) -> Result<String, ExtractError> {
    std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string()))
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    extract_docx_bytes(&bytes)
}

fn extract_docx_bytes(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractError::Docx(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_paragraphs(&doc_xml)
}

/// Walk `word/document.xml`, collecting `w:t` runs and emitting one
/// trailing newline per `w:p` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text_run = false;
                } else if name.as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn txt_file_reads_as_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "Hello world.").unwrap();

        let doc = extract_file(&path, UnknownFileMode::Lenient).unwrap();
        assert_eq!(doc.content, "Hello world.");
        assert_eq!(doc.source, "note.txt");
    }

    #[test]
    fn unsupported_extension_is_empty_when_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let doc = extract_file(&path, UnknownFileMode::Lenient).unwrap();
        assert_eq!(doc.content, "");
        assert_eq!(doc.source, "image.png");
    }

    #[test]
    fn unsupported_extension_is_skipped_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        assert!(extract_file(&path, UnknownFileMode::Strict).is_none());
    }

    #[test]
    fn corrupt_pdf_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        assert!(extract_file(&path, UnknownFileMode::Lenient).is_none());
    }

    #[test]
    fn corrupt_docx_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        assert!(extract_file(&path, UnknownFileMode::Lenient).is_none());
    }

    #[test]
    fn docx_paragraphs_get_trailing_newlines() {
        // Minimal DOCX: a ZIP with just word/document.xml.
        let mut zip_bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer
                .write_all(
                    br#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
  </w:body>
</w:document>"#,
                )
                .unwrap();
            writer.finish().unwrap();
        }

        let text = extract_docx_bytes(&zip_bytes).unwrap();
        assert_eq!(text, "First paragraph.\nSecond paragraph.\n");
    }
}
