// Document readers and export
// Turns uploaded files into input text and plain output into a .docx download

use docx_rs::{Docx, Paragraph, Run};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Unsupported file format '.{extension}': {reason}")]
    Unsupported { extension: String, reason: &'static str },
    #[error("Failed to open .docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse word/document.xml: {0}")]
    Xml(String),
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    #[error("Failed to build .docx: {0}")]
    Export(String),
}

/// A format this build can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReader {
    /// html, htm, txt, md: decoded as lossy UTF-8.
    Text,
    Docx,
    Pdf,
}

/// Capability lookup result for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderCapability {
    Supported(InputReader),
    Unsupported { extension: String, reason: &'static str },
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Resolve the reader for a file by its extension.
pub fn reader_for(file_name: &str) -> ReaderCapability {
    let extension = extension_of(file_name);
    match extension.as_str() {
        "html" | "htm" | "txt" | "md" => ReaderCapability::Supported(InputReader::Text),
        "docx" => ReaderCapability::Supported(InputReader::Docx),
        "pdf" => ReaderCapability::Supported(InputReader::Pdf),
        "doc" => ReaderCapability::Unsupported {
            extension,
            reason: "legacy Word binary files are not supported, save as .docx",
        },
        _ => ReaderCapability::Unsupported {
            extension,
            reason: "expected .html, .txt, .md, .docx or .pdf",
        },
    }
}

impl InputReader {
    pub fn read(self, bytes: &[u8]) -> Result<String, ReaderError> {
        match self {
            Self::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
            Self::Docx => read_docx_text(bytes),
            Self::Pdf => pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ReaderError::Pdf(e.to_string())),
        }
    }
}

/// Read an uploaded file into input text.
pub fn read_input(file_name: &str, bytes: &[u8]) -> Result<String, ReaderError> {
    match reader_for(file_name) {
        ReaderCapability::Supported(reader) => {
            let text = reader.read(bytes)?;
            info!(
                "[DOCUMENTS] read {} as {:?}: {} bytes -> {} chars",
                file_name,
                reader,
                bytes.len(),
                text.chars().count()
            );
            Ok(text)
        }
        ReaderCapability::Unsupported { extension, reason } => {
            Err(ReaderError::Unsupported { extension, reason })
        }
    }
}

/// One line per `w:p` of `word/document.xml`, empty paragraphs included.
/// Paragraphs nested in text boxes become their own lines.
fn read_docx_text(bytes: &[u8]) -> Result<String, ReaderError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    // w:t keeps significant spaces under xml:space="preserve"
    reader.trim_text(false);

    let mut lines: Vec<String> = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => lines.push(String::new()),
                b"w:tab" => {
                    if let Some(para) = open.last_mut() {
                        para.push('\t');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| ReaderError::Xml(err.to_string()))?;
                if let Some(para) = open.last_mut() {
                    para.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(para) = open.pop() {
                        lines.push(para);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ReaderError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(lines.join("\n"))
}

/// Build an in-memory .docx with one paragraph per line of `text`.
pub fn plain_text_to_docx(text: &str) -> Result<Vec<u8>, ReaderError> {
    let mut docx = Docx::new();
    for line in text.split('\n') {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
    }

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ReaderError::Export(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("word/document.xml", SimpleFileOptions::default())
                .unwrap();
            write!(
                zip,
                r#"<?xml version="1.0"?><w:document><w:body>{}</w:body></w:document>"#,
                body
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_reader_capabilities() {
        assert_eq!(reader_for("page.HTML"), ReaderCapability::Supported(InputReader::Text));
        assert_eq!(reader_for("notes.md"), ReaderCapability::Supported(InputReader::Text));
        assert_eq!(reader_for("essay.docx"), ReaderCapability::Supported(InputReader::Docx));
        assert_eq!(reader_for("paper.pdf"), ReaderCapability::Supported(InputReader::Pdf));
        assert!(matches!(
            reader_for("old.doc"),
            ReaderCapability::Unsupported { ref extension, .. } if extension == "doc"
        ));
        assert!(matches!(reader_for("no_extension"), ReaderCapability::Unsupported { .. }));
    }

    #[test]
    fn test_read_text_is_lossy() {
        let text = read_input("a.txt", b"caf\xc3\xa9 \xff").unwrap();
        assert_eq!(text, "café \u{FFFD}");
    }

    #[test]
    fn test_read_unsupported_errors() {
        let err = read_input("old.doc", b"binary").unwrap_err();
        assert!(matches!(err, ReaderError::Unsupported { .. }));
    }

    #[test]
    fn test_read_docx_paragraphs() {
        let bytes = docx_with_body(
            r#"<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p><w:p w:rsidR="1"><w:r><w:t xml:space="preserve">Second </w:t></w:r><w:r><w:tab/><w:t>line</w:t></w:r></w:p>"#,
        );
        let text = read_input("x.docx", &bytes).unwrap();
        assert_eq!(text, "Fish & chips\nSecond \tline");
    }

    #[test]
    fn test_read_docx_char_refs_and_empty_paragraphs() {
        let bytes = docx_with_body(
            r#"<w:p><w:r><w:t>It&#8217;s &#x2014; done</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>after blank</w:t></w:r></w:p>"#,
        );
        let text = read_input("x.docx", &bytes).unwrap();
        assert_eq!(text, "It\u{2019}s \u{2014} done\n\nafter blank");
    }

    #[test]
    fn test_read_docx_text_box_paragraph_is_own_line() {
        let bytes = docx_with_body(
            r#"<w:p><w:r><w:t>outer</w:t></w:r><w:r><w:pict><w:txbxContent><w:p><w:r><w:t>boxed</w:t></w:r></w:p></w:txbxContent></w:pict></w:r></w:p>"#,
        );
        let text = read_input("x.docx", &bytes).unwrap();
        assert_eq!(text, "boxed\nouter");
    }

    #[test]
    fn test_read_docx_without_body_part_errors() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("other.xml", SimpleFileOptions::default()).unwrap();
            zip.finish().unwrap();
        }
        let err = read_input("x.docx", &buf.into_inner()).unwrap_err();
        assert!(matches!(err, ReaderError::Archive(_)));
    }

    #[test]
    fn test_export_docx_is_zip() {
        let bytes = plain_text_to_docx("first\nsecond").unwrap();
        assert_eq!(&bytes[..2], b"PK");
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.file_names().any(|n| n == "word/document.xml"));
    }
}
