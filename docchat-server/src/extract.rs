//! Text extraction from uploaded files.
//!
//! Plain text and markdown are decoded as UTF-8, then CP949 (Korean), then
//! Windows-1252.
//! PDFs go through `pdf-extract`. DOCX files are zip archives; the text runs
//! of `word/document.xml` are joined with one line per paragraph. All
//! extraction is CPU-bound and runs on the blocking thread pool.

use std::borrow::Cow;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;

use docchat_rag::RagError;
use encoding_rs::{EUC_KR, UTF_8, WINDOWS_1252};
use tracing::debug;

/// A supported upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Txt,
    Md,
    Docx,
}

impl FileType {
    pub const SUPPORTED: [FileType; 4] = [Self::Pdf, Self::Txt, Self::Md, Self::Docx];

    /// Detect the type from a file name's extension, ignoring case.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        Self::SUPPORTED.into_iter().find(|t| t.as_str() == ext)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the text of `bytes`, trimmed of surrounding whitespace.
///
/// # Errors
///
/// Returns [`RagError::ExtractionFailure`] if the file cannot be parsed.
pub async fn extract_text(
    file_type: FileType,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<String, RagError> {
    let name = filename.to_string();
    let text = tokio::task::spawn_blocking(move || extract_blocking(file_type, &bytes))
        .await
        .map_err(|e| failure(&name, format!("extraction task failed: {e}")))?
        .map_err(|message| failure(&name, message))?;

    debug!(filename = %filename, %file_type, chars = text.chars().count(), "extracted text");
    Ok(text.trim().to_string())
}

fn failure(filename: &str, message: String) -> RagError {
    RagError::ExtractionFailure { filename: filename.to_string(), message }
}

fn extract_blocking(file_type: FileType, bytes: &[u8]) -> Result<String, String> {
    match file_type {
        FileType::Txt | FileType::Md => Ok(decode_text(bytes).into_owned()),
        FileType::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("invalid PDF: {e}"))
        }
        FileType::Docx => extract_docx(bytes),
    }
}

/// Decode as UTF-8 (minus a byte-order mark), then CP949, then Windows-1252.
///
/// The first encoding that decodes without errors wins. Windows-1252 maps
/// every byte, so it always succeeds.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    for encoding in [UTF_8, EUC_KR] {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text;
        }
    }
    WINDOWS_1252.decode(bytes).0
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {e}"))?;
    Ok(document_xml_text(&xml))
}

/// Text of a WordprocessingML body: `<w:t>` runs, tabs and breaks, one line per paragraph.
fn document_xml_text(xml: &str) -> String {
    let mut out = String::new();
    let mut rest = xml;

    while let Some(lt) = rest.find('<') {
        let Some(len) = rest[lt..].find('>') else {
            break;
        };
        let tag = &rest[lt + 1..lt + len];
        rest = &rest[lt + len + 1..];

        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();

        match name {
            "w:t" if !closing && !self_closing => {
                let end = rest.find("</w:t>").unwrap_or(rest.len());
                out.push_str(&decode_entities(&rest[..end]));
                rest = &rest[end..];
            }
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => out.push('\n'),
            "w:p" if closing || self_closing => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi + 1)));
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))?
                .ok()?;
            char::from_u32(code)
        }
    }
}
