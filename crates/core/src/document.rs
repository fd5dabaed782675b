//! Plain-text extraction from uploaded story documents.
//!
//! Supports plain text and Markdown (read as-is), HTML (tags stripped),
//! DOCX (paragraphs from `word/document.xml`) and PDF (via `pdf-extract`).
//! Legacy binary `.doc` files are rejected.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>").expect("valid regex")
});
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|section|article)\s*>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("valid regex"));

/// DOCX entry holding the document body.
const DOCX_BODY: &str = "word/document.xml";

/// Coarse category of an uploaded file, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Word,
    Markdown,
    Html,
    Text,
    Image,
    Other,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "docx" | "doc" => FileType::Word,
            "md" | "markdown" => FileType::Markdown,
            "html" | "htm" => FileType::Html,
            "txt" => FileType::Text,
            "jpg" | "jpeg" | "png" | "webp" => FileType::Image,
            _ => FileType::Other,
        }
    }

    /// Whether text can be extracted from this kind of file.
    pub fn is_document(self) -> bool {
        !matches!(self, FileType::Image | FileType::Other)
    }
}

/// Extract text from a file on disk, dispatching on its extension.
pub fn extract_text(path: &Path) -> Result<String, CoreError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    let bytes = std::fs::read(path)
        .map_err(|e| CoreError::Internal(format!("read {}: {e}", path.display())))?;
    extract_text_from_bytes(&bytes, &ext)
}

/// Extract text from in-memory file contents with the given extension.
pub fn extract_text_from_bytes(bytes: &[u8], ext: &str) -> Result<String, CoreError> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    let text = match ext.as_str() {
        "txt" | "md" | "markdown" => String::from_utf8_lossy(bytes).into_owned(),
        "html" | "htm" => html_to_text(&String::from_utf8_lossy(bytes)),
        "docx" => docx_to_text(bytes)?,
        "pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| CoreError::Validation(format!("could not read PDF: {e}")))?,
        "doc" => {
            return Err(CoreError::Unsupported(
                "legacy .doc files are not supported; save as .docx".to_string(),
            ))
        }
        other => {
            return Err(CoreError::Unsupported(format!(
                "cannot extract text from .{other} files"
            )))
        }
    };
    Ok(tidy(&text))
}

/// Strip markup from an HTML document, keeping block boundaries as newlines.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = BLOCK_END.replace_all(&without_scripts, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

fn docx_to_text(bytes: &[u8]) -> Result<String, CoreError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| CoreError::Validation(format!("not a valid .docx file: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| CoreError::Validation(format!("missing {DOCX_BODY}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| CoreError::Validation(format!("unreadable {DOCX_BODY}: {e}")))?;

    let xml = xml.replace("</w:p>", "\n").replace("<w:tab/>", "\t");
    Ok(decode_entities(&TAG.replace_all(&xml, "")))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Normalize line endings, collapse runs of blank lines, trim.
fn tidy(text: &str) -> String {
    let unix = text.replace("\r\n", "\n");
    BLANK_LINES.replace_all(&unix, "\n\n").trim().to_string()
}
