//! Plain-text extraction for file and fetched-page content.
//!
//! The ingestion adapter hands over raw bytes plus a [`ContentKind`]
//! (derived from a file extension or an HTTP content type); this module
//! returns UTF-8 text ready for chunking.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum decompressed bytes read from the docx body (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Content formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    Html,
    Pdf,
    Docx,
}

impl ContentKind {
    /// Classify a file by extension. Unknown extensions are read as text.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => ContentKind::Pdf,
            "docx" => ContentKind::Docx,
            "html" | "htm" => ContentKind::Html,
            _ => ContentKind::PlainText,
        }
    }

    /// Classify an HTTP `Content-Type` header value.
    ///
    /// Returns `None` for types that have no text representation
    /// (images, archives, ...).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(ContentKind::Html),
            "application/pdf" => Some(ContentKind::Pdf),
            "" | "application/json" | "application/xml" => Some(ContentKind::PlainText),
            m if m.starts_with("text/") => Some(ContentKind::PlainText),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("content is not valid UTF-8 text")]
    NotText,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extract plain text from `bytes`.
pub fn extract_text(bytes: &[u8], kind: ContentKind) -> Result<String, ExtractError> {
    match kind {
        ContentKind::PlainText => decode_utf8(bytes),
        ContentKind::Html => decode_utf8(bytes).map(|html| html_to_text(&html)),
        ContentKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        ContentKind::Docx => extract_docx(bytes),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::NotText)?;
    // NUL bytes only show up in binary payloads mislabelled as text.
    if text.contains('\0') {
        return Err(ExtractError::NotText);
    }
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_body_text(&doc_xml)
}

/// Collect `<w:t>` runs, breaking lines at paragraph ends.
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// Strip markup from an HTML document, keeping visible text.
///
/// Tags become whitespace so words on either side never merge; `<script>`,
/// `<style>`, and comments are dropped with their content. Only the common
/// named entities and numeric character references are decoded.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with("<!--") {
            i += rest.find("-->").map(|p| p + 3).unwrap_or(rest.len());
            out.push(' ');
            continue;
        }
        if rest.starts_with('<') {
            let lower_rest = &lower[i..];
            let skip_until = ["script", "style"]
                .iter()
                .find(|tag| {
                    lower_rest[1..].starts_with(*tag)
                        && lower_rest[1 + tag.len()..]
                            .starts_with(|c: char| c == '>' || c.is_whitespace())
                })
                .map(|tag| format!("</{}", tag));
            i += match skip_until {
                Some(close) => lower_rest
                    .find(&close)
                    .and_then(|p| lower_rest[p..].find('>').map(|q| p + q + 1))
                    .unwrap_or(rest.len()),
                None => rest.find('>').map(|p| p + 1).unwrap_or(rest.len()),
            };
            out.push(' ');
            continue;
        }
        let next_tag = rest.find('<').unwrap_or(rest.len());
        out.push_str(&decode_entities(&rest[..next_tag]));
        i += next_tag;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';').filter(|&s| s <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
