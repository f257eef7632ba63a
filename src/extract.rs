//! Text extraction for seed documentation (plain text, HTML, PDF).
//!
//! Extraction errors surface as [`autot_core::Error::DocParse`]; the caller
//! logs them and leaves the document out of the store. Invalid UTF-8 in
//! text and HTML files is replaced rather than rejected.

use std::path::Path;

use autot_core::normalize::collapse_whitespace;
use autot_core::Error;
use scraper::{ElementRef, Html};

/// Document formats recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Text,
    Html,
    Pdf,
}

impl DocFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" | "md" => Some(DocFormat::Text),
            "html" | "htm" => Some(DocFormat::Html),
            "pdf" => Some(DocFormat::Pdf),
            _ => None,
        }
    }
}

/// Block-level tags whose text becomes one paragraph each.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "dt", "dd", "blockquote", "pre", "td",
];

/// Subtrees that never contribute text.
const SKIP_TAGS: &[&str] = &["script", "style", "template", "noscript", "svg"];

/// Read `path` and return its text.
pub fn extract_file(path: &Path) -> autot_core::Result<String> {
    let origin = path.display().to_string();
    let format = DocFormat::from_path(path).ok_or_else(|| Error::DocParse {
        origin: origin.clone(),
        reason: "unsupported file type".to_string(),
    })?;

    let bytes = std::fs::read(path).map_err(|e| Error::DocParse {
        origin: origin.clone(),
        reason: e.to_string(),
    })?;

    extract_bytes(&bytes, format).map_err(|reason| Error::DocParse { origin, reason })
}

/// Extract text from in-memory content of a known format.
pub fn extract_bytes(bytes: &[u8], format: DocFormat) -> Result<String, String> {
    match format {
        DocFormat::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocFormat::Html => Ok(html_to_text(&String::from_utf8_lossy(bytes))),
        DocFormat::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| format!("PDF extraction failed: {}", e)),
    }
}

/// Flatten HTML to paragraphs separated by blank lines.
///
/// `<pre>` keeps its line structure so code samples survive for the
/// chunker; other blocks collapse whitespace. Script and style content is
/// dropped. A block nested in another block is not emitted twice.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut blocks: Vec<String> = Vec::new();

    for element in document.root_element().descendent_elements() {
        let tag = element.value().name();
        if !BLOCK_TAGS.contains(&tag)
            || has_ancestor(&element, |t| BLOCK_TAGS.contains(&t) || SKIP_TAGS.contains(&t))
        {
            continue;
        }
        let text = element_text(&element, tag == "pre");
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    if blocks.is_empty() {
        // Bare text or unstructured markup.
        return element_text(&document.root_element(), false);
    }
    blocks.join("\n\n")
}

fn has_ancestor(element: &ElementRef<'_>, pred: impl Fn(&str) -> bool) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| pred(a.value().name()))
}

fn element_text(element: &ElementRef<'_>, preserve_newlines: bool) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| SKIP_TAGS.contains(&a.value().name()));
        if !skipped {
            raw.push_str(text);
        }
    }
    if preserve_newlines {
        raw.lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_matches('\n')
            .to_string()
    } else {
        collapse_whitespace(&raw)
    }
}
