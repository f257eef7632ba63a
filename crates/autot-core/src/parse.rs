//! Response parsing.
//!
//! Extracts three fields from raw generation output:
//!
//! - **artifact**: the first fenced block labelled with the artifact label
//!   (default `lisp`). Required.
//! - **rationale**: the first fenced block labelled `comments`. Optional.
//! - **reasoning**: a `<think>…</think>` marker pair, or failing that a
//!   fenced block labelled `think`. Optional.
//!
//! Labels compare case-insensitively. The marker region is cut out before
//! fences are scanned, so fences quoted inside reasoning never count as the
//! artifact.

use crate::error::{Error, Result};

/// Fence labels and reasoning marker name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLabels {
    pub artifact: String,
    pub rationale: String,
    pub reasoning: String,
}

impl Default for ResponseLabels {
    fn default() -> Self {
        Self {
            artifact: "lisp".to_string(),
            rationale: "comments".to_string(),
            reasoning: "think".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub artifact: String,
    pub rationale: Option<String>,
    pub reasoning: Option<String>,
}

struct Fence {
    label: String,
    body: String,
    terminated: bool,
}

/// Parse a raw generation response.
///
/// Fails with [`Error::OutputParse`] when the artifact block is missing,
/// empty, or never closed.
pub fn parse(raw: &str, labels: &ResponseLabels) -> Result<ParsedResponse> {
    let (marker_reasoning, rest) = split_reasoning(raw, &labels.reasoning);
    let fences = scan_fences(&rest);

    let first = |label: &str| {
        fences
            .iter()
            .find(|f| f.label.eq_ignore_ascii_case(label))
    };

    let artifact = match first(&labels.artifact) {
        Some(f) if f.terminated && !f.body.trim().is_empty() => f.body.clone(),
        _ => {
            return Err(Error::OutputParse {
                label: labels.artifact.clone(),
            })
        }
    };

    let rationale = first(&labels.rationale)
        .map(|f| f.body.trim().to_string())
        .filter(|s| !s.is_empty());

    let reasoning = marker_reasoning.or_else(|| {
        first(&labels.reasoning)
            .map(|f| f.body.trim().to_string())
            .filter(|s| !s.is_empty())
    });

    Ok(ParsedResponse {
        artifact,
        rationale,
        reasoning,
    })
}

/// Cut a `<label>…</label>` region out of `raw`.
///
/// A closing marker with no opening one (some models omit it) takes
/// everything before it as reasoning. An opening marker that is never
/// closed is left in place.
fn split_reasoning(raw: &str, label: &str) -> (Option<String>, String) {
    let open = format!("<{}>", label.to_ascii_lowercase());
    let close = format!("</{}>", label.to_ascii_lowercase());
    // ASCII lowering keeps byte offsets valid for `raw`.
    let lower = raw.to_ascii_lowercase();

    let Some(close_at) = lower.find(&close) else {
        return (None, raw.to_string());
    };

    let start = match lower[..close_at].find(&open) {
        Some(open_at) => open_at,
        None => 0,
    };
    let inner_start = if lower[start..].starts_with(&open) {
        start + open.len()
    } else {
        start
    };

    let inner = raw[inner_start..close_at].trim();
    let mut rest = String::with_capacity(raw.len());
    rest.push_str(&raw[..start]);
    rest.push_str(&raw[close_at + close.len()..]);

    let reasoning = (!inner.is_empty()).then(|| inner.to_string());
    (reasoning, rest)
}

/// Collect fenced blocks in order. Unlabelled fences are kept with an empty
/// label so they pair their own closing fence.
fn scan_fences(text: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(info) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let label = info.split_whitespace().next().unwrap_or("").to_string();

        let mut body: Vec<&str> = Vec::new();
        let mut terminated = false;
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                terminated = true;
                break;
            }
            body.push(inner);
        }

        fences.push(Fence {
            label,
            body: trim_blank_lines(&body.join("\n")),
            terminated,
        });
    }

    fences
}

/// Drop leading and trailing blank lines, keeping indentation of the first
/// non-blank line.
fn trim_blank_lines(s: &str) -> String {
    let start = s
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| s[..i].rfind('\n').map_or(0, |nl| nl + 1))
        .unwrap_or(s.len());
    s[start..].trim_end().to_string()
}
