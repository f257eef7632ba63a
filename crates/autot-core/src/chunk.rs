//! Code-aware documentation chunker.
//!
//! Splits documentation text into bounded `(role, text)` chunks: `code`
//! chunks paired with the prose around them, the `context` chunks carrying
//! that prose, and `prose` chunks for everything else.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens`/`overlap_tokens` to characters (4 chars/token).
//! 2. Walk the document line by line. A line whose first non-blank char is
//!    the syntax's opening delimiter starts a *form*, which extends until its
//!    delimiters balance. Other non-blank lines group into paragraphs that
//!    end at a blank line or at the next form.
//! 3. Score every form and paragraph with the configured [`Detector`]; at or
//!    above `code_threshold` the block is code, otherwise prose.
//! 4. A form that never balances (or closes too early, or runs past
//!    `max_form_lines`) is malformed: the region up to the next blank line
//!    is cut into fixed windows of `fallback_window_lines` lines, each scored
//!    on its own. Chunking never fails on malformed input.
//! 5. Consecutive prose blocks are packed into chunks up to `max_chars`.
//! 6. Any block longer than `max_chars` is split at the nearest newline or
//!    space boundary; consecutive windows share `overlap_chars`.
//! 7. Each code block picks up the tail of the prose block before it and the
//!    head of the prose block after it as its context.
//!
//! # Guarantees
//!
//! - Deterministic for identical input and configuration.
//! - Concatenating the `code` and `prose` chunks in order, each without its
//!   leading [`DocChunk::overlap`], reproduces the document modulo
//!   whitespace.
//!
//! # Example
//!
//! ```rust
//! use autot_core::chunk::{Chunker, ChunkerConfig};
//! use autot_core::models::Role;
//!
//! let chunker = Chunker::lisp(ChunkerConfig::default());
//! let chunks = chunker.chunk("Squares a number.\n(defun square (x) (* x x))\nDone.");
//! assert_eq!(chunks[1].role, Role::Code);
//! assert_eq!(chunks[1].context.as_deref(), Some("Squares a number. Done."));
//! ```

use crate::detect::{DelimiterScanner, Detector, DetectorKind, Syntax};
use crate::models::{NewChunk, Role};
use crate::normalize::collapse_whitespace;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Chunk sizing and detection knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    /// Must be smaller than `max_chars`.
    pub overlap_chars: usize,
    pub code_threshold: f32,
    pub fallback_window_lines: usize,
    pub max_form_lines: usize,
}

impl ChunkerConfig {
    pub fn from_tokens(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_chars: max_tokens * CHARS_PER_TOKEN,
            overlap_chars: overlap_tokens * CHARS_PER_TOKEN,
            ..Self::default()
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 700 * CHARS_PER_TOKEN,
            overlap_chars: 80 * CHARS_PER_TOKEN,
            code_threshold: 0.45,
            fallback_window_lines: 8,
            max_form_lines: 400,
        }
    }
}

/// One chunk produced by [`Chunker::chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    pub role: Role,
    pub text: String,
    /// Leading bytes repeated from the end of the previous window of the
    /// same block; `0` for the first window.
    pub overlap: usize,
    /// Paired prose, set on `code` chunks only.
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Block<'a> {
    text: &'a str,
    is_code: bool,
}

enum FormScan {
    /// Index of the line that balances the form.
    Balanced(usize),
    /// Index of the last line of the malformed region.
    Malformed(usize),
}

/// Splits documents into code, context, and prose chunks.
pub struct Chunker {
    config: ChunkerConfig,
    syntax: Syntax,
    detector: Box<dyn Detector>,
}

impl Chunker {
    pub fn new(config: ChunkerConfig, syntax: Syntax, detector: Box<dyn Detector>) -> Self {
        Self {
            config,
            syntax,
            detector,
        }
    }

    /// Chunker with Lisp syntax and the composite Lisp detector.
    pub fn lisp(config: ChunkerConfig) -> Self {
        let syntax = Syntax::lisp();
        let detector = DetectorKind::Lisp.build(&syntax);
        Self::new(config, syntax, detector)
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `doc` into ordered chunks. Each code chunk with surrounding
    /// prose is immediately followed by its `context` chunk.
    pub fn chunk(&self, doc: &str) -> Vec<DocChunk> {
        let blocks = self.segment(doc);
        let mut chunks = Vec::new();
        let mut prose_buf = String::new();

        for (idx, block) in blocks.iter().enumerate() {
            if !block.is_code {
                self.push_prose(&mut prose_buf, block.text, &mut chunks);
                continue;
            }

            flush_prose(&mut prose_buf, &mut chunks);
            let context = self.pair_context(&blocks, idx);
            for (text, overlap) in self.windows(block.text) {
                chunks.push(DocChunk {
                    role: Role::Code,
                    text,
                    overlap,
                    context: context.clone(),
                });
                if let Some(ctx) = &context {
                    chunks.push(DocChunk {
                        role: Role::Context,
                        text: ctx.clone(),
                        overlap: 0,
                        context: None,
                    });
                }
            }
        }
        flush_prose(&mut prose_buf, &mut chunks);

        chunks
    }

    /// Chunk `doc` and tag every chunk with `origin_path`, ready for
    /// embedding.
    pub fn chunk_document(&self, doc: &str, origin_path: &str) -> Vec<NewChunk> {
        self.chunk(doc)
            .into_iter()
            .map(|c| NewChunk::new(c.text, c.role, origin_path).with_context(c.context))
            .collect()
    }

    fn segment<'a>(&self, doc: &'a str) -> Vec<Block<'a>> {
        let lines = line_spans(doc);
        let mut blocks = Vec::new();
        let mut para_start: Option<usize> = None;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i].1;
            if line.trim().is_empty() {
                if let Some(start) = para_start.take() {
                    self.push_block(doc, &lines, start, i - 1, &mut blocks);
                }
                i += 1;
                continue;
            }

            if line.trim_start().starts_with(self.syntax.open) {
                if let Some(start) = para_start.take() {
                    self.push_block(doc, &lines, start, i - 1, &mut blocks);
                }
                match self.scan_form(&lines, i) {
                    FormScan::Balanced(end) => {
                        self.push_block(doc, &lines, i, end, &mut blocks);
                        i = end + 1;
                    }
                    FormScan::Malformed(end) => {
                        tracing::debug!(
                            line = i + 1,
                            lines = end - i + 1,
                            "unbalanced form, falling back to line windows"
                        );
                        let window = self.config.fallback_window_lines.max(1);
                        let mut start = i;
                        while start <= end {
                            let stop = (start + window - 1).min(end);
                            self.push_block(doc, &lines, start, stop, &mut blocks);
                            start = stop + 1;
                        }
                        i = end + 1;
                    }
                }
                continue;
            }

            if para_start.is_none() {
                para_start = Some(i);
            }
            i += 1;
        }

        if let Some(start) = para_start {
            self.push_block(doc, &lines, start, lines.len() - 1, &mut blocks);
        }

        blocks
    }

    fn scan_form(&self, lines: &[(usize, &str)], start: usize) -> FormScan {
        let limit = (start + self.config.max_form_lines.max(1)).min(lines.len());
        let mut scanner = DelimiterScanner::new();
        for (j, (_, line)) in lines.iter().enumerate().take(limit).skip(start) {
            scanner.feed(line, &self.syntax);
            if scanner.underflowed() {
                return FormScan::Malformed(region_end(lines, j));
            }
            if scanner.is_balanced() {
                return FormScan::Balanced(j);
            }
        }
        FormScan::Malformed(region_end(lines, start))
    }

    fn push_block<'a>(
        &self,
        doc: &'a str,
        lines: &[(usize, &'a str)],
        first: usize,
        last: usize,
        blocks: &mut Vec<Block<'a>>,
    ) {
        let start = lines[first].0;
        let end = lines[last].0 + lines[last].1.len();
        let text = doc[start..end].trim();
        if text.is_empty() {
            return;
        }
        let is_code = self.detector.score(text) >= self.config.code_threshold;
        blocks.push(Block { text, is_code });
    }

    fn push_prose(&self, buf: &mut String, text: &str, chunks: &mut Vec<DocChunk>) {
        let max_chars = self.config.max_chars;
        let would_be = if buf.is_empty() {
            text.len()
        } else {
            buf.len() + 2 + text.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            flush_prose(buf, chunks);
        }

        if text.len() > max_chars {
            for (piece, overlap) in self.windows(text) {
                chunks.push(DocChunk {
                    role: Role::Prose,
                    text: piece,
                    overlap,
                    context: None,
                });
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(text);
        }
    }

    fn pair_context(&self, blocks: &[Block<'_>], idx: usize) -> Option<String> {
        let half = (self.config.max_chars / 2).max(1);
        let before = idx
            .checked_sub(1)
            .and_then(|p| blocks.get(p))
            .filter(|b| !b.is_code)
            .map(|b| tail(&collapse_whitespace(b.text), half).to_string());
        let after = blocks
            .get(idx + 1)
            .filter(|b| !b.is_code)
            .map(|b| head(&collapse_whitespace(b.text), half).to_string());

        let joined = [before, after]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Cut `text` into windows of at most `max_chars`, preferring newline or
    /// space boundaries. Returns `(window, overlap)` pairs.
    fn windows(&self, text: &str) -> Vec<(String, usize)> {
        let max_chars = self.config.max_chars.max(1);
        let overlap_chars = self.config.overlap_chars;
        let mut out = Vec::new();
        let mut start = 0;
        let mut overlap = 0;

        loop {
            let remaining = &text[start..];
            if remaining.len() <= max_chars {
                if !remaining.is_empty() {
                    out.push((remaining.to_string(), overlap));
                }
                break;
            }

            let hard = snap_to_char_boundary(remaining, max_chars);
            let hard = if hard == 0 {
                next_char_boundary(remaining)
            } else {
                hard
            };
            let cut = remaining[..hard]
                .rfind('\n')
                .or_else(|| remaining[..hard].rfind(' '))
                .map(|pos| pos + 1)
                .filter(|&pos| pos > overlap_chars)
                .unwrap_or(hard);

            let end = start + cut;
            out.push((text[start..end].to_string(), overlap));

            let mut next = snap_to_char_boundary(text, end.saturating_sub(overlap_chars));
            if next <= start {
                next = end;
            }
            overlap = end - next;
            start = next;
        }

        out
    }
}

fn flush_prose(buf: &mut String, chunks: &mut Vec<DocChunk>) {
    if buf.is_empty() {
        return;
    }
    chunks.push(DocChunk {
        role: Role::Prose,
        text: std::mem::take(buf),
        overlap: 0,
        context: None,
    });
}

/// Lines with their byte offsets, line endings included.
fn line_spans(doc: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    doc.split_inclusive('\n')
        .map(|line| {
            let span = (offset, line);
            offset += line.len();
            span
        })
        .collect()
}

/// Last non-blank line of the paragraph containing line `from`.
fn region_end(lines: &[(usize, &str)], from: usize) -> usize {
    let mut end = from;
    while end + 1 < lines.len() && !lines[end + 1].1.trim().is_empty() {
        end += 1;
    }
    end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}

fn head(s: &str, max: usize) -> &str {
    &s[..snap_to_char_boundary(s, max)]
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut i = s.len() - max;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    &s[i..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(max_chars: usize, overlap_chars: usize) -> Chunker {
        Chunker::lisp(ChunkerConfig {
            max_chars,
            overlap_chars,
            ..ChunkerConfig::default()
        })
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn reconstruct(chunks: &[DocChunk]) -> String {
        chunks
            .iter()
            .filter(|c| c.role != Role::Context)
            .map(|c| &c.text[c.overlap..])
            .collect()
    }

    #[test]
    fn test_defun_with_surrounding_prose() {
        let doc = "Squares a number by multiplying it with itself.\n\
                   (defun square (x) (* x x))\n\
                   The result is never negative.";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);

        let code: Vec<_> = chunks.iter().filter(|c| c.role == Role::Code).collect();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].text, "(defun square (x) (* x x))");
        assert_eq!(
            code[0].context.as_deref(),
            Some("Squares a number by multiplying it with itself. The result is never negative.")
        );

        let ctx: Vec<_> = chunks.iter().filter(|c| c.role == Role::Context).collect();
        assert_eq!(ctx.len(), 1);
        assert_eq!(Some(ctx[0].text.as_str()), code[0].context.as_deref());
        assert_eq!(chunks[0].role, Role::Prose);
        assert_eq!(chunks[1].role, Role::Code);
        assert_eq!(chunks[2].role, Role::Context);
        assert_eq!(chunks[3].role, Role::Prose);
    }

    #[test]
    fn test_no_code_yields_only_prose() {
        let doc = "First paragraph about lists.\n\nSecond paragraph (with an aside).";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.role == Role::Prose));
    }

    #[test]
    fn test_empty_document() {
        let chunker = Chunker::lisp(ChunkerConfig::default());
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("\n\n  \n").is_empty());
    }

    #[test]
    fn test_multiline_form_spanning_blank_line() {
        let doc = "Defines a helper.\n\n(defun helper (x)\n\n  (let ((y (car x)))\n    (cons y nil)))\n";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);
        let code: Vec<_> = chunks.iter().filter(|c| c.role == Role::Code).collect();
        assert_eq!(code.len(), 1);
        assert!(code[0].text.starts_with("(defun helper"));
        assert!(code[0].text.ends_with("(cons y nil)))"));
        assert_eq!(code[0].context.as_deref(), Some("Defines a helper."));
    }

    #[test]
    fn test_character_literal_paren_stays_one_form() {
        let doc = "Reads a paren.\n(defun open-p (c)\n  (char= c #\\())\nDone.";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);
        let code: Vec<_> = chunks.iter().filter(|c| c.role == Role::Code).collect();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].text, "(defun open-p (c)\n  (char= c #\\())");
        assert_eq!(code[0].context.as_deref(), Some("Reads a paren. Done."));
    }

    #[test]
    fn test_unbalanced_form_falls_back_to_windows() {
        let doc = "Intro text.\n\n(defun broken (x)\n  (+ x 1)\n\nMore prose here.";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);
        assert_eq!(strip_ws(&reconstruct(&chunks)), strip_ws(doc));
        assert!(chunks.iter().any(|c| c.text.contains("More prose here.")));
    }

    #[test]
    fn test_extra_close_delimiter_is_malformed() {
        let doc = "(car x))\n(cdr y)\n\nTail.";
        let chunks = small(40, 0).chunk(doc);
        assert_eq!(strip_ws(&reconstruct(&chunks)), strip_ws(doc));
    }

    #[test]
    fn test_window_fallback_respects_line_count() {
        let lines: Vec<String> = (0..20).map(|i| format!("  (step {})", i)).collect();
        let doc = format!("(progn\n{}", lines.join("\n"));
        let chunker = Chunker::lisp(ChunkerConfig {
            max_chars: 60,
            overlap_chars: 0,
            fallback_window_lines: 5,
            ..ChunkerConfig::default()
        });
        let chunks = chunker.chunk(&doc);
        assert_eq!(strip_ws(&reconstruct(&chunks)), strip_ws(&doc));
        for c in &chunks {
            assert!(c.text.lines().count() <= 5);
        }
    }

    #[test]
    fn test_coverage_with_overlap() {
        let mut doc = String::new();
        for i in 0..12 {
            doc.push_str(&format!(
                "Paragraph {} explains how the next form behaves in detail.\n",
                i
            ));
            doc.push_str(&format!(
                "(defun f{} (a b)\n  (let ((c (cons a b)))\n    (car c)))\n\n",
                i
            ));
        }
        let chunks = small(48, 12).chunk(&doc);
        assert!(chunks.iter().any(|c| c.overlap > 0));
        assert_eq!(strip_ws(&reconstruct(&chunks)), strip_ws(&doc));
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let doc = (0..60)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = small(40, 8).chunk(&doc);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            assert!(cur.text.len() <= 40);
            assert!(prev.text.ends_with(&cur.text[..cur.overlap]));
        }
    }

    #[test]
    fn test_prose_paragraphs_pack_under_limit() {
        let doc = "Alpha.\n\nBeta.\n\nGamma.";
        let chunks = Chunker::lisp(ChunkerConfig::default()).chunk(doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Alpha.\n\nBeta.\n\nGamma.");
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let doc = "┌──────────────────┐\n│ (defun ünïcode () nil) │\n└──────────────────┘";
        let chunks = small(7, 2).chunk(doc);
        assert!(!chunks.is_empty());
        assert_eq!(strip_ws(&reconstruct(&chunks)), strip_ws(doc));
    }

    #[test]
    fn test_deterministic() {
        let doc = "Alpha\n(setq x 1)\nBeta\n\n(defun g () (list 1 2))\n\nGamma";
        let chunker = small(20, 4);
        assert_eq!(chunker.chunk(doc), chunker.chunk(doc));
    }

    #[test]
    fn test_chunk_document_tags_origin() {
        let chunker = Chunker::lisp(ChunkerConfig::default());
        let chunks = chunker.chunk_document("Intro.\n(setq x (car y))", "docs/a.txt");
        assert!(chunks.iter().all(|c| c.origin_path == "docs/a.txt"));
        let code = chunks.iter().find(|c| c.role == Role::Code).unwrap();
        assert_eq!(code.context.as_deref(), Some("Intro."));
    }
}
