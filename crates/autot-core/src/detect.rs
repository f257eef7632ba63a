//! Heuristic code detection.
//!
//! A [`Detector`] scores how code-like a piece of text looks, in `[0, 1]`.
//! Strategies are interchangeable and picked by configuration through
//! [`DetectorKind`]:
//!
//! | Kind | Strategy |
//! |------|----------|
//! | `delimiter` | [`DelimiterDetector`]: balance, density and nesting of delimiters |
//! | `keyword` | [`KeywordDetector`]: share of tokens that are language keywords |
//! | `indentation` | [`IndentationDetector`]: share of indented lines |
//! | `lisp` | weighted [`CompositeDetector`] of delimiter (0.6) and keyword (0.4) |
//!
//! All strategies read delimiters, comments, and keywords from a [`Syntax`].

use std::collections::HashSet;

use serde::Deserialize;

use crate::normalize::strip_line_comments;

/// Density of delimiters among non-blank characters at which the density
/// component saturates.
const DELIMITER_DENSITY_SATURATION: f32 = 0.15;

/// Share of keyword tokens at which the keyword score saturates.
const KEYWORD_SATURATION: f32 = 0.15;

/// Lexical description of the source language.
#[derive(Debug, Clone, PartialEq)]
pub struct Syntax {
    pub open: char,
    pub close: char,
    pub line_comment: Option<String>,
    pub string_quote: Option<char>,
    /// Character literal prefix; the character after it is taken literally
    /// (`#\(` in Lisp).
    pub char_prefix: Option<String>,
    pub keywords: Vec<String>,
}

impl Syntax {
    /// Lisp family defaults.
    pub fn lisp() -> Self {
        let keywords = [
            "defun",
            "defmacro",
            "defvar",
            "defparameter",
            "defconstant",
            "defclass",
            "defmethod",
            "defgeneric",
            "defstruct",
            "defpackage",
            "defflavor",
            "defsubst",
            "in-package",
            "lambda",
            "setq",
            "setf",
            "let",
            "let*",
            "progn",
            "prog1",
            "cond",
            "funcall",
            "multiple-value-bind",
            "destructuring-bind",
            "flet",
            "labels",
            "car",
            "cdr",
            "cons",
            "nil",
            "declare",
            "unwind-protect",
        ];
        Self {
            open: '(',
            close: ')',
            line_comment: Some(";".to_string()),
            string_quote: Some('"'),
            char_prefix: Some("#\\".to_string()),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for Syntax {
    fn default() -> Self {
        Self::lisp()
    }
}

/// Scores text for code-likeness.
pub trait Detector: Send + Sync {
    /// Strategy name, as used in configuration.
    fn name(&self) -> &str;

    /// Returns a score in `[0, 1]`; higher means more code-like.
    fn score(&self, text: &str) -> f32;
}

/// Detector selection in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Delimiter,
    Keyword,
    Indentation,
    #[default]
    Lisp,
}

impl DetectorKind {
    pub fn build(self, syntax: &Syntax) -> Box<dyn Detector> {
        match self {
            DetectorKind::Delimiter => Box::new(DelimiterDetector::new(syntax.clone())),
            DetectorKind::Keyword => Box::new(KeywordDetector::new(syntax.clone())),
            DetectorKind::Indentation => Box::new(IndentationDetector),
            DetectorKind::Lisp => Box::new(CompositeDetector::new(
                "lisp",
                vec![
                    (
                        Box::new(DelimiterDetector::new(syntax.clone())) as Box<dyn Detector>,
                        0.6,
                    ),
                    (Box::new(KeywordDetector::new(syntax.clone())), 0.4),
                ],
            )),
        }
    }
}

/// Incremental, string- and comment-aware delimiter scanner.
///
/// Fed line by line during segmentation so a form can span lines; string
/// state carries across calls, comment state ends at each newline.
#[derive(Debug, Clone, Default)]
pub struct DelimiterScanner {
    depth: usize,
    max_depth: usize,
    opens: usize,
    closes: usize,
    dense_chars: usize,
    in_string: bool,
    escaped: bool,
    underflow: bool,
}

impl DelimiterScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, text: &str, syntax: &Syntax) {
        let mut in_comment = false;
        let mut literal_end = 0;
        for (i, c) in text.char_indices() {
            if i < literal_end {
                self.dense_chars += 1;
                continue;
            }
            if in_comment {
                if c == '\n' {
                    in_comment = false;
                }
                continue;
            }
            if self.in_string {
                if !c.is_whitespace() {
                    self.dense_chars += 1;
                }
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if Some(c) == syntax.string_quote {
                    self.in_string = false;
                }
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            if let Some(end) = char_literal_end(text, i, syntax) {
                literal_end = end;
                self.dense_chars += 1;
                continue;
            }
            if let Some(prefix) = syntax.line_comment.as_deref() {
                if !prefix.is_empty() && text[i..].starts_with(prefix) {
                    in_comment = true;
                    continue;
                }
            }
            self.dense_chars += 1;
            if Some(c) == syntax.string_quote {
                self.in_string = true;
            } else if c == syntax.open {
                self.opens += 1;
                self.depth += 1;
                self.max_depth = self.max_depth.max(self.depth);
            } else if c == syntax.close {
                self.closes += 1;
                if self.depth == 0 {
                    self.underflow = true;
                } else {
                    self.depth -= 1;
                }
            }
        }
    }

    /// Every opened delimiter is closed, none closed early, no open string.
    pub fn is_balanced(&self) -> bool {
        self.depth == 0 && !self.underflow && !self.in_string
    }

    /// A close delimiter appeared with nothing open.
    pub fn underflowed(&self) -> bool {
        self.underflow
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Share of non-blank, non-comment characters that are delimiters.
    pub fn density(&self) -> f32 {
        if self.dense_chars == 0 {
            return 0.0;
        }
        (self.opens + self.closes) as f32 / self.dense_chars as f32
    }

    pub fn opens(&self) -> usize {
        self.opens
    }
}

/// Byte offset just past a character literal starting at `i`, if one does.
pub fn char_literal_end(text: &str, i: usize, syntax: &Syntax) -> Option<usize> {
    let prefix = syntax.char_prefix.as_deref().filter(|p| !p.is_empty())?;
    if !text[i..].starts_with(prefix) {
        return None;
    }
    let after = i + prefix.len();
    let next = text[after..].chars().next().map_or(0, char::len_utf8);
    Some(after + next)
}

/// Balanced, dense, nested delimiters.
///
/// Unbalanced or delimiter-free text scores `0`. Otherwise the score is the
/// mean of a density component and a nesting component (depth 1 counts for
/// nothing, depth 3 and deeper saturates), so a parenthetical remark in
/// prose stays well below a nested form.
#[derive(Debug, Clone)]
pub struct DelimiterDetector {
    syntax: Syntax,
}

impl DelimiterDetector {
    pub fn new(syntax: Syntax) -> Self {
        Self { syntax }
    }
}

impl Detector for DelimiterDetector {
    fn name(&self) -> &str {
        "delimiter"
    }

    fn score(&self, text: &str) -> f32 {
        let mut scanner = DelimiterScanner::new();
        scanner.feed(text, &self.syntax);
        if scanner.opens() == 0 || !scanner.is_balanced() {
            return 0.0;
        }
        let density = (scanner.density() / DELIMITER_DENSITY_SATURATION).min(1.0);
        let nesting = ((scanner.max_depth().saturating_sub(1)) as f32 / 2.0).min(1.0);
        0.5 * density + 0.5 * nesting
    }
}

/// Share of tokens that are keywords of the source language.
#[derive(Debug, Clone)]
pub struct KeywordDetector {
    syntax: Syntax,
    keywords: HashSet<String>,
}

impl KeywordDetector {
    pub fn new(syntax: Syntax) -> Self {
        let keywords = syntax.keywords.iter().map(|k| k.to_lowercase()).collect();
        Self { syntax, keywords }
    }

    fn is_separator(&self, c: char) -> bool {
        c.is_whitespace()
            || c == self.syntax.open
            || c == self.syntax.close
            || Some(c) == self.syntax.string_quote
    }
}

impl Detector for KeywordDetector {
    fn name(&self) -> &str {
        "keyword"
    }

    fn score(&self, text: &str) -> f32 {
        let mut total = 0usize;
        let mut hits = 0usize;
        let code = strip_line_comments(text, &self.syntax);
        for token in code.split(|c| self.is_separator(c)).filter(|t| !t.is_empty()) {
            total += 1;
            if self.keywords.contains(&token.to_lowercase()) {
                hits += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        ((hits as f32 / total as f32) / KEYWORD_SATURATION).min(1.0)
    }
}

/// Share of non-blank lines indented by a tab or at least two spaces.
///
/// Suited to indentation-structured languages; single lines score `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndentationDetector;

impl Detector for IndentationDetector {
    fn name(&self) -> &str {
        "indentation"
    }

    fn score(&self, text: &str) -> f32 {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            return 0.0;
        }
        let indented = lines
            .iter()
            .filter(|l| l.starts_with('\t') || l.starts_with("  "))
            .count();
        indented as f32 / lines.len() as f32
    }
}

/// Weighted mean of other detectors.
pub struct CompositeDetector {
    name: String,
    parts: Vec<(Box<dyn Detector>, f32)>,
}

impl CompositeDetector {
    pub fn new(name: impl Into<String>, parts: Vec<(Box<dyn Detector>, f32)>) -> Self {
        Self {
            name: name.into(),
            parts,
        }
    }
}

impl Detector for CompositeDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, text: &str) -> f32 {
        let total_weight: f32 = self.parts.iter().map(|(_, w)| *w).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = self.parts.iter().map(|(d, w)| d.score(text) * w).sum();
        weighted / total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f32 = 0.45;

    fn lisp() -> Box<dyn Detector> {
        DetectorKind::Lisp.build(&Syntax::lisp())
    }

    #[test]
    fn test_defun_is_code() {
        let score = lisp().score("(defun square (x) (* x x))");
        assert!(score >= THRESHOLD, "score {}", score);
    }

    #[test]
    fn test_nested_form_without_keywords_is_code() {
        assert!(lisp().score("(foo (bar (baz qux)))") >= THRESHOLD);
    }

    #[test]
    fn test_parenthetical_prose_is_not_code() {
        assert!(lisp().score("(see note)") < THRESHOLD);
        assert!(lisp().score("The function (see below) returns a value when called.") < THRESHOLD);
    }

    #[test]
    fn test_prose_without_delimiters_is_not_code() {
        assert!(lisp().score("Squares a number by multiplying it with itself.") < THRESHOLD);
    }

    #[test]
    fn test_unbalanced_scores_zero_on_delimiters() {
        let d = DelimiterDetector::new(Syntax::lisp());
        assert_eq!(d.score("(defun broken (x)"), 0.0);
        assert_eq!(d.score("x))"), 0.0);
    }

    #[test]
    fn test_scanner_ignores_strings_and_comments() {
        let mut s = DelimiterScanner::new();
        s.feed("(format t \"(((\") ; )))\n", &Syntax::lisp());
        assert!(s.is_balanced());
        assert_eq!(s.max_depth(), 1);
    }

    #[test]
    fn test_scanner_string_spans_lines() {
        let syntax = Syntax::lisp();
        let mut s = DelimiterScanner::new();
        s.feed("(defun f ()\n", &syntax);
        s.feed("  \"doc (\n", &syntax);
        assert!(!s.is_balanced());
        s.feed("  string\")\n", &syntax);
        assert!(s.is_balanced());
    }

    #[test]
    fn test_scanner_skips_character_literals() {
        let syntax = Syntax::lisp();
        for form in ["(char= c #\\()", "(char= c #\\))", "(list #\\; #\\\")"] {
            let mut s = DelimiterScanner::new();
            s.feed(form, &syntax);
            assert!(s.is_balanced(), "{}", form);
            assert_eq!(s.max_depth(), 1, "{}", form);
        }

        let without = Syntax {
            char_prefix: None,
            ..Syntax::lisp()
        };
        let mut s = DelimiterScanner::new();
        s.feed("(char= c #\\()", &without);
        assert!(!s.is_balanced());
    }

    #[test]
    fn test_indentation_detector() {
        let d = IndentationDetector;
        assert_eq!(d.score("single line"), 0.0);
        let block = "def f(x):\n    return x\n    pass";
        assert!((d.score(block) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_keyword_detector_ignores_comments() {
        let d = KeywordDetector::new(Syntax::lisp());
        assert_eq!(d.score("hello ; defun setq"), 0.0);
        assert_eq!(d.score("(setq x 1)"), 1.0);
    }

    #[test]
    fn test_kind_names() {
        let syntax = Syntax::lisp();
        assert_eq!(DetectorKind::Delimiter.build(&syntax).name(), "delimiter");
        assert_eq!(DetectorKind::Keyword.build(&syntax).name(), "keyword");
        assert_eq!(DetectorKind::Indentation.build(&syntax).name(), "indentation");
        assert_eq!(DetectorKind::Lisp.build(&syntax).name(), "lisp");
    }
}
