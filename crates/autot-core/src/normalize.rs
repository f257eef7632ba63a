//! Artifact normalization applied before a translated artifact is embedded
//! into the Project store.
//!
//! Normalization stabilizes `(text, origin)` dedup: two runs producing the
//! same artifact modulo formatting insert one record. The policy is chosen
//! in configuration.

use serde::Deserialize;

use crate::detect::{char_literal_end, Syntax};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizePolicy {
    /// Keep the artifact byte for byte.
    None,
    /// Collapse whitespace runs to one space and trim.
    Whitespace,
    /// Drop line comments outside string literals, then collapse whitespace.
    #[default]
    StripComments,
}

impl NormalizePolicy {
    pub fn apply(self, text: &str, syntax: &Syntax) -> String {
        match self {
            NormalizePolicy::None => text.to_string(),
            NormalizePolicy::Whitespace => collapse_whitespace(text),
            NormalizePolicy::StripComments => collapse_whitespace(&strip_line_comments(text, syntax)),
        }
    }
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

/// Remove line comments, leaving comment markers inside strings alone.
pub fn strip_line_comments(text: &str, syntax: &Syntax) -> String {
    let Some(prefix) = syntax.line_comment.as_deref().filter(|p| !p.is_empty()) else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;
    let mut literal_end = 0;

    for (i, c) in text.char_indices() {
        if i < literal_end {
            out.push(c);
            continue;
        }
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push(c);
            }
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if Some(c) == syntax.string_quote {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if let Some(end) = char_literal_end(text, i, syntax) {
            literal_end = end;
            out.push(c);
            continue;
        }
        if text[i..].starts_with(prefix) {
            in_comment = true;
            continue;
        }
        if Some(c) == syntax.string_quote {
            in_string = true;
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = "(defun helper-normalize (s)   ; trims input\n  (string-trim \" ;\" s))\n";

    #[test]
    fn test_none_keeps_text() {
        assert_eq!(NormalizePolicy::None.apply(ARTIFACT, &Syntax::lisp()), ARTIFACT);
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(
            NormalizePolicy::Whitespace.apply(ARTIFACT, &Syntax::lisp()),
            "(defun helper-normalize (s) ; trims input (string-trim \" ;\" s))"
        );
    }

    #[test]
    fn test_strip_comments_keeps_string_contents() {
        assert_eq!(
            NormalizePolicy::StripComments.apply(ARTIFACT, &Syntax::lisp()),
            "(defun helper-normalize (s) (string-trim \" ;\" s))"
        );
    }

    #[test]
    fn test_formatting_variants_normalize_equal() {
        let a = "(defun f (x)\n  (car x))";
        let b = "(defun f (x) ; first element\n    (car x))   ";
        let syntax = Syntax::lisp();
        assert_eq!(
            NormalizePolicy::StripComments.apply(a, &syntax),
            NormalizePolicy::StripComments.apply(b, &syntax)
        );
        assert_ne!(
            NormalizePolicy::Whitespace.apply(a, &syntax),
            NormalizePolicy::Whitespace.apply(b, &syntax)
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_character_literals_are_not_comments() {
        let syntax = Syntax::lisp();
        assert_eq!(
            strip_line_comments("(eql c #\\;) ; semicolon\n", &syntax),
            "(eql c #\\;) \n"
        );
        assert_eq!(
            strip_line_comments("(list #\\\" 'x) ; quote\n", &syntax),
            "(list #\\\" 'x) \n"
        );
    }

    #[test]
    fn test_no_comment_syntax() {
        let syntax = Syntax {
            line_comment: None,
            ..Syntax::lisp()
        };
        assert_eq!(strip_line_comments("a ; b", &syntax), "a ; b");
    }
}
