//! Prompt assembly.
//!
//! A prompt is laid out in fixed order:
//!
//! ```text
//! <instructions>
//!
//! Source Examples:
//! <entries or "None">
//!
//! Target Examples:
//! <entries or "None">
//!
//! Previous Translations:
//! <entries or "None">
//!
//! Code to translate:
//! <raw input>
//! ```
//!
//! When the prompt exceeds the character budget, the lowest-similarity
//! entries are dropped from Previous Translations first, then Target
//! Examples, then Source Examples. Instructions and raw input are never cut.

use crate::models::{ChunkRecord, Role};
use crate::parse::ResponseLabels;
use crate::retrieve::{ContextBundle, RetrievedChunk};

/// Default instruction template. `{artifact_label}`, `{rationale_label}`,
/// and `{reasoning_label}` are replaced by [`render_instructions`].
pub const DEFAULT_TEMPLATE: &str = "\
Translate this Lisp code to modern Common Lisp while preserving all functionality.
The Source Examples describe the language of the code you are given; use them to understand what it does.
The Target Examples describe the target implementation; adhere to them in your answer.
The Previous Translations are what you have produced so far in this project; stay consistent with them.

Proceed step by step: What is the expected input? What does the code do? \
How do you preserve all of its functionality in the target implementation?

Provide the translated code in a ```{artifact_label} block and explanations in a ```{rationale_label} block. \
If you include reasoning, wrap it in <{reasoning_label}>...</{reasoning_label}> or a ```{reasoning_label} block.";

const SOURCE_HEADER: &str = "Source Examples:";
const TARGET_HEADER: &str = "Target Examples:";
const PROJECT_HEADER: &str = "Previous Translations:";
const INPUT_HEADER: &str = "Code to translate:";

/// Fill the label placeholders of an instruction template.
pub fn render_instructions(template: &str, labels: &ResponseLabels) -> String {
    template
        .replace("{artifact_label}", &labels.artifact)
        .replace("{rationale_label}", &labels.rationale)
        .replace("{reasoning_label}", &labels.reasoning)
}

/// Render one retrieved record.
///
/// Code with paired prose renders as `Context: …` / `Code: …`; everything
/// else renders as its text.
pub fn render_entry(record: &ChunkRecord) -> String {
    match (&record.role, &record.context) {
        (Role::Code, Some(ctx)) => format!("Context: {}\nCode: {}", ctx, record.text),
        _ => record.text.clone(),
    }
}

/// Build the prompt for `raw_input`, trimming retrieved context to
/// `budget_chars` where possible.
///
/// If instructions and input alone exceed the budget, the prompt is
/// returned with every section reading `None`.
pub fn assemble(
    instructions: &str,
    bundle: &ContextBundle,
    raw_input: &str,
    budget_chars: usize,
) -> String {
    let source = rendered(&bundle.source);
    let target = rendered(&bundle.target);
    let project = rendered(&bundle.project);

    // Entries kept per section, in (source, target, project) order.
    let mut keep = [source.len(), target.len(), project.len()];
    let sections = [&source, &target, &project];

    let mut length = layout_len(instructions, &sections, &keep, raw_input);
    while length > budget_chars {
        // Project first, then Target, then Source.
        let Some(section) = (0..3).rev().find(|&s| keep[s] > 0) else {
            break;
        };
        keep[section] -= 1;
        length = layout_len(instructions, &sections, &keep, raw_input);
    }

    let dropped = source.len() + target.len() + project.len() - keep.iter().sum::<usize>();
    if dropped > 0 {
        tracing::debug!(
            dropped,
            kept_source = keep[0],
            kept_target = keep[1],
            kept_project = keep[2],
            "trimmed prompt context to budget"
        );
    }

    let prompt = layout(instructions, &sections, &keep, raw_input);
    if prompt.len() > budget_chars {
        tracing::warn!(
            length = prompt.len(),
            budget = budget_chars,
            "prompt exceeds budget with all context dropped"
        );
    }
    prompt
}

fn rendered(entries: &[RetrievedChunk]) -> Vec<String> {
    entries.iter().map(|e| render_entry(&e.record)).collect()
}

fn section_body(entries: &[String]) -> String {
    if entries.is_empty() {
        "None".to_string()
    } else {
        entries.join("\n\n")
    }
}

fn layout(instructions: &str, sections: &[&Vec<String>; 3], keep: &[usize; 3], raw_input: &str) -> String {
    let headers = [SOURCE_HEADER, TARGET_HEADER, PROJECT_HEADER];
    let mut out = String::new();
    out.push_str(instructions);
    out.push_str("\n\n");
    for ((header, entries), n) in headers.iter().zip(sections.iter()).zip(keep.iter()) {
        out.push_str(header);
        out.push('\n');
        out.push_str(&section_body(&entries[..*n]));
        out.push_str("\n\n");
    }
    out.push_str(INPUT_HEADER);
    out.push('\n');
    out.push_str(raw_input);
    out
}

fn layout_len(instructions: &str, sections: &[&Vec<String>; 3], keep: &[usize; 3], raw_input: &str) -> usize {
    layout(instructions, sections, keep, raw_input).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewChunk;

    fn entry(text: &str, role: Role, context: Option<&str>, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            record: ChunkRecord::new(
                NewChunk::new(text, role, "doc").with_context(context.map(String::from)),
                vec![1.0],
            ),
            similarity,
        }
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            source: vec![
                entry("(car x)", Role::Code, Some("First element."), 0.9),
                entry("Lists are conses.", Role::Prose, None, 0.5),
            ],
            target: vec![
                entry("(first x)", Role::Code, Some("Modern accessor."), 0.8),
                entry("Use FIRST over CAR.", Role::Prose, None, 0.4),
            ],
            project: vec![
                entry("(defun head (l) (first l))", Role::Code, None, 0.7),
                entry("(defun tail (l) (rest l))", Role::Code, None, 0.3),
            ],
        }
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let prompt = assemble("INSTR", &bundle(), "(car y)", usize::MAX);
        let positions: Vec<usize> = [
            "INSTR",
            "Source Examples:",
            "Target Examples:",
            "Previous Translations:",
            "Code to translate:\n(car y)",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("Context: First element.\nCode: (car x)"));
        assert!(prompt.contains("Lists are conses."));
    }

    #[test]
    fn test_empty_sections_render_none() {
        let prompt = assemble("INSTR", &ContextBundle::default(), "x", usize::MAX);
        assert_eq!(
            prompt,
            "INSTR\n\nSource Examples:\nNone\n\nTarget Examples:\nNone\n\n\
             Previous Translations:\nNone\n\nCode to translate:\nx"
        );
    }

    #[test]
    fn test_budget_drops_project_first() {
        let full = assemble("INSTR", &bundle(), "(car y)", usize::MAX);
        // Just enough room to lose the weakest project entry.
        let budget = full.len() - 1;
        let prompt = assemble("INSTR", &bundle(), "(car y)", budget);
        assert!(prompt.len() <= budget);
        assert!(prompt.contains("(defun head (l) (first l))"));
        assert!(!prompt.contains("(defun tail (l) (rest l))"));
        assert!(prompt.contains("Use FIRST over CAR."));
        assert!(prompt.contains("Lists are conses."));
    }

    #[test]
    fn test_budget_drops_target_before_source() {
        let none = assemble("INSTR", &ContextBundle::default(), "(car y)", usize::MAX);
        let mut only_source = bundle();
        only_source.target.clear();
        only_source.project.clear();
        let budget = assemble("INSTR", &only_source, "(car y)", usize::MAX).len();
        assert!(budget > none.len());

        let prompt = assemble("INSTR", &bundle(), "(car y)", budget);
        assert!(prompt.contains("Lists are conses."));
        assert!(prompt.contains("Code: (car x)"));
        assert!(!prompt.contains("(first x)"));
        assert!(!prompt.contains("(defun head"));
        assert!(prompt.contains("Previous Translations:\nNone"));
    }

    #[test]
    fn test_input_and_instructions_never_cut() {
        let input = "(defun big () ".to_string() + &"x".repeat(500) + ")";
        let prompt = assemble("INSTR", &bundle(), &input, 10);
        assert!(prompt.starts_with("INSTR"));
        assert!(prompt.ends_with(&input));
        assert!(prompt.contains("Source Examples:\nNone"));
    }

    #[test]
    fn test_render_instructions_uses_labels() {
        let labels = ResponseLabels {
            artifact: "scheme".into(),
            ..ResponseLabels::default()
        };
        let text = render_instructions(DEFAULT_TEMPLATE, &labels);
        assert!(text.contains("```scheme block"));
        assert!(text.contains("```comments block"));
        assert!(text.contains("<think>...</think>"));
        assert!(!text.contains('{'));
    }
}
