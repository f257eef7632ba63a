//! Sibling output files for a translated input.
//!
//! `sys/foo.lisp` produces `sys/foo.autot` (artifact), `sys/foo.comment`
//! (rationale), and `sys/foo.think` (reasoning). Only non-empty fields are
//! written.

use std::path::{Path, PathBuf};

use autot_core::parse::ParsedResponse;
use autot_core::Error;

use crate::config::OutputConfig;

/// Paths of files written for one input, for rollback.
#[derive(Debug, Default)]
pub struct WrittenOutputs {
    pub paths: Vec<PathBuf>,
}

impl WrittenOutputs {
    /// Best-effort removal of everything written.
    pub fn remove(self) {
        for path in self.paths {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove output");
            }
        }
    }
}

pub fn sibling_path(input: &Path, ext: &str) -> PathBuf {
    input.with_extension(ext)
}

/// Write the artifact and any rationale or reasoning next to `input`.
///
/// On failure, files already written for this input are removed again.
pub fn write_outputs(
    input: &Path,
    parsed: &ParsedResponse,
    config: &OutputConfig,
) -> autot_core::Result<WrittenOutputs> {
    let planned = [
        (config.artifact_ext.as_str(), Some(parsed.artifact.as_str())),
        (config.rationale_ext.as_str(), parsed.rationale.as_deref()),
        (config.reasoning_ext.as_str(), parsed.reasoning.as_deref()),
    ];

    let mut written = WrittenOutputs::default();
    for (ext, content) in planned {
        let Some(content) = content else {
            continue;
        };
        let path = sibling_path(input, ext);
        let mut body = content.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        if let Err(source) = std::fs::write(&path, body) {
            written.remove();
            return Err(Error::Output { path, source });
        }
        written.paths.push(path);
    }
    Ok(written)
}
