//! Filesystem discovery for seed documentation and translation inputs.
//!
//! Both walks are sorted so that the order of store building and of
//! translation is deterministic across runs.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{InputConfig, OutputConfig};

/// Seed documentation formats picked up inside directories.
const DOC_GLOBS: &[&str] = &["**/*.txt", "**/*.html", "**/*.htm", "**/*.pdf"];

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Expand configured documentation paths into a sorted list of files.
///
/// A file path is taken as-is whatever its extension; a directory is
/// walked for txt, html, and pdf files. Missing paths are logged and
/// skipped.
pub fn discover_docs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(DOC_GLOBS.iter().copied())?;
    let exclude_set = build_globset(DEFAULT_EXCLUDES.iter().copied())?;
    let mut docs = Vec::new();

    for root in paths {
        if root.is_file() {
            docs.push(root.clone());
            continue;
        }
        if !root.is_dir() {
            tracing::warn!(path = %root.display(), "documentation path does not exist");
            continue;
        }
        docs.extend(walk(root, &include_set, &exclude_set)?);
    }

    docs.sort();
    docs.dedup();
    Ok(docs)
}

/// Collect translation inputs under `config.dir` matching the include
/// globs and none of the exclude globs.
///
/// Files carrying one of the output extensions are never inputs, so a
/// broad include glob cannot pick up translations written by earlier runs.
pub fn discover_inputs(config: &InputConfig, output: &OutputConfig) -> Result<Vec<PathBuf>> {
    let root = &config.dir;
    if !root.is_dir() {
        bail!("Input directory does not exist: {}", root.display());
    }

    let output_globs: Vec<String> = output
        .extensions()
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("**/*.{}", ext))
        .collect();

    let include_set = build_globset(config.include_globs.iter().map(String::as_str))?;
    let exclude_set = build_globset(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(config.exclude_globs.iter().map(String::as_str))
            .chain(output_globs.iter().map(String::as_str)),
    )?;

    let mut inputs = walk(root, &include_set, &exclude_set)?;
    inputs.sort();
    Ok(inputs)
}

/// Write one path per line, replacing any previous list.
pub fn write_pathlist(path: &Path, inputs: &[PathBuf]) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create path list: {}", path.display()))?;
    for input in inputs {
        writeln!(file, "{}", input.display())?;
    }
    file.flush()?;
    Ok(())
}

fn walk(root: &Path, include_set: &GlobSet, exclude_set: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    Ok(files)
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
