//! Append-only processing ledger.
//!
//! One processed input path per line. A path is appended only after its
//! translation has been fully ingested, so the ledger is the commit record
//! for resuming an interrupted batch. Each append is flushed and synced
//! before returning; dropping a [`Ledger`] flushes whatever is buffered.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use autot_core::StoreIoError;

pub struct Ledger {
    path: Option<PathBuf>,
    entries: Vec<String>,
    index: HashSet<String>,
    writer: Option<BufWriter<File>>,
}

impl Ledger {
    /// Open (or create) the ledger file at `path` and read its entries.
    ///
    /// Blank lines and repeated paths are ignored. A final line left
    /// without a newline by an interrupted write is terminated first so
    /// the next append starts on its own line.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open ledger: {}", path.display()))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read ledger: {}", path.display()))?;

        let mut ledger = Self {
            path: Some(path.to_path_buf()),
            entries: Vec::new(),
            index: HashSet::new(),
            writer: None,
        };
        for entry in parse_entries(&content) {
            ledger.index.insert(entry.clone());
            ledger.entries.push(entry);
        }

        if !content.is_empty() && !content.ends_with('\n') {
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        ledger.writer = Some(BufWriter::new(file));

        tracing::debug!(path = %path.display(), entries = ledger.entries.len(), "opened ledger");
        Ok(ledger)
    }

    /// Entries of the ledger at `path` without opening it for writing.
    /// A missing file has no entries.
    pub fn read_entries(path: &Path) -> Result<Vec<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(parse_entries(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read ledger: {}", path.display()))),
        }
    }

    /// A ledger that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Vec::new(),
            index: HashSet::new(),
            writer: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were committed.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Record `key` as processed. Returns `false` if it already was.
    ///
    /// The entry is durable when this returns `Ok`.
    pub fn append(&mut self, key: &str) -> autot_core::Result<bool> {
        if key.contains(['\n', '\r']) || key.trim().is_empty() || key.trim() != key {
            return Err(self.io_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot record {:?} in a line-based ledger", key),
            )));
        }
        if self.contains(key) {
            return Ok(false);
        }

        if let Some(writer) = self.writer.as_mut() {
            let written = writeln!(writer, "{}", key)
                .and_then(|_| writer.flush())
                .and_then(|_| writer.get_ref().sync_data());
            if let Err(e) = written {
                return Err(self.io_error(e));
            }
        }

        self.index.insert(key.to_string());
        self.entries.push(key.to_string());
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> autot_core::Error {
        StoreIoError::Io {
            path: self.path.clone().unwrap_or_default(),
            source,
        }
        .into()
    }
}

fn parse_entries(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && seen.insert(*entry))
        .map(str::to_string)
        .collect()
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
