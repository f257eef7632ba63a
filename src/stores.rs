//! Store files on disk and store preparation.
//!
//! Source and Target stores are loaded from their JSON files when usable and
//! otherwise built from seed documentation and saved. The Project store is
//! loaded, or started empty when its file does not exist yet; a Project
//! file that exists but cannot be trusted stops the run, since rebuilding
//! it would discard translation history.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use autot_core::models::{NewChunk, Role, StoreKind};
use autot_core::store::schema::{Expected, PersistedStore};
use autot_core::store::VectorStore;
use autot_core::{Embedder, StoreIoError};

use crate::config::{ChunkingConfig, Config, SeedStoreConfig};
use crate::discover::discover_docs;
use crate::extract::extract_file;

/// How a store came to be in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    Loaded,
    Built,
    /// Rebuilt because the file could not be used.
    Rebuilt { reason: String },
}

impl std::fmt::Display for Preparation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preparation::Loaded => write!(f, "loaded"),
            Preparation::Built => write!(f, "built"),
            Preparation::Rebuilt { reason } => write!(f, "rebuilt ({})", reason),
        }
    }
}

/// Write `store` to `path` through a temporary file and rename, so a crash
/// never leaves a half-written store behind.
pub fn save_store(store: &VectorStore, path: &Path) -> autot_core::Result<()> {
    let io = |source: std::io::Error| StoreIoError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = PersistedStore::from_store(store).to_json()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, json).map_err(io)?;
    std::fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

/// Read and validate a store file.
pub fn load_store(path: &Path, expected: Expected<'_>) -> autot_core::Result<VectorStore> {
    let json = std::fs::read_to_string(path).map_err(|source| StoreIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PersistedStore::from_json(&json)?.into_store(expected)?)
}

/// Read a store file without checking it against an embedder.
pub fn read_store_file(path: &Path) -> autot_core::Result<PersistedStore> {
    let json = std::fs::read_to_string(path).map_err(|source| StoreIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PersistedStore::from_json(&json)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn expected<'a>(kind: StoreKind, embedder: &'a dyn Embedder) -> Expected<'a> {
    Expected {
        kind,
        model: embedder.model_name(),
        dims: embedder.dims(),
    }
}

/// Chunk every seed document under `docs`.
///
/// Unreadable documents are logged and skipped. Prose chunks with
/// `min_prose_words` words or fewer are dropped; code and its context are
/// always kept.
pub fn seed_chunks(docs: &[PathBuf], chunking: &ChunkingConfig) -> Result<Vec<NewChunk>> {
    let chunker = chunking.chunker();
    let mut chunks = Vec::new();

    for path in discover_docs(docs)? {
        let text = match extract_file(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), kind = e.kind(), error = %e, "skipping seed document");
                continue;
            }
        };
        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "seed document has no text");
            continue;
        }

        let origin = path.display().to_string();
        let before = chunks.len();
        chunks.extend(
            chunker
                .chunk_document(&text, &origin)
                .into_iter()
                .filter(|c| c.role != Role::Prose || c.text.split_whitespace().count() > chunking.min_prose_words),
        );
        tracing::info!(path = %origin, chunks = chunks.len() - before, "chunked seed document");
    }

    Ok(chunks)
}

/// Build a seed store from its documentation and save it.
pub async fn build_seed_store(
    kind: StoreKind,
    store_config: &SeedStoreConfig,
    config: &Config,
    embedder: &dyn Embedder,
) -> Result<VectorStore> {
    if store_config.docs.is_empty() {
        tracing::warn!(store = %kind, "no seed documentation configured; store will be empty");
    }
    let chunks = seed_chunks(&store_config.docs, &config.chunking)?;
    let store = VectorStore::build(kind, embedder, chunks, config.embedding.batch_size)
        .await
        .with_context(|| format!("Failed to build {} store", kind))?;
    save_store(&store, &store_config.path)
        .with_context(|| format!("Failed to save {} store", kind))?;
    Ok(store)
}

/// Load a seed store, building it when missing, forced, or unusable.
///
/// With `rebuild_on_error` unset, an unusable file is an error.
pub async fn prepare_seed_store(
    kind: StoreKind,
    config: &Config,
    embedder: &dyn Embedder,
    force: bool,
) -> Result<(VectorStore, Preparation)> {
    let store_config = match kind {
        StoreKind::Source => &config.stores.source,
        StoreKind::Target => &config.stores.target,
        StoreKind::Project => anyhow::bail!("project store is not built from seed documentation"),
    };
    let path = &store_config.path;

    if force || !path.exists() {
        let store = build_seed_store(kind, store_config, config, embedder).await?;
        tracing::info!(store = %kind, records = store.len(), path = %path.display(), "built store");
        return Ok((store, Preparation::Built));
    }

    match load_store(path, expected(kind, embedder)) {
        Ok(store) => {
            tracing::info!(store = %kind, records = store.len(), path = %path.display(), "loaded store");
            Ok((store, Preparation::Loaded))
        }
        Err(e) if config.stores.rebuild_on_error => {
            tracing::warn!(store = %kind, path = %path.display(), error = %e, "store unusable, rebuilding");
            let store = build_seed_store(kind, store_config, config, embedder).await?;
            Ok((store, Preparation::Rebuilt { reason: e.to_string() }))
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!(
            "Failed to load {} store {} (set stores.rebuild_on_error or run `autot build --force`)",
            kind,
            path.display()
        ))),
    }
}

/// Load the Project store, or start an empty one when no file exists.
pub fn open_project_store(path: &Path, embedder: &dyn Embedder) -> Result<VectorStore> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "starting empty project store");
        return Ok(VectorStore::new(
            StoreKind::Project,
            embedder.model_name(),
            embedder.dims(),
        ));
    }
    let store = load_store(path, expected(StoreKind::Project, embedder))
        .with_context(|| format!("Failed to load project store {}", path.display()))?;
    tracing::info!(records = store.len(), path = %path.display(), "loaded project store");
    Ok(store)
}
