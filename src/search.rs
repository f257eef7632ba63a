//! `autot search`: nearest-neighbour lookup against one store.
//!
//! Useful for checking what the retriever would put into a prompt. The
//! query is embedded with the configured provider, so the store must have
//! been built with the same model.

use anyhow::{bail, Result};

use autot_core::embedding::embed_one;
use autot_core::models::StoreKind;
use autot_core::store::schema::Expected;
use autot_core::store::VectorStore;
use autot_core::Embedder;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::stores::{load_store, open_project_store};

pub async fn run_search(config: &Config, query: &str, store: &str, k: Option<i64>) -> Result<()> {
    let kind = parse_store_kind(store)?;

    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = create_provider(&config.embedding)?;

    let store = open_store(config, kind, embedder.as_ref())?;
    let k = k.unwrap_or_else(|| match kind {
        StoreKind::Source => config.stores.source.k,
        StoreKind::Target => config.stores.target.k,
        StoreKind::Project => config.stores.project.k,
    });

    let vector = embed_one(embedder.as_ref(), query).await?;
    let results = store.query(&vector, k)?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, scored) in results.iter().enumerate() {
        let record = scored.record;
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            scored.similarity,
            record.role,
            record.origin_path
        );
        if let Some(context) = &record.context {
            println!("    context: \"{}\"", excerpt(context));
        }
        println!("    excerpt: \"{}\"", excerpt(&record.text));
        println!("    id: {}", record.id);
        println!();
    }
    Ok(())
}

fn parse_store_kind(name: &str) -> Result<StoreKind> {
    match name {
        "source" => Ok(StoreKind::Source),
        "target" => Ok(StoreKind::Target),
        "project" => Ok(StoreKind::Project),
        _ => bail!("Unknown store: {}. Use source, target, or project.", name),
    }
}

fn open_store(config: &Config, kind: StoreKind, embedder: &dyn Embedder) -> Result<VectorStore> {
    let path = match kind {
        StoreKind::Source => &config.stores.source.path,
        StoreKind::Target => &config.stores.target.path,
        StoreKind::Project => return open_project_store(&config.stores.project.path, embedder),
    };
    if !path.exists() {
        bail!(
            "{} store not found at {}. Run `autot build` first.",
            kind,
            path.display()
        );
    }
    let expected = Expected {
        kind,
        model: embedder.model_name(),
        dims: embedder.dims(),
    };
    Ok(load_store(path, expected)?)
}

/// First 160 characters on one line.
fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(160) {
        Some((end, _)) => format!("{}…", &flat[..end]),
        None => flat.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_kind() {
        assert_eq!(parse_store_kind("project").unwrap(), StoreKind::Project);
        assert!(parse_store_kind("docs").is_err());
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("(defun f ()\n  nil)"), "(defun f ()   nil)");
        let long = "x".repeat(200);
        assert_eq!(excerpt(&long).chars().count(), 161);
    }
}
