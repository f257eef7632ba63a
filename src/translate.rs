//! `autot build` and `autot translate`.
//!
//! Both prepare the Source and Target stores first; `translate` then opens
//! project memory and runs the batch over the discovered inputs.

use anyhow::{bail, Result};
use std::path::PathBuf;

use autot_core::models::StoreKind;
use autot_core::{Embedder, Generator};

use crate::config::Config;
use crate::discover::{discover_inputs, write_pathlist};
use crate::embedding::create_provider;
use crate::generation::OllamaGenerator;
use crate::ledger::Ledger;
use crate::memory::ProjectMemory;
use crate::pipeline::{JobOutcome, TranslateSettings, Translator};
use crate::stores::{open_project_store, prepare_seed_store};

fn require_embeddings(config: &Config, command: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!(
            "`{}` requires embeddings. Set [embedding] provider in config.",
            command
        );
    }
    Ok(())
}

pub async fn run_build(config: &Config, force: bool) -> Result<()> {
    require_embeddings(config, "build")?;
    let embedder = create_provider(&config.embedding)?;

    println!("build");
    for kind in [StoreKind::Source, StoreKind::Target] {
        let (store, preparation) = prepare_seed_store(kind, config, embedder.as_ref(), force).await?;
        println!("  {} store: {} records ({})", kind, store.len(), preparation);
    }
    println!("ok");
    Ok(())
}

pub async fn run_translate(config: &Config, input_dir: Option<PathBuf>, verbose: bool) -> Result<()> {
    require_embeddings(config, "translate")?;
    let embedder = create_provider(&config.embedding)?;
    let generator =
        OllamaGenerator::new(&config.generation)?.with_verbose(verbose || config.generation.verbose);
    tracing::info!(
        embedder = embedder.model_name(),
        generator = generator.model_name(),
        "translating with"
    );

    let mut input = config.input.clone();
    if let Some(dir) = input_dir {
        input.dir = dir;
    }
    let inputs = discover_inputs(&input, &config.output)?;
    if let Some(list) = &input.pathlist {
        write_pathlist(list, &inputs)?;
    }

    let (source, _) = prepare_seed_store(StoreKind::Source, config, embedder.as_ref(), false).await?;
    let (target, _) = prepare_seed_store(StoreKind::Target, config, embedder.as_ref(), false).await?;

    let project_path = config.stores.project.path.clone();
    let project = open_project_store(&project_path, embedder.as_ref())?;
    let ledger = Ledger::open(&config.ledger.path)?;
    let mut memory = ProjectMemory::new(
        project,
        Some(project_path),
        ledger,
        config.memory.normalize,
        config.chunking.syntax.to_syntax(),
    );

    let settings = TranslateSettings::from_config(config)?;
    let mut translator = Translator::new(embedder.as_ref(), &generator, &source, &target, settings);
    let report = translator.run_batch(&mut memory, &inputs).await;
    let project = memory.close()?;

    println!("translate {}", input.dir.display());
    println!("  inputs: {}", inputs.len());
    println!("  done: {}", report.done());
    println!("  skipped: {}", report.skipped());
    println!("  failed: {}", report.failed());
    for file in report.failures() {
        if let JobOutcome::Failed {
            stage,
            kind,
            message,
        } = &file.outcome
        {
            println!("    {} [{} while {}]: {}", file.path.display(), kind, stage, message);
        }
    }
    println!("  project records: {}", project.len());

    if report.failed() > 0 {
        bail!("{} of {} inputs failed", report.failed(), inputs.len());
    }
    println!("ok");
    Ok(())
}
