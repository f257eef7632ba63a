//! End-to-end batch runs with deterministic embedding and generation.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use autot::config::Config;
use autot::ledger::Ledger;
use autot::memory::ProjectMemory;
use autot::pipeline::{input_key, JobOutcome, Stage, TranslateSettings, Translator};
use autot::stores::{open_project_store, read_store_file};
use autot_core::detect::Syntax;
use autot_core::models::{NewChunk, Role, StoreKind};
use autot_core::normalize::NormalizePolicy;
use autot_core::store::VectorStore;
use autot_core::{Embedder, Error, Generator};

const DIMS: usize = 16;

/// Bag of hashed tokens, with a constant component so no vector is zero.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> autot_core::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[0] = 1.0;
    for token in text.split(|c: char| !c.is_alphanumeric() && c != '-') {
        if token.is_empty() {
            continue;
        }
        let h = token
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
        v[1 + (h as usize % (DIMS - 1))] += 1.0;
    }
    v
}

/// Translates `car` to `first`. Inputs containing `FAIL-GEN` fail and
/// inputs containing `NO-FENCE` get an answer without a code block.
#[derive(Default)]
struct ScriptedGenerator {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompt(&self, n: usize) -> String {
        self.prompts.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> autot_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let (_, code) = prompt
            .rsplit_once("Code to translate:\n")
            .ok_or_else(|| Error::Generation("prompt without input".to_string()))?;
        if code.contains("FAIL-GEN") {
            return Err(Error::Generation("model unavailable".to_string()));
        }
        if code.contains("NO-FENCE") {
            return Ok("I am not sure what this does.".to_string());
        }
        Ok(format!(
            "<think>map car to first</think>\n```lisp\n{}\n```\n```comments\nCAR becomes FIRST.\n```\n",
            code.trim().replace("car", "first")
        ))
    }
}

struct Env {
    _tmp: TempDir,
    root: PathBuf,
    source: VectorStore,
    target: VectorStore,
}

impl Env {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();

        let source = VectorStore::build(
            StoreKind::Source,
            &HashEmbedder,
            vec![
                NewChunk::new("(car list) returns the first element", Role::Code, "src.txt"),
                NewChunk::new("(cdr list) returns the rest", Role::Code, "src.txt"),
            ],
            8,
        )
        .await
        .unwrap();
        let target = VectorStore::build(
            StoreKind::Target,
            &HashEmbedder,
            vec![NewChunk::new("(first list) is preferred over car", Role::Code, "trg.txt")],
            8,
        )
        .await
        .unwrap();

        Self {
            _tmp: tmp,
            root,
            source,
            target,
        }
    }

    fn input(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn store_path(&self) -> PathBuf {
        self.root.join("done_db.json")
    }

    fn ledger_path(&self) -> PathBuf {
        self.root.join("processed_files.txt")
    }

    fn open_memory(&self) -> ProjectMemory {
        let store = open_project_store(&self.store_path(), &HashEmbedder).unwrap();
        ProjectMemory::new(
            store,
            Some(self.store_path()),
            Ledger::open(&self.ledger_path()).unwrap(),
            NormalizePolicy::StripComments,
            Syntax::lisp(),
        )
    }

    fn translator<'a>(&'a self, generator: &'a ScriptedGenerator) -> Translator<'a> {
        let settings = TranslateSettings::from_config(&Config::default()).unwrap();
        Translator::new(&HashEmbedder, generator, &self.source, &self.target, settings)
    }
}

fn ledger_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_batch_writes_outputs_and_grows_project_memory() {
    let env = Env::new().await;
    let a = env.input("a.lisp", "(defun head (l) (car l))");
    let b = env.input("b.lisp", "(defun second-of (l) (car (cdr l)))");

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    let report = env
        .translator(&generator)
        .run_batch(&mut memory, &[a.clone(), b.clone()])
        .await;
    let project = memory.close().unwrap();

    assert_eq!((report.done(), report.skipped(), report.failed()), (2, 0, 0));
    assert_eq!(
        fs::read_to_string(env.root.join("a.autot")).unwrap(),
        "(defun head (l) (first l))\n"
    );
    assert_eq!(
        fs::read_to_string(env.root.join("a.comment")).unwrap(),
        "CAR becomes FIRST.\n"
    );
    assert_eq!(
        fs::read_to_string(env.root.join("a.think")).unwrap(),
        "map car to first\n"
    );

    assert_eq!(ledger_lines(&env.ledger_path()), vec![input_key(&a), input_key(&b)]);
    assert_eq!(project.len(), 2);
    assert_eq!(project.records()[0].origin_path, input_key(&a));
    assert_eq!(read_store_file(&env.store_path()).unwrap().count, 2);

    // The first translation is offered to the second job.
    let first_prompt = generator.prompt(0);
    let second_prompt = generator.prompt(1);
    assert!(first_prompt.contains("Previous Translations:\nNone"));
    assert!(second_prompt.contains("Previous Translations:\n(defun head (l) (first l))"));
    assert!(second_prompt.contains("(car list) returns the first element"));
    assert!(second_prompt.contains("Target Examples:\n(first list) is preferred over car"));
}

#[tokio::test]
async fn test_rerun_resumes_without_duplicates() {
    let env = Env::new().await;
    let inputs = vec![
        env.input("a.lisp", "(car x)"),
        env.input("b.lisp", "(car y)"),
    ];

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    env.translator(&generator).run_batch(&mut memory, &inputs[..1]).await;
    memory.close().unwrap();
    assert_eq!(generator.calls(), 1);

    // Restart with the persisted store and ledger over the full list.
    let mut memory = env.open_memory();
    let report = env.translator(&generator).run_batch(&mut memory, &inputs).await;
    assert_eq!(report.files[0].outcome, JobOutcome::Skipped);
    assert_eq!(report.files[1].outcome, JobOutcome::Done { inserted: true });
    memory.close().unwrap();
    assert_eq!(generator.calls(), 2);

    let mut memory = env.open_memory();
    let report = env.translator(&generator).run_batch(&mut memory, &inputs).await;
    assert_eq!(report.skipped(), 2);
    assert_eq!(memory.store().len(), 2);
    assert_eq!(memory.ledger().len(), 2);
    assert_eq!(generator.calls(), 2);
    assert_eq!(ledger_lines(&env.ledger_path()).len(), 2);
}

#[tokio::test]
async fn test_failed_file_leaves_no_trace_and_batch_continues() {
    let env = Env::new().await;
    let inputs = vec![
        env.input("a.lisp", "(car a)"),
        env.input("b.lisp", "(car b) ; FAIL-GEN"),
        env.input("c.lisp", "(car c)"),
    ];

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    let report = env.translator(&generator).run_batch(&mut memory, &inputs).await;

    assert_eq!((report.done(), report.failed()), (2, 1));
    match &report.files[1].outcome {
        JobOutcome::Failed { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Generating);
            assert_eq!(*kind, "GenerationError");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(generator.calls(), 3);

    assert!(!env.root.join("b.autot").exists());
    assert!(!env.root.join("b.comment").exists());
    assert!(env.root.join("c.autot").exists());
    assert!(!memory.is_processed(&input_key(&inputs[1])));
    assert_eq!(memory.store().len(), 2);
    assert!(memory
        .store()
        .records()
        .iter()
        .all(|r| r.origin_path != input_key(&inputs[1])));
    memory.close().unwrap();
    assert_eq!(
        ledger_lines(&env.ledger_path()),
        vec![input_key(&inputs[0]), input_key(&inputs[2])]
    );
}

#[tokio::test]
async fn test_unparseable_response_fails_in_parsing() {
    let env = Env::new().await;
    let input = env.input("odd.lisp", "(car z) ; NO-FENCE");

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    let outcome = env.translator(&generator).run_job(&mut memory, &input).await;

    match outcome {
        JobOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::Parsing);
            assert_eq!(kind, "OutputParseError");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!env.root.join("odd.autot").exists());
    assert!(memory.store().is_empty());
    assert!(memory.ledger().is_empty());
}

#[tokio::test]
async fn test_missing_input_is_input_error() {
    let env = Env::new().await;
    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    let outcome = env
        .translator(&generator)
        .run_job(&mut memory, &env.root.join("gone.lisp"))
        .await;

    match outcome {
        JobOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::Retrieving);
            assert_eq!(kind, "InputError");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_store_save_failure_removes_outputs() {
    let env = Env::new().await;
    let input = env.input("a.lisp", "(car a)");

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    // Occupy the store path with a non-empty directory so the save fails.
    fs::create_dir_all(env.store_path().join("occupied")).unwrap();

    let outcome = env.translator(&generator).run_job(&mut memory, &input).await;
    match outcome {
        JobOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::Ingesting);
            assert_eq!(kind, "StoreIOError");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!env.root.join("a.autot").exists());
    assert!(!env.root.join("a.think").exists());
    assert!(memory.store().is_empty());
    assert!(memory.ledger().is_empty());
}

#[tokio::test]
async fn test_identical_inputs_share_one_generation() {
    let env = Env::new().await;
    fs::create_dir_all(env.root.join("sys")).unwrap();
    let inputs = vec![
        env.input("sys/util.lisp.~1~", "(defun head (l) (car l))\n"),
        env.input("sys/util.lisp.~2~", "(defun head (l) (car l))\n"),
        env.input("sys/other.lisp", "(defun tail (l) (cdr l))\n"),
    ];

    let generator = ScriptedGenerator::default();
    let mut memory = env.open_memory();
    let report = env.translator(&generator).run_batch(&mut memory, &inputs).await;

    assert_eq!(report.done(), 3);
    assert_eq!(generator.calls(), 2);
    for name in ["sys/util.lisp.autot", "sys/other.autot"] {
        assert!(env.root.join(name).exists(), "{}", name);
    }
    assert_eq!(
        fs::read_to_string(env.root.join("sys/util.lisp.comment")).unwrap(),
        "CAR becomes FIRST.\n"
    );
    assert_eq!(memory.ledger().len(), 3);
    assert!(memory.is_processed(&input_key(&inputs[1])));
    assert!(memory
        .store()
        .records()
        .iter()
        .any(|r| r.origin_path == input_key(&inputs[1])));
    memory.close().unwrap();

    // A new run starts with an empty cache.
    let copy = env.input("sys/util.lisp.~3~", "(defun head (l) (car l))\n");
    let mut memory = env.open_memory();
    let outcome = env.translator(&generator).run_job(&mut memory, &copy).await;
    assert_eq!(outcome, JobOutcome::Done { inserted: true });
    assert_eq!(generator.calls(), 3);
}
