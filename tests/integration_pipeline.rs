#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests: corpus file -> build -> persist -> load -> query,
// using a deterministic keyword embedder in place of a model server.

use qa_lookup::LookupError;
use qa_lookup::commands::{build_from_file, resolve_corpus_path};
use qa_lookup::config::RetrievalConfig;
use qa_lookup::corpus::ParseMode;
use qa_lookup::indexer::ArtifactPaths;
use qa_lookup::retriever::{Retriever, SearchOptions};
use qa_lookup::testutil::KeywordEmbedder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const VOCABULARY: [&str; 8] = [
    "student", "privacy", "law", "office", "grant", "teaching", "syllabus", "workshop",
];

const CORPUS: &str = r#"{"question":"What is FERPA?","answer":"A student privacy law.","category":"Legal & Compliance"}
{"question":"Where is the teaching office?","answer":"The office is in Powell Library."}

{"question":"How do I apply for a teaching grant?","answer":"Submit the grant form.","category":"Grants & Funding"}
{"question":"Is there a syllabus workshop?","answer":"Yes, every quarter.","category":"Workshops"}
"#;

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn embedder() -> KeywordEmbedder {
    KeywordEmbedder::new(VOCABULARY)
}

fn write_corpus(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("should write corpus");
    path
}

fn artifacts(dir: &Path) -> ArtifactPaths {
    ArtifactPaths::new(dir.join("store/qa_index.bin"), dir.join("store/corpus.jsonl"))
}

fn build(dir: &Path, content: &str, mode: ParseMode) -> qa_lookup::indexer::BuildSummary {
    let corpus = write_corpus(dir, "corpus_input.jsonl", content);
    build_from_file(&embedder(), &corpus, mode, &artifacts(dir), 2, false)
        .expect("build succeeds")
}

fn load(dir: &Path) -> Retriever {
    Retriever::from_artifacts(
        Arc::new(embedder()),
        &artifacts(dir),
        RetrievalConfig::default(),
    )
    .expect("artifacts load")
}

#[test]
fn build_then_query_end_to_end() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");

    let summary = build(temp_dir.path(), CORPUS, ParseMode::Strict);
    assert_eq!(summary.total, 4);
    assert!(summary.skipped.is_empty());
    let categories = summary.categories.expect("categories reported");
    assert_eq!(categories.get("General"), Some(&1));
    assert_eq!(categories.get("Workshops"), Some(&1));

    let retriever = load(temp_dir.path());

    assert_eq!(
        retriever.answer("student privacy law").expect("answer"),
        "A student privacy law."
    );
    assert_eq!(
        retriever.answer("cafeteria hours").expect("answer"),
        retriever.fallback_message()
    );

    let results = retriever
        .search("student privacy law", SearchOptions::new(5, 0.15))
        .expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "Legal & Compliance");
    assert_eq!(results[0].rank, 1);

    let office = retriever
        .search("office", SearchOptions::new(5, 0.15))
        .expect("search");
    assert_eq!(office[0].category, "General");
}

#[test]
fn category_search_after_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    build(temp_dir.path(), CORPUS, ParseMode::Strict);
    let retriever = load(temp_dir.path());

    let results = retriever
        .search_in_category("teaching grant", "Grants & Funding", SearchOptions::new(3, 0.15))
        .expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].question, "How do I apply for a teaching grant?");

    let none = retriever
        .search_in_category("teaching grant", "Workshops", SearchOptions::new(3, 0.15))
        .expect("search");
    assert!(none.is_empty());

    let missing = retriever
        .search_in_category("teaching grant", "Parking", SearchOptions::new(3, 0.15))
        .expect("search");
    assert!(missing.is_empty());
}

#[test]
fn strict_build_reports_bad_line_and_keeps_previous_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    build(temp_dir.path(), CORPUS, ParseMode::Strict);

    let broken = format!("{CORPUS}{{\"question\":\"no answer\"}}\n");
    let corpus = write_corpus(temp_dir.path(), "broken.jsonl", &broken);
    let err = build_from_file(
        &embedder(),
        &corpus,
        ParseMode::Strict,
        &artifacts(temp_dir.path()),
        2,
        false,
    )
    .expect_err("strict build fails");

    let root = err
        .chain()
        .find_map(|e| e.downcast_ref::<LookupError>())
        .expect("has a lookup error");
    assert!(matches!(root, LookupError::Corpus { line: 6, .. }));

    // The earlier build is still served intact
    let retriever = load(temp_dir.path());
    assert_eq!(retriever.store().len(), 4);
}

#[test]
fn lenient_build_skips_bad_lines() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let content = format!("{CORPUS}not json at all\n{{\"answer\":\"orphan\"}}\n");

    let summary = build(temp_dir.path(), &content, ParseMode::Lenient);
    assert_eq!(summary.total, 4);
    let lines: Vec<usize> = summary.skipped.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![6, 7]);
    assert!(summary.to_string().contains("Skipped 2 malformed records (lines 6, 7)"));

    assert_eq!(load(temp_dir.path()).store().len(), 4);
}

#[test]
fn rebuild_replaces_previous_pair() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    build(temp_dir.path(), CORPUS, ParseMode::Strict);

    let smaller = r#"{"question":"Is there a syllabus workshop?","answer":"Yes, monthly now."}"#;
    build(temp_dir.path(), smaller, ParseMode::Strict);

    let retriever = load(temp_dir.path());
    assert_eq!(retriever.store().len(), 1);
    assert_eq!(
        retriever.answer("syllabus workshop").expect("answer"),
        "Yes, monthly now."
    );
    assert!(!temp_dir.path().join("store/qa_index.bin.tmp").exists());
}

#[test]
fn empty_corpus_yields_fallback() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let summary = build(temp_dir.path(), "\n\n", ParseMode::Strict);
    assert_eq!(summary.total, 0);

    let retriever = load(temp_dir.path());
    assert_eq!(
        retriever.answer("anything").expect("answer"),
        retriever.fallback_message()
    );
}

#[test]
fn corpus_candidates_resolve_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let missing = temp_dir.path().join("enhanced_corpus.jsonl");
    let present = write_corpus(temp_dir.path(), "qna_corpus.jsonl", CORPUS);

    let resolved =
        resolve_corpus_path(&[missing.clone(), present.clone()]).expect("fallback exists");
    assert_eq!(resolved, present);

    let err = resolve_corpus_path(&[missing]).expect_err("nothing exists");
    assert!(err.to_string().contains("enhanced_corpus.jsonl"));
}
