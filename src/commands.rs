use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::config::settings::validate_threshold;
use crate::corpus::{CorpusStore, ParseMode, read_jsonl_file};
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::FlatIndex;
use crate::indexer::{ArtifactPaths, BuildSummary, ConsistencyReport, IndexBuilder};
use crate::retriever::{Retriever, SearchOptions, SearchResult, normalize_question};

/// Corpus files tried in order when `build` is given no explicit path
pub const DEFAULT_CORPUS_PATHS: &[&str] = &["enhanced_corpus.jsonl", "qna_corpus.jsonl"];

/// Pick the first corpus candidate that exists
#[inline]
pub fn resolve_corpus_path(candidates: &[PathBuf]) -> Result<PathBuf> {
    let defaults: Vec<PathBuf>;
    let candidates = if candidates.is_empty() {
        defaults = DEFAULT_CORPUS_PATHS.iter().map(PathBuf::from).collect();
        &defaults
    } else {
        candidates
    };

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
        info!("Corpus candidate {} not found", candidate.display());
    }

    bail!(
        "No corpus file found. Tried: {}",
        candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Parse a corpus file, embed it and persist the resulting pair
#[inline]
pub fn build_from_file(
    embedder: &dyn Embedder,
    corpus: &Path,
    mode: ParseMode,
    paths: &ArtifactPaths,
    batch_size: usize,
    show_progress: bool,
) -> Result<BuildSummary> {
    let parsed = read_jsonl_file(corpus, mode)
        .with_context(|| format!("Failed to read corpus {}", corpus.display()))?;

    let built = IndexBuilder::new(embedder)
        .with_batch_size(batch_size)
        .with_progress(show_progress)
        .build_parsed(parsed)
        .context("Failed to build index")?;

    built.persist(paths).context("Failed to persist index")?;
    Ok(built.summary)
}

/// Build the index from the first available corpus file
#[inline]
pub fn build_index(corpus_paths: &[PathBuf], skip_invalid: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let corpus = resolve_corpus_path(corpus_paths)?;
    let mode = if skip_invalid {
        ParseMode::Lenient
    } else {
        ParseMode::Strict
    };

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    client.health_check().with_context(|| {
        format!(
            "Cannot use Ollama at {}:{} with model {}. Use 'qa-lookup config' to update connection settings.",
            config.ollama.host, config.ollama.port, config.ollama.model
        )
    })?;

    println!("📖 Loading corpus from {}", corpus.display());

    let paths = config.artifact_paths();
    let summary = build_from_file(
        &client,
        &corpus,
        mode,
        &paths,
        config.ollama.batch_size as usize,
        true,
    )?;

    println!("✅ {}", summary);
    println!();
    println!("Index saved to {}", paths.index.display());
    println!("Corpus saved to {}", paths.corpus.display());
    Ok(())
}

/// Load the persisted pair behind an Ollama embedder
#[inline]
pub fn load_retriever(config: &Config) -> Result<Retriever> {
    let paths = config.artifact_paths();
    if !paths.exists() {
        bail!(
            "No index found at {}. Run 'qa-lookup build' first.",
            paths.index.display()
        );
    }

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Retriever::from_artifacts(Arc::new(client), &paths, config.retrieval.clone())
        .context("Failed to load index")
}

/// Print the single best answer for a question
#[inline]
pub fn ask(question: &str, threshold: Option<f32>) -> Result<()> {
    let question = normalize_question(question);
    if question.is_empty() {
        bail!("Question must not be empty");
    }

    let config = Config::load().context("Failed to load configuration")?;
    let retriever = load_retriever(&config)?;
    let threshold = threshold.unwrap_or(config.retrieval.answer_threshold);
    validate_threshold(threshold)?;

    let answer = retriever.answer_with_threshold(&question, threshold)?;
    println!("{}", answer);
    Ok(())
}

/// Print ranked matches, optionally restricted to one category
#[inline]
pub fn search(
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
    category: Option<&str>,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let retriever = load_retriever(&config)?;

    let mut options = match category {
        Some(_) => SearchOptions::category_defaults(&config.retrieval),
        None => SearchOptions::search_defaults(&config.retrieval),
    };
    if let Some(limit) = limit {
        if limit == 0 {
            bail!("Limit must be at least 1");
        }
        options.limit = limit;
    }
    if let Some(threshold) = threshold {
        validate_threshold(threshold)?;
        options.threshold = threshold;
    }

    let results = match category {
        Some(category) => retriever.search_in_category(query.trim(), category, options)?,
        None => retriever.search(query.trim(), options)?,
    };

    print_results(query, &results);
    Ok(())
}

fn print_results(query: &str, results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results above the relevance threshold for \"{}\".", query);
        return;
    }

    println!("🔎 {} results for \"{}\":", results.len(), query);
    println!();
    for result in results {
        println!(
            "{}. [{:.3}] {} ({})",
            result.rank, result.relevance_score, result.question, result.category
        );
        println!("   {}", result.answer);
        println!();
    }
}

/// List categories with their entry counts
#[inline]
pub fn list_categories() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let (store, _) = config.artifact_paths().load().context("Failed to load index")?;

    let categories = store.categories();
    if categories.is_empty() {
        println!("The corpus is empty.");
        println!("Use 'qa-lookup build' to index a corpus.");
        return Ok(());
    }

    println!("Categories ({} total):", categories.len());
    for (name, count) in &categories {
        println!("  - {}: {} items", name, count);
    }
    Ok(())
}

/// Print every entry of one category in corpus order
#[inline]
pub fn browse(category: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let (store, _) = config.artifact_paths().load().context("Failed to load index")?;

    let entries: Vec<_> = store.in_category(category).collect();
    if entries.is_empty() {
        println!("No entries in category '{}'.", category);
        println!("Use 'qa-lookup categories' to see available categories.");
        return Ok(());
    }

    println!("📚 {} ({} entries)", category, entries.len());
    println!();
    for (_, entry) in entries {
        println!("Q: {}", entry.question);
        println!("A: {}", entry.answer);
        println!();
    }
    Ok(())
}

/// Show configuration, artifact and backend status
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let paths = config.artifact_paths();

    println!("📊 QA-Lookup Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗂️  Artifacts:");
    print_artifact("Index", &paths.index);
    print_artifact("Corpus", &paths.corpus);

    println!();
    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected at {}:{}",
                    config.ollama.host, config.ollama.port
                );
            }
            Err(e) => println!("   ⚠️  Ollama: Unavailable - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {:#}", e),
    }
    println!("   📋 Model: {}", config.ollama.model);
    println!("   🔢 Dimension: {}", config.ollama.embedding_dimension);

    println!();
    println!("🔍 Index Consistency:");
    if paths.exists() {
        match FlatIndex::load(&paths.index).and_then(|index| {
            CorpusStore::load(&paths.corpus).map(|store| ConsistencyReport::check(&store, &index))
        }) {
            Ok(report) => {
                if report.is_consistent {
                    println!("   ✅ {}", report.summary());
                } else {
                    println!("   ⚠️  {}", report.summary());
                    println!("   Run 'qa-lookup build' to rebuild the index.");
                }
            }
            Err(e) => println!("   ❌ Failed to read artifacts: {}", e),
        }
    } else {
        println!("   📭 No index built yet");
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'qa-lookup build' to index a corpus");
    println!("   • Use 'qa-lookup ask <question>' to query it");
    println!("   • Use 'qa-lookup serve' to start the MCP server for AI assistants");
    Ok(())
}

fn print_artifact(label: &str, path: &Path) {
    match fs::metadata(path) {
        Ok(metadata) => {
            let modified = metadata
                .modified()
                .map(|t| {
                    DateTime::<Local>::from(t)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                })
                .unwrap_or_else(|_| "unknown".to_string());
            println!(
                "   ✅ {}: {} ({} bytes, modified {})",
                label,
                path.display(),
                metadata.len(),
                modified
            );
        }
        Err(_) => println!("   ❌ {}: {} (missing)", label, path.display()),
    }
}

/// Load and validate the index, then serve MCP on stdio until EOF or Ctrl+C.
///
/// Stdout is the transport, so everything meant for a human goes to stderr.
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let retriever = load_retriever(&config).context("Refusing to start MCP server")?;

    let client = OllamaClient::new(&config.ollama)?;
    match tokio::task::spawn_blocking(move || client.health_check()).await? {
        Ok(()) => info!(
            "Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => {
            warn!("Ollama is not ready: {:#}", e);
            eprintln!("Warning: Ollama may not be ready. Queries will fail until it is.");
        }
    }

    let server = crate::mcp::build_server(&retriever).await;
    eprintln!(
        "✅ MCP server ready with {} entries and tools: {}",
        retriever.store().len(),
        server.tool_names().await.join(", ")
    );
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            if let Err(e) = result {
                error!("MCP server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    info!("MCP server stopped");
    Ok(())
}
