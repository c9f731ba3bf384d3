use anyhow::Result;
use clap::{Parser, Subcommand};
use qa_lookup::commands::{ask, browse, build_index, list_categories, search, serve_mcp, show_status};
use qa_lookup::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qa-lookup")]
#[command(about = "Semantic lookup over a curated Q&A corpus, with an MCP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed a JSON-lines corpus and persist the index
    Build {
        /// Corpus file; repeat to give fallbacks tried in order
        #[arg(long = "corpus", value_name = "PATH")]
        corpus: Vec<PathBuf>,
        /// Skip malformed records instead of failing the build
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Answer a question with the single best match
    Ask {
        question: String,
        /// Minimum relevance score, between -1 and 1
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f32>,
    },
    /// Show ranked matches for a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum relevance score, between -1 and 1
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f32>,
        /// Only search entries in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// List categories with entry counts
    Categories,
    /// Show every entry in a category
    Browse { category: String },
    /// Start MCP server on stdio
    Serve,
    /// Show artifact, backend and consistency status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Build {
            corpus,
            skip_invalid,
        } => {
            build_index(&corpus, skip_invalid)?;
        }
        Commands::Ask {
            question,
            threshold,
        } => {
            ask(&question, threshold)?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            category,
        } => {
            search(&query, limit, threshold, category.as_deref())?;
        }
        Commands::Categories => {
            list_categories()?;
        }
        Commands::Browse { category } => {
            browse(&category)?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}
