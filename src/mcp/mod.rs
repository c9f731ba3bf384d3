//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes the Q&A retriever to MCP clients over JSON-RPC 2.0 on stdio.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod validation;

use std::sync::Arc;

use crate::retriever::Retriever;
use server::McpServer;

/// Build a server with every retrieval tool registered
#[inline]
pub async fn build_server(retriever: &Retriever) -> Arc<McpServer> {
    let server = McpServer::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .with_instructions(format!(
            "Semantic Q&A lookup over {} curated entries. Use `ask` for a single answer, \
             `search` for ranked matches and `list_categories` to discover categories.",
            retriever.store().len()
        ));
    tools::register_tools(&server, retriever).await;
    Arc::new(server)
}
