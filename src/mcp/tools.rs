//! MCP Tools Implementation
//!
//! Tool definitions and handlers exposing the retriever to MCP clients.
//! Retrieval blocks on the embedding backend, so handlers run it on the
//! blocking thread pool.

use crate::mcp::errors::McpError;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::retriever::{Retriever, SearchOptions, normalize_question};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, error};

/// Largest `limit` a client may request from the search tool
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Single-best answer tool handler
pub struct AskHandler {
    retriever: Retriever,
}

/// Ranked search tool handler, optionally scoped to one category
pub struct SearchHandler {
    retriever: Retriever,
}

/// Category listing tool handler
pub struct ListCategoriesHandler {
    retriever: Retriever,
}

/// Register every tool backed by `retriever` with the server
#[inline]
pub async fn register_tools(server: &McpServer, retriever: &Retriever) {
    server
        .register_tool(AskHandler::tool_definition(), AskHandler::new(retriever.clone()))
        .await;
    server
        .register_tool(
            SearchHandler::tool_definition(),
            SearchHandler::new(retriever.clone()),
        )
        .await;
    server
        .register_tool(
            ListCategoriesHandler::tool_definition(),
            ListCategoriesHandler::new(retriever.clone()),
        )
        .await;
}

impl AskHandler {
    #[inline]
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }

    /// Create the ask tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "ask".to_string(),
            description: Some(
                "Answer a question with the single best matching entry from the Q&A corpus"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "Question to answer"
                    }
                },
                "required": ["question"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AskHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let question = normalize_question(required_text(&args, "ask", "question")?);
        if question.is_empty() {
            return Err(invalid("ask", "question must not be empty").into());
        }

        debug!("Answering question: '{}'", question);

        let retriever = self.retriever.clone();
        let outcome = tokio::task::spawn_blocking(move || retriever.answer(&question)).await?;

        match outcome {
            Ok(answer) => Ok(CallToolResult::json(&json!({ "answer": answer }))?),
            Err(e) => {
                error!("Failed to answer question: {}", e);
                Ok(CallToolResult::error(format!(
                    "Failed to answer question: {}",
                    e
                )))
            }
        }
    }
}

impl SearchHandler {
    #[inline]
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }

    /// Create the search tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search".to_string(),
            description: Some("Search the Q&A corpus for ranked matches".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Optional: Maximum number of results",
                        "minimum": 1,
                        "maximum": MAX_SEARCH_LIMIT
                    },
                    "threshold": {
                        "type": "number",
                        "description": "Optional: Minimum relevance score between -1 and 1",
                        "minimum": -1.0,
                        "maximum": 1.0
                    },
                    "category": {
                        "type": "string",
                        "description": "Optional: Only search entries in this category"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_text(&args, "search", "query")?.trim().to_string();
        if query.is_empty() {
            return Err(invalid("search", "query must not be empty").into());
        }

        let category = match args.get("category") {
            None | Some(Value::Null) => None,
            Some(Value::String(c)) if c.trim().is_empty() => None,
            Some(Value::String(c)) => Some(c.trim().to_string()),
            Some(_) => return Err(invalid("search", "category must be a string").into()),
        };

        let config = self.retriever.config();
        let mut options = match category {
            Some(_) => SearchOptions::category_defaults(config),
            None => SearchOptions::search_defaults(config),
        };

        match args.get("limit") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_u64() {
                Some(limit) if (1..=MAX_SEARCH_LIMIT as u64).contains(&limit) => {
                    options.limit = limit as usize;
                }
                _ => {
                    return Err(invalid(
                        "search",
                        &format!("limit must be an integer between 1 and {}", MAX_SEARCH_LIMIT),
                    )
                    .into());
                }
            },
        }

        match args.get("threshold") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_f64() {
                Some(threshold) if (-1.0..=1.0).contains(&threshold) => {
                    options.threshold = threshold as f32;
                }
                _ => {
                    return Err(
                        invalid("search", "threshold must be a number between -1 and 1").into(),
                    );
                }
            },
        }

        debug!(
            "Searching: query='{}', category={:?}, limit={}, threshold={}",
            query, category, options.limit, options.threshold
        );

        let retriever = self.retriever.clone();
        let outcome = tokio::task::spawn_blocking(move || match category {
            Some(category) => retriever.search_in_category(&query, &category, options),
            None => retriever.search(&query, options),
        })
        .await?;

        match outcome {
            Ok(results) => Ok(CallToolResult::json(&json!({ "results": results }))?),
            Err(e) => {
                error!("Error performing search: {}", e);
                Ok(CallToolResult::error(format!("Search error: {}", e)))
            }
        }
    }
}

impl ListCategoriesHandler {
    #[inline]
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }

    /// Create the list_categories tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "list_categories".to_string(),
            description: Some("List corpus categories with their entry counts".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListCategoriesHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Listing corpus categories");

        let categories: Vec<Value> = self
            .retriever
            .categories()
            .into_iter()
            .map(|(name, count)| json!({ "name": name, "count": count }))
            .collect();

        Ok(CallToolResult::json(&json!({ "categories": categories }))?)
    }
}

fn required_text<'a>(
    args: &'a HashMap<String, Value>,
    tool: &str,
    field: &str,
) -> Result<&'a str, McpError> {
    match args.get(field) {
        Some(Value::String(text)) => Ok(text.as_str()),
        Some(_) => Err(invalid(tool, &format!("{} must be a string", field))),
        None => Err(invalid(tool, &format!("missing required parameter: {}", field))),
    }
}

fn invalid(tool: &str, message: &str) -> McpError {
    McpError::InvalidToolParameters {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}
