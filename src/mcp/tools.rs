//! MCP Tools Implementation
//!
//! The `search_products` tool exposed to the storefront assistant.

use crate::Result;
use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::search::SimilaritySearch;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error};

pub const SEARCH_PRODUCTS_TOOL: &str = "search_products";

/// Upper bound on the caller-supplied result limit
pub const MAX_TOOL_LIMIT: usize = 100;

const APOLOGY: &str = "Sorry, I couldn't search the product catalog right now. Please try again in a moment.";

/// Product search tool handler. Failures never escape as protocol errors;
/// they become an `{error, query}` payload instead.
pub struct SearchProductsHandler {
    search: Arc<SimilaritySearch>,
}

impl SearchProductsHandler {
    #[inline]
    pub fn new(search: Arc<SimilaritySearch>) -> Self {
        Self { search }
    }

    /// Create the search_products tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: SEARCH_PRODUCTS_TOOL.to_string(),
            description: Some(
                "Find storefront products semantically related to a shopper's request"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What the shopper is looking for"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of products (default: 5)",
                        "minimum": 1,
                        "maximum": MAX_TOOL_LIMIT
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    /// Run the search and build the payload handed back to the assistant
    #[inline]
    pub async fn search_payload(&self, query: &str, limit: Option<usize>) -> (Value, bool) {
        let query = query.trim();
        if query.is_empty() {
            return (error_payload("Please tell me what you're looking for.", query), true);
        }

        let limit = limit
            .unwrap_or(self.search.config().tool_default_limit)
            .clamp(1, MAX_TOOL_LIMIT);

        debug!("Searching products: query='{}', limit={}", query, limit);

        match self.search.find_products(query, limit).await {
            Ok(products) => (
                json!({
                    "products": products,
                    "query": query,
                    "totalFound": products.len(),
                    "semanticSearch": true
                }),
                false,
            ),
            Err(e) => {
                error!("Product search failed for '{}': {}", query, e);
                (error_payload(APOLOGY, query), true)
            }
        }
    }
}

fn error_payload(message: &str, query: &str) -> Value {
    json!({
        "error": message,
        "query": query
    })
}

#[async_trait]
impl ToolHandler for SearchProductsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|limit| usize::try_from(limit).ok());

        let (payload, is_error) = self.search_payload(query, limit).await;
        Ok(CallToolResult::json(&payload, is_error))
    }
}
