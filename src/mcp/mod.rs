//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 over stdio exposing the product search tool to the
//! storefront assistant.


pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::{SEARCH_PRODUCTS_TOOL, SearchProductsHandler};
