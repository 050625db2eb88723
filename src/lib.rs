//! MCP Bridge - Model Context Protocol over stdio
//!
//! Both halves of the MCP tool-invocation layer.
//!
//! # Architecture
//!
//! 1. **Client** (`mcp::client`) - Spawns a peer process and correlates
//!    concurrent requests with out-of-order responses
//! 2. **Server** (`mcp::server`) - Answers the handshake, lists and dispatches
//!    tools, serves resources
//! 3. **Tool authoring** (`mcp::schema`, `mcp::args`, `mcp::handler`) -
//!    Descriptor builder, argument decoder, registry
//! 4. **Built-ins** (`tools`) - Demo tools and a server-info resource
//!
//! # Example
//!
//! ```no_run
//! use mcp_bridge::config::{ClientConfig, PeerCommand};
//! use mcp_bridge::mcp::McpClient;
//!
//! # async fn run() -> mcp_bridge::Result<()> {
//! let peer = PeerCommand {
//!     command: "mcp-bridge".to_string(),
//!     args: vec!["serve".to_string()],
//!     ..Default::default()
//! };
//! let client = McpClient::spawn(&peer, ClientConfig::default())?;
//! client.initialize().await?;
//! let result = client
//!     .call_tool("echo", serde_json::json!({"text": "hi"}))
//!     .await?;
//! assert_eq!(result.text(), "hi");
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;

pub use error::{Error, Result};

/// Crate version, reported in `clientInfo` and `serverInfo`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
