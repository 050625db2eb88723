//! Model Context Protocol (MCP) implementation.
//!
//! Both sides of a stdio MCP connection: a client that multiplexes
//! concurrent calls over one child process, and a server that exposes a tool
//! registry and a resource registry.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC frames and MCP message types
//! - `transport` - Newline-delimited framing over byte streams
//! - `process` - Child-process peer with stderr forwarding
//! - `client` - Request correlation and the initialize handshake
//! - `schema` - Tool descriptor builder
//! - `args` - Typed access to tool arguments
//! - `handler` - Tool handlers and the tool registry
//! - `resources` - Resource readers and the resource registry
//! - `server` - Request dispatch and the server run loop

pub mod args;
pub mod client;
pub mod handler;
pub mod process;
pub mod protocol;
pub mod resources;
pub mod schema;
pub mod server;
pub mod transport;

pub use args::ToolArgs;
pub use client::McpClient;
pub use handler::{ToolHandler, ToolRegistry};
pub use protocol::*;
pub use resources::{Resource, ResourceReader, ResourceRegistry};
pub use schema::ToolBuilder;
pub use server::McpServer;
pub use transport::{StreamTransport, Transport};
