//! Configuration for the MCP bridge client and server.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::mcp::protocol::MCP_VERSION;
use crate::VERSION;

/// Command-line arguments for the `mcp-bridge` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-bridge")]
#[command(author = "MCP Bridge Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Model Context Protocol stdio server and client")]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "MCP_BRIDGE_DEBUG")]
    pub debug: bool,

    /// MCP protocol version to speak
    #[arg(long, global = true, default_value = MCP_VERSION, env = "MCP_BRIDGE_PROTOCOL_VERSION")]
    pub protocol_version: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Binary subcommands. Without one, `serve` is assumed.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the built-in tools over stdio
    Serve {
        /// Server name reported during the handshake
        #[arg(long, default_value = "mcp-bridge", env = "MCP_BRIDGE_SERVER_NAME")]
        name: String,
    },
    /// Spawn a peer server, then list its tools or call one
    Call {
        /// Tool to invoke; lists tools when omitted
        #[arg(long)]
        tool: Option<String>,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        arguments: String,

        /// Per-call timeout in seconds
        #[arg(long, default_value = "30", env = "MCP_BRIDGE_TIMEOUT")]
        timeout: u64,

        /// Extra environment for the peer, as KEY=VALUE
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Peer command followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        peer: Vec<String>,
    },
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// How to launch a stdio peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerCommand {
    /// Executable to run
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment added on top of the inherited one
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl PeerCommand {
    /// Build from a `[command, args...]` vector.
    pub fn from_argv(argv: &[String], env: impl IntoIterator<Item = (String, String)>) -> Option<Self> {
        let (command, args) = argv.split_first()?;
        Some(Self {
            command: command.clone(),
            args: args.to_vec(),
            env: env.into_iter().collect(),
        })
    }
}

/// Client-side connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name sent in `clientInfo`
    pub client_name: String,
    /// Client version sent in `clientInfo`
    pub client_version: String,
    /// Protocol version requested during `initialize`
    pub protocol_version: String,
    /// Deadline applied by `call`; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
    /// How long `close` waits for a spawned peer to exit
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "mcp-bridge".to_string(),
            client_version: VERSION.to_string(),
            protocol_version: MCP_VERSION.to_string(),
            request_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`
    pub name: String,
    /// Version reported in `serverInfo`
    pub version: String,
    /// Protocol version answered when the client asks for an unsupported one
    pub protocol_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "mcp-bridge".to_string(),
            version: VERSION.to_string(),
            protocol_version: MCP_VERSION.to_string(),
        }
    }
}
