//! MCP Bridge - stdio server and command-line client.

use clap::Parser;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mcp_bridge::config::{Args, ClientConfig, Command, PeerCommand, ServerConfig};
use mcp_bridge::error::{Error, Result};
use mcp_bridge::mcp::handler::ToolRegistry;
use mcp_bridge::mcp::resources::ResourceRegistry;
use mcp_bridge::mcp::server::McpServer;
use mcp_bridge::mcp::transport::StreamTransport;
use mcp_bridge::mcp::McpClient;
use mcp_bridge::tools;
use mcp_bridge::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout carries protocol frames
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("MCP Bridge v{}", VERSION);

    let command = args.command.unwrap_or(Command::Serve {
        name: "mcp-bridge".to_string(),
    });

    match command {
        Command::Serve { name } => {
            let config = ServerConfig {
                name,
                protocol_version: args.protocol_version,
                ..ServerConfig::default()
            };
            serve(config).await
        }
        Command::Call {
            tool,
            arguments,
            timeout,
            env,
            peer,
        } => {
            let peer = PeerCommand::from_argv(&peer, env)
                .ok_or_else(|| Error::Config("missing peer command".to_string()))?;
            let config = ClientConfig {
                protocol_version: args.protocol_version,
                request_timeout: Some(Duration::from_secs(timeout)),
                ..ClientConfig::default()
            };
            call(&peer, config, tool.as_deref(), &arguments).await
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let mut tools = ToolRegistry::new();
    tools::register_builtin_tools(&mut tools)?;
    let mut resources = ResourceRegistry::new();
    tools::register_builtin_resources(&mut resources, &tools, &config)?;
    info!("Registered {} MCP tools", tools.len());

    info!("Starting stdio transport...");
    let server = McpServer::new(config, tools, resources);
    server.run(StreamTransport::stdio()).await
}

async fn call(
    peer: &PeerCommand,
    config: ClientConfig,
    tool: Option<&str>,
    arguments: &str,
) -> Result<()> {
    let arguments: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| Error::Config(format!("--arguments is not valid JSON: {}", e)))?;

    let client = McpClient::spawn(peer, config)?;
    let outcome = exchange(&client, tool, arguments).await;

    // always reap the peer, but report the call's failure first
    let closed = client.close().await;
    let value = outcome?;
    closed?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn exchange(
    client: &McpClient,
    tool: Option<&str>,
    arguments: serde_json::Value,
) -> Result<serde_json::Value> {
    let server = client.initialize().await?;
    info!(
        "Connected to {} v{}",
        server.server_info.name, server.server_info.version
    );
    match tool {
        Some(name) => {
            let result = client.call_tool(name, arguments).await?;
            Ok(serde_json::to_value(result)?)
        }
        None => Ok(serde_json::to_value(client.list_tools().await?)?),
    }
}
