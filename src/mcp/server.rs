//! MCP server implementation.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::mcp::handler::ToolRegistry;
use crate::mcp::protocol::*;
use crate::mcp::resources::{ReadResourceParams, ResourceRegistry};
use crate::mcp::transport::Transport;

/// MCP server.
///
/// Serves one connection at a time. Requests are answered in arrival order.
pub struct McpServer {
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    config: ServerConfig,
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(config: ServerConfig, tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
            resources: Arc::new(resources),
            config,
        }
    }

    /// Create a server that exposes tools only.
    pub fn with_tools(config: ServerConfig, tools: ToolRegistry) -> Self {
        Self::new(config, tools, ResourceRegistry::new())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Run the server with the given transport until the peer disconnects.
    pub async fn run<T: Transport>(&self, mut transport: T) -> Result<()> {
        info!(
            "Starting MCP server: {} v{} ({} tools, {} resources)",
            self.config.name,
            self.config.version,
            self.tools.len(),
            self.resources.len()
        );

        let (mut incoming, outgoing) = transport.start().await?;

        while let Some(msg) = incoming.recv().await {
            match msg {
                Message::Request(req) => {
                    let response = self.handle_request(req).await;
                    if outgoing.send(Message::Response(response)).await.is_err() {
                        warn!("Outbound channel closed, stopping");
                        break;
                    }
                }
                Message::Notification(notif) => {
                    self.handle_notification(notif);
                }
                Message::Response(resp) => {
                    warn!("Received unexpected response (id: {:?})", resp.id);
                }
            }
        }

        // the writer task drains once every sender is gone
        drop(outgoing);
        transport.stop().await?;
        info!("MCP server stopped");
        Ok(())
    }

    /// Answer one JSON-RPC request.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request: {} (id: {:?})", req.method, req.id);

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.params),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(req.params).await,
            "resources/list" => self.handle_list_resources(),
            "resources/read" => self.handle_read_resource(req.params).await,
            _ => Err(Error::MethodNotFound(req.method.clone())),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(req.id, value),
            Err(e) => {
                debug!("Request {} failed: {}", req.method, e);
                JsonRpcResponse::failure(req.id, e.rpc_code(), e.to_string())
            }
        }
    }

    fn handle_notification(&self, notif: JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => {
                // requests run to completion; nothing to interrupt
                debug!("Client cancelled a request: {:?}", notif.params);
            }
            _ => debug!("Unknown notification: {}", notif.method),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = parse_params(params)?;
        info!(
            "Client connected: {} v{} (protocol {})",
            params.client_info.name, params.client_info.version, params.protocol_version
        );

        // echo the client's version when we speak it, else offer ours
        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
        {
            params.protocol_version
        } else {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, self.config.protocol_version
            );
            self.config.protocol_version.clone()
        };

        let resources = if self.resources.is_empty() {
            None
        } else {
            Some(ResourcesCapability::default())
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources,
            },
            server_info: Implementation {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.tools.list(),
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Tool failures are carried in the result, never as an RPC error.
    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = parse_params(params)?;
        let result = self.tools.dispatch(&params.name, params.arguments).await;
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_resources(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.resources.list())?)
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = parse_params(params)?;
        let result = self.resources.read(&params.uri).await?;
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::InvalidParams("Missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}
