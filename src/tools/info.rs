//! Server metadata exposed as a resource.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::mcp::resources::{Resource, ResourceContents, ResourceReader};

pub const SERVER_INFO_URI: &str = "mcp://server/info";

#[derive(Debug, Clone, Serialize)]
struct ServerInfo {
    name: String,
    version: String,
    protocol_version: String,
    tools: Vec<String>,
}

/// Reports the server identity and the names of its tools.
pub struct ServerInfoResource {
    info: ServerInfo,
}

impl ServerInfoResource {
    pub fn new(config: &ServerConfig, tools: Vec<String>) -> Self {
        Self {
            info: ServerInfo {
                name: config.name.clone(),
                version: config.version.clone(),
                protocol_version: config.protocol_version.clone(),
                tools,
            },
        }
    }

    /// The descriptor this reader is registered under.
    pub fn descriptor() -> Resource {
        Resource::new(SERVER_INFO_URI, "server-info")
            .with_description("Server name, version and registered tools")
            .with_mime_type("application/json")
    }
}

#[async_trait]
impl ResourceReader for ServerInfoResource {
    async fn read(&self, resource: &Resource) -> Result<Vec<ResourceContents>> {
        let json = serde_json::to_string_pretty(&self.info)?;
        Ok(vec![ResourceContents::text(
            resource.uri.clone(),
            resource.mime_type.clone(),
            json,
        )])
    }
}
