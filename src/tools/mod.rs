//! Built-in MCP tools and resources.
//!
//! - `text` - `echo` and `transform_text`
//! - `info` - the `mcp://server/info` resource

pub mod info;
pub mod text;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::mcp::handler::ToolRegistry;
use crate::mcp::resources::ResourceRegistry;

pub use info::{ServerInfoResource, SERVER_INFO_URI};
pub use text::{EchoTool, TransformTextTool};

/// Register all built-in tools.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(EchoTool)?;
    registry.register(TransformTextTool::new()?)?;
    Ok(())
}

/// Register all built-in resources. Tools should be registered first so the
/// server info lists them.
pub fn register_builtin_resources(
    resources: &mut ResourceRegistry,
    tools: &ToolRegistry,
    config: &ServerConfig,
) -> Result<()> {
    let names = tools.list().into_iter().map(|t| t.name).collect();
    resources.register(
        ServerInfoResource::descriptor(),
        ServerInfoResource::new(config, names),
    )
}
