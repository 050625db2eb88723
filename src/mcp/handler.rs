//! Tool handlers and the tool registry.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::mcp::args::ToolArgs;
use crate::mcp::protocol::{ContentBlock, Tool, ToolResult};

/// Handler for MCP tool calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> Tool;

    /// Execute the tool with the given arguments.
    ///
    /// An `Err` is reported to the caller as an error result, not as a
    /// protocol failure.
    async fn execute(&self, args: ToolArgs) -> Result<ToolResult>;
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    definition: Tool,
    func: F,
}

impl<F> FnTool<F> {
    pub fn new(definition: Tool, func: F) -> Self {
        Self { definition, func }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    fn definition(&self) -> Tool {
        self.definition.clone()
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult> {
        (self.func)(args).await
    }
}

struct RegisteredTool {
    definition: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of tool handlers, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    /// Handler panics contained by `dispatch`.
    panics: AtomicU64,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler.
    ///
    /// The definition is captured once here. Names are case-sensitive and a
    /// second registration under an existing name is rejected.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) -> Result<()> {
        self.register_arc(Arc::new(handler))
    }

    /// Register a tool handler (Arc version).
    pub fn register_arc(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let definition = handler.definition();
        if self.index.contains_key(&definition.name) {
            return Err(Error::DuplicateTool(definition.name));
        }
        debug!("Registered tool: {}", definition.name);
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        Ok(())
    }

    /// Register an async closure under a pre-built definition.
    pub fn register_fn<F, Fut>(&mut self, definition: Tool, func: F) -> Result<()>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        self.register(FnTool::new(definition, func))
    }

    /// All tool definitions in registration order.
    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].handler.clone())
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of handler panics contained so far.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Invoke a tool.
    ///
    /// Never fails at the protocol level: an unknown name, a handler error
    /// and a handler panic all come back as an error result.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(handler) = self.get(name) else {
            warn!("Call to unknown tool: {}", name);
            return error_result(format!("unknown tool: {}", name));
        };

        let args = ToolArgs::new(arguments);
        match AssertUnwindSafe(handler.execute(args)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!("Tool {} returned an error: {}", name, e);
                error_result(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                let total = self.panics.fetch_add(1, Ordering::Relaxed) + 1;
                error!(tool = name, panic = %reason, total, "Tool handler panicked");
                error_result(format!("tool {} failed unexpectedly: {}", name, reason))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

/// Helper to create an error tool result.
pub fn error_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::schema::ToolBuilder;
    use serde_json::json;

    struct TestTool {
        name: String,
    }

    #[async_trait]
    impl ToolHandler for TestTool {
        fn definition(&self) -> Tool {
            ToolBuilder::new(self.name.clone(), format!("Test tool: {}", self.name))
                .string("input", "Input text", false)
                .build()
                .unwrap()
        }

        async fn execute(&self, args: ToolArgs) -> Result<ToolResult> {
            let input = args.string_or("input", "");
            Ok(success_result(format!("Executed {} with: {}", self.name, input)))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl ToolHandler for PanickingTool {
        fn definition(&self) -> Tool {
            ToolBuilder::new("explode", "Always panics").build().unwrap()
        }

        async fn execute(&self, _args: ToolArgs) -> Result<ToolResult> {
            panic!("kaboom");
        }
    }

    fn tool(name: &str) -> TestTool {
        TestTool {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("test_tool")).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("test_tool"));
        assert!(!registry.contains("Test_Tool"));
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("echo")).unwrap();

        let err = registry.register(tool("echo")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(ref name) if name == "echo"));
        assert_eq!(registry.len(), 1);

        // names are case-sensitive
        registry.register(tool("Echo")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["C", "A", "B"] {
            registry.register(tool(name)).unwrap();
        }

        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("echo")).unwrap();

        let result = registry.dispatch("echo", json!({"input": "hello"})).await;
        assert!(!result.is_error);
        assert_eq!(result.text(), "Executed echo with: hello");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.dispatch("nope", json!({})).await;
        assert!(result.is_error);
        assert!(result.text().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_dispatch_handler_error_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        let definition = ToolBuilder::new("search", "Search")
            .string("query", "Query", true)
            .build()
            .unwrap();
        registry
            .register_fn(definition, |args: ToolArgs| async move {
                let query = args.require_string("query")?;
                Ok::<_, Error>(success_result(query))
            })
            .unwrap();

        let result = registry.dispatch("search", json!({})).await;
        assert!(result.is_error);
        assert_eq!(result.text(), "missing required field query");

        let result = registry.dispatch("search", json!({"query": "rust"})).await;
        assert!(!result.is_error);
        assert_eq!(result.text(), "rust");
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_contained() {
        let mut registry = ToolRegistry::new();
        registry.register(PanickingTool).unwrap();
        registry.register(tool("echo")).unwrap();

        assert_eq!(registry.panic_count(), 0);
        let result = registry.dispatch("explode", Value::Null).await;
        assert!(result.is_error);
        assert!(result.text().contains("kaboom"));
        assert_eq!(registry.panic_count(), 1);

        // unknown tools do not count
        registry.dispatch("nope", Value::Null).await;
        assert_eq!(registry.panic_count(), 1);

        // registry still usable
        let result = registry.dispatch("echo", json!({"input": "ok"})).await;
        assert!(!result.is_error);
    }

    #[test]
    fn test_definition_captured_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(Arc<AtomicUsize>);

        #[async_trait]
        impl ToolHandler for Counting {
            fn definition(&self) -> Tool {
                self.0.fetch_add(1, Ordering::SeqCst);
                ToolBuilder::new("counting", "Counts").build().unwrap()
            }

            async fn execute(&self, _args: ToolArgs) -> Result<ToolResult> {
                Ok(success_result(""))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Counting(calls.clone())).unwrap();
        registry.list();
        registry.list();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_success_and_error_results() {
        let ok = success_result("Success!");
        assert!(!ok.is_error);
        assert_eq!(ok.content.len(), 1);

        let err = error_result("Error!");
        assert!(err.is_error);
        assert_eq!(err.text(), "Error!");
    }
}
