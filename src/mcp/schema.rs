//! Fluent builder for tool descriptors and their input schemas.
//!
//! ```
//! use mcp_bridge::mcp::schema::ToolBuilder;
//!
//! let tool = ToolBuilder::new("search", "Search messages")
//!     .string("query", "Search query", true)
//!     .integer("limit", "Maximum results", false)
//!     .enumeration("order", "Sort order", &["newest", "oldest"], false)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(tool.input_schema["required"][0], "query");
//! ```

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::mcp::protocol::Tool;

/// JSON type of one declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum(Vec<String>),
    StringArray,
}

impl ParamKind {
    fn schema(&self, description: &str) -> Value {
        match self {
            Self::String => json!({"type": "string", "description": description}),
            Self::Integer => json!({"type": "integer", "description": description}),
            Self::Number => json!({"type": "number", "description": description}),
            Self::Boolean => json!({"type": "boolean", "description": description}),
            Self::Enum(values) => {
                json!({"type": "string", "description": description, "enum": values})
            }
            Self::StringArray => json!({
                "type": "array",
                "description": description,
                "items": {"type": "string"}
            }),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
    pub required: bool,
}

/// Accumulates parameter declarations for one tool.
#[derive(Debug, Clone)]
pub struct ToolBuilder {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::String, required)
    }

    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::Integer, required)
    }

    pub fn number(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::Number, required)
    }

    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::Boolean, required)
    }

    /// A string restricted to `allowed` values.
    pub fn enumeration(self, name: &str, description: &str, allowed: &[&str], required: bool) -> Self {
        let values = allowed.iter().map(|v| v.to_string()).collect();
        self.param(name, description, ParamKind::Enum(values), required)
    }

    pub fn string_array(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::StringArray, required)
    }

    /// Append an arbitrary parameter declaration.
    pub fn param(mut self, name: &str, description: &str, kind: ParamKind, required: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        });
        self
    }

    /// Finalize the descriptor.
    ///
    /// Fails if two parameters share a name. A tool without parameters is
    /// valid and gets an empty object schema.
    pub fn build(self) -> Result<Tool> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            if properties.contains_key(&param.name) {
                return Err(Error::DuplicateParameter {
                    tool: self.name,
                    param: param.name.clone(),
                });
            }
            properties.insert(param.name.clone(), param.kind.schema(&param.description));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        Ok(Tool {
            name: self.name,
            description: self.description,
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_all_param_kinds() {
        let tool = ToolBuilder::new("send_email", "Send an email")
            .string("to", "Recipient", true)
            .integer("priority", "Priority", false)
            .number("score", "Score", false)
            .boolean("draft", "Save as draft", false)
            .enumeration("format", "Body format", &["text", "html"], true)
            .string_array("cc", "Carbon copies", false)
            .build()
            .unwrap();

        assert_eq!(tool.name, "send_email");
        assert_eq!(tool.description, "Send an email");

        let schema = &tool.input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["to"]["type"], "string");
        assert_eq!(schema["properties"]["to"]["description"], "Recipient");
        assert_eq!(schema["properties"]["priority"]["type"], "integer");
        assert_eq!(schema["properties"]["score"]["type"], "number");
        assert_eq!(schema["properties"]["draft"]["type"], "boolean");
        assert_eq!(schema["properties"]["format"]["enum"], json!(["text", "html"]));
        assert_eq!(schema["properties"]["cc"]["items"]["type"], "string");
        assert_eq!(schema["required"], json!(["to", "format"]));
    }

    #[test]
    fn test_build_without_params() {
        let tool = ToolBuilder::new("list_labels", "List labels").build().unwrap();
        assert_eq!(
            tool.input_schema,
            json!({"type": "object", "properties": {}, "required": []})
        );
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let err = ToolBuilder::new("search", "Search")
            .string("query", "Query", true)
            .integer("query", "Again", false)
            .build()
            .unwrap_err();

        match err {
            Error::DuplicateParameter { tool, param } => {
                assert_eq!(tool, "search");
                assert_eq!(param, "query");
            }
            other => panic!("Expected DuplicateParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_required_preserves_declaration_order() {
        let tool = ToolBuilder::new("t", "t")
            .string("zeta", "", true)
            .string("alpha", "", true)
            .string("mid", "", false)
            .build()
            .unwrap();
        assert_eq!(tool.input_schema["required"], json!(["zeta", "alpha"]));
    }
}
