//! Text tools.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::mcp::args::ToolArgs;
use crate::mcp::handler::{success_result, ToolHandler};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::schema::ToolBuilder;

/// Upper bound on `transform_text` repetitions.
const MAX_REPEAT: i64 = 100;

/// Echo tool.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Return the given text unchanged.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to echo back"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult> {
        let text = args.require_string("text")?;
        Ok(success_result(text))
    }
}

/// Transform text tool.
pub struct TransformTextTool {
    definition: Tool,
}

impl TransformTextTool {
    pub fn new() -> Result<Self> {
        let definition = ToolBuilder::new(
            "transform_text",
            "Change the case of a piece of text and optionally repeat it.",
        )
        .string("text", "Text to transform", true)
        .enumeration(
            "case",
            "Case conversion to apply",
            &["upper", "lower", "title"],
            false,
        )
        .integer("repeat", "How many times to repeat the result (1-100)", false)
        .string("separator", "Separator placed between repetitions", false)
        .build()?;
        Ok(Self { definition })
    }
}

#[async_trait]
impl ToolHandler for TransformTextTool {
    fn definition(&self) -> Tool {
        self.definition.clone()
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult> {
        let text = args.require_string("text")?;
        let converted = match args.optional_string("case").as_deref() {
            None => text,
            Some("upper") => text.to_uppercase(),
            Some("lower") => text.to_lowercase(),
            Some("title") => title_case(&text),
            Some(other) => {
                return Err(Error::InvalidToolArguments(format!(
                    "unsupported case: {}",
                    other
                )))
            }
        };

        let repeat = args.i64_or("repeat", 1).clamp(1, MAX_REPEAT) as usize;
        let separator = args.string_or("separator", " ");
        let output = vec![converted.as_str(); repeat].join(&separator);

        Ok(success_result(output))
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
