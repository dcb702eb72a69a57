pub mod builtin;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::output::Record;

pub const TOOL_NAME_KEY: &str = "toolName";
pub const TOOL_INPUT_KEY: &str = "toolInput";
pub const TOOL_OUTPUT_KEY: &str = "toolOutput";

type ToolHandler = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    input_shape: Option<Value>,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let unconfigured = name.clone();
        Self {
            name,
            description: description.into(),
            input_shape: None,
            handler: Arc::new(move |_input| {
                let tool = unconfigured.clone();
                Box::pin(async move {
                    Err(ToolError::Execution {
                        tool,
                        message: "tool handler not configured".to_string(),
                    })
                })
            }),
        }
    }

    /// Advisory input shape rendered into the tool catalog. Never enforced.
    pub fn with_input_shape(mut self, shape: Value) -> Self {
        self.input_shape = Some(shape);
        self
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |input| Box::pin(handler(input)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_shape(&self) -> Option<&Value> {
        self.input_shape.as_ref()
    }

    /// Invokes the handler with the raw input. Handler failures other than
    /// `Execution` are folded into `Execution` for this tool.
    pub async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        (self.handler)(input).await.map_err(|err| match err {
            ToolError::Execution { .. } => err,
            other => ToolError::Execution {
                tool: self.name.clone(),
                message: other.to_string(),
            },
        })
    }
}

/// Named tools in registration order, with O(1) lookup by name.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolSpec) -> Result<(), ToolError> {
        if self.index.contains_key(tool.name()) {
            return Err(ToolError::Duplicate(tool.name().to_string()));
        }
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn from_tools(tools: impl IntoIterator<Item = ToolSpec>) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(ToolSpec::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn run(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(input).await
    }
}

/// The `toolName`/`toolInput` pair a model emits when it picks a tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSelection {
    pub tool_name: String,
    pub tool_input: Value,
}

impl ToolSelection {
    pub fn from_record(record: &Record) -> Option<Self> {
        let tool_name = record.non_empty_str(TOOL_NAME_KEY)?.to_string();
        let tool_input = match record.get(TOOL_INPUT_KEY) {
            None | Some(Value::Null) => json!({}),
            Some(value) => value.clone(),
        };
        Some(Self {
            tool_name,
            tool_input,
        })
    }

    /// The input as handed to the tool: its JSON serialization, wrapped as a string.
    pub fn serialized_input(&self) -> Result<Value, ToolError> {
        serde_json::to_string(&self.tool_input)
            .map(Value::String)
            .map_err(|err| ToolError::InvalidInput {
                tool: self.tool_name.clone(),
                message: err.to_string(),
            })
    }
}

/// Decodes tool input that arrives either as a JSON value or as a JSON-encoded string.
pub fn decode_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, ToolError> {
    let invalid = |message: String| ToolError::InvalidInput {
        tool: tool.to_string(),
        message,
    };

    match input {
        Value::String(encoded) => {
            serde_json::from_str(&encoded).map_err(|err| invalid(err.to_string()))
        }
        other => serde_json::from_value(other).map_err(|err| invalid(err.to_string())),
    }
}
