//! Chain-of-thought workflow engine for Rust.
//!
//! v0 surface:
//! - `Workflow` steps: prompt formatting, LLM generation, schema-checked JSON parsing
//! - At most one tool dispatch per step through a `ToolRegistry`
//! - `run_chain_of_thought` loop with a step budget and a final synthesis step
//! - OpenAI-compatible and Anthropic adapters behind `LlmClient`

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod output;
pub mod prompt;
pub mod schema;
pub mod state;
pub mod tools;
pub mod workflow;

pub use config::{ToolMissPolicy, WorkflowConfig};
pub use error::{ParseError, ProviderError, SchemaError, StepError, ToolError, WorkflowError};
pub use llm::{AnthropicClient, ClientConfig, LlmClient, ModelInfo, OpenAiClient};
pub use logging::{LogEntry, MemoryLogger, TracingLogger, WorkflowLogger};
pub use output::{JsonParser, OutputParser, Record};
pub use prompt::{OutputContract, OutputFormat, Prompt, RenderedPrompt, Variables};
pub use schema::{FieldType, Schema, SchemaBuilder, SchemaField};
pub use state::WorkflowState;
pub use tools::{ToolRegistry, ToolSelection, ToolSpec};
pub use workflow::{LoopEvent, LoopResult, LoopState, Workflow, WorkflowBuilder};
