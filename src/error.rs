use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate schema field: {0}")]
    DuplicateField(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("input must not be empty")]
    EmptyInput,
    #[error("failed to decode JSON output: {0}")]
    Malformed(String),
    #[error("received schema definition instead of content")]
    SchemaEcho,
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("output must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool {tool} failed: {message}")]
    Execution { tool: String, message: String },
    #[error("invalid input for {tool}: {message}")]
    InvalidInput { tool: String, message: String },
    #[error("duplicate tool registered: {0}")]
    Duplicate(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
    #[error("empty response from provider")]
    EmptyResponse,
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
}

/// Failure of a single step, tagged by the stage that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("LLM generation failed: {0}")]
    Generation(#[from] ProviderError),
    #[error("output parsing failed: {0}")]
    Parse(#[from] ParseError),
    #[error("tool dispatch failed: {0}")]
    Tool(#[from] ToolError),
    #[error("invalid result shape: {0}")]
    InvalidResultShape(String),
}

impl StepError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Parse(ParseError::MissingField(_)) => "field validation",
            Self::Parse(_) => "parsing",
            Self::Tool(_) => "tool dispatch",
            Self::InvalidResultShape(_) => "field validation",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow '{workflow}' failed: {source}")]
    Step {
        workflow: String,
        #[source]
        source: StepError,
    },
    #[error("synthesis step failed: {source}")]
    Synthesis {
        #[source]
        source: StepError,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("workflow configuration error: {0}")]
    Config(String),
    #[error("chain-of-thought loop ended without a result")]
    MissingResult,
}

impl WorkflowError {
    /// The step-level cause, if this error came out of a step.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step { source, .. } | Self::Synthesis { source } => Some(source),
            Self::Schema(_) | Self::Config(_) | Self::MissingResult => None,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Step { source, .. } | Self::Synthesis { source } => source.stage(),
            Self::Schema(_) | Self::Config(_) => "configuration",
            Self::MissingResult => "synthesis",
        }
    }
}
