//! Step execution and the workflow entry points.
//!
//! A step is one LLM generation, one parse against the step's schema, and at most one
//! tool dispatch. [`Workflow::run_step`] is the building block; the chain-of-thought loop
//! in [`cot`] drives it repeatedly.

pub mod cot;

use std::sync::Arc;

use serde_json::json;

use crate::config::{ToolMissPolicy, WorkflowConfig};
use crate::error::{StepError, ToolError, WorkflowError};
use crate::llm::LlmClient;
use crate::logging::{TracingLogger, WorkflowLogger};
use crate::output::{JsonParser, OutputParser, Record};
use crate::prompt::{OutputContract, Prompt, RenderedPrompt, Variables};
use crate::schema::Schema;
use crate::tools::{TOOL_OUTPUT_KEY, ToolRegistry, ToolSelection};

pub use cot::{LoopEvent, LoopResult, LoopState};

pub struct WorkflowBuilder {
    client: Option<Arc<dyn LlmClient>>,
    logger: Arc<dyn WorkflowLogger>,
    config: WorkflowConfig,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self {
            client: None,
            logger: Arc::new(TracingLogger),
            config: WorkflowConfig::default(),
        }
    }
}

impl WorkflowBuilder {
    pub fn client<C>(mut self, client: C) -> Self
    where
        C: LlmClient + 'static,
    {
        self.client = Some(Arc::new(client));
        self
    }

    pub fn shared_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn logger<L>(mut self, logger: L) -> Self
    where
        L: WorkflowLogger + 'static,
    {
        self.logger = Arc::new(logger);
        self
    }

    pub fn shared_logger(mut self, logger: Arc<dyn WorkflowLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn tool_miss_policy(mut self, policy: ToolMissPolicy) -> Self {
        self.config.tool_miss_policy = policy;
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let Some(client) = self.client else {
            return Err(WorkflowError::Config(
                "workflow client must be configured via WorkflowBuilder::client(...)".to_string(),
            ));
        };

        if self.config.max_steps == 0 {
            return Err(WorkflowError::Config(
                "max_steps must be at least 1".to_string(),
            ));
        }

        Ok(Workflow {
            client,
            logger: self.logger,
            config: self.config,
        })
    }
}

/// The engine. Holds no per-run state, so one instance can serve independent runs.
#[derive(Clone)]
pub struct Workflow {
    client: Arc<dyn LlmClient>,
    logger: Arc<dyn WorkflowLogger>,
    config: WorkflowConfig,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("model", &self.client.model_info().model)
            .field("config", &self.config)
            .finish()
    }
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs one step: format, generate, parse, then dispatch a selected tool if a
    /// registry is supplied.
    pub async fn run_step(
        &self,
        workflow_name: &str,
        system_message: &str,
        user_message: &str,
        schema: &Schema,
        variables: &Variables,
        tools: Option<&ToolRegistry>,
    ) -> Result<Record, WorkflowError> {
        self.logger
            .record(workflow_name, "Starting workflow execution");

        let result = async {
            let rendered = render_prompt(system_message, user_message, schema, variables, tools)?;
            let mut record = self.generate_record(workflow_name, &rendered, schema).await?;
            if let Some(registry) = tools {
                self.dispatch_tool(workflow_name, &mut record, registry)
                    .await?;
            }
            Ok::<_, StepError>(record)
        }
        .await;

        result.map_err(|source| step_failure(workflow_name, source))
    }

    /// One-shot, non-looping step with no tools.
    pub async fn run_single_step_workflow(
        &self,
        workflow_name: &str,
        system_message: &str,
        user_message: &str,
        schema: &Schema,
        variables: &Variables,
    ) -> Result<Record, WorkflowError> {
        self.run_step(
            workflow_name,
            system_message,
            user_message,
            schema,
            variables,
            None,
        )
        .await
    }

    /// One-shot step whose whole purpose is a tool call. The model must select a tool
    /// that exists, and a failing tool fails the workflow.
    pub async fn run_tool_workflow(
        &self,
        workflow_name: &str,
        system_message: &str,
        user_message: &str,
        schema: &Schema,
        variables: &Variables,
        tools: &ToolRegistry,
    ) -> Result<Record, WorkflowError> {
        self.logger
            .record(workflow_name, "Starting workflow execution");

        let result = async {
            let rendered =
                render_prompt(system_message, user_message, schema, variables, Some(tools))?;
            let mut record = self.generate_record(workflow_name, &rendered, schema).await?;

            let selection = ToolSelection::from_record(&record).ok_or_else(|| {
                StepError::InvalidResultShape("model did not select a tool".to_string())
            })?;
            let input = selection.serialized_input()?;
            let output = tools
                .run(&selection.tool_name, input)
                .await
                .inspect_err(|err| {
                    self.logger
                        .record(workflow_name, &format!("Error running tool: {err}"));
                })?;

            record.insert(TOOL_OUTPUT_KEY, output);
            Ok::<_, StepError>(record)
        }
        .await;

        result.map_err(|source| step_failure(workflow_name, source))
    }

    /// Generation and parsing, retried up to `max_retries` extra times. Tool dispatch is
    /// outside this scope so a retried step never re-runs a tool.
    async fn generate_record(
        &self,
        workflow_name: &str,
        prompt: &RenderedPrompt,
        schema: &Schema,
    ) -> Result<Record, StepError> {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.generate_once(workflow_name, prompt, schema).await {
                Ok(record) => return Ok(record),
                Err(err) if attempt < attempts => {
                    tracing::debug!(
                        workflow = workflow_name,
                        attempt,
                        error = %err,
                        "retrying step"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn generate_once(
        &self,
        workflow_name: &str,
        prompt: &RenderedPrompt,
        schema: &Schema,
    ) -> Result<Record, StepError> {
        let response = match self.client.generate(prompt).await {
            Ok(response) => response,
            Err(err) => {
                self.logger
                    .record(workflow_name, &format!("Error generating response: {err}"));
                return Err(StepError::Generation(err));
            }
        };

        if let Err(err) = self.client.validate_response(&response) {
            self.logger
                .record(workflow_name, &format!("Error generating response: {err}"));
            return Err(StepError::Generation(err));
        }

        JsonParser::new(schema).parse(&response).map_err(|err| {
            self.logger
                .record(workflow_name, &format!("Error parsing response: {err}"));
            StepError::Parse(err)
        })
    }

    async fn dispatch_tool(
        &self,
        workflow_name: &str,
        record: &mut Record,
        tools: &ToolRegistry,
    ) -> Result<(), StepError> {
        let Some(selection) = ToolSelection::from_record(record) else {
            return Ok(());
        };

        let Some(tool) = tools.get(&selection.tool_name) else {
            return match self.config.tool_miss_policy {
                ToolMissPolicy::Skip => {
                    self.logger.record(
                        workflow_name,
                        &format!("Tool '{}' is not registered; skipping", selection.tool_name),
                    );
                    Ok(())
                }
                ToolMissPolicy::Fail => {
                    let err = ToolError::NotFound(selection.tool_name);
                    self.logger
                        .record(workflow_name, &format!("Error running tool: {err}"));
                    Err(err.into())
                }
            };
        };

        let input = selection.serialized_input()?;
        tracing::debug!(workflow = workflow_name, tool = tool.name(), "dispatching tool");

        let output = match tool.execute(input).await {
            Ok(output) => output,
            Err(err) => {
                self.logger
                    .record(workflow_name, &format!("Error running tool: {err}"));
                json!({"error": err.to_string()})
            }
        };

        record.insert(TOOL_OUTPUT_KEY, output);
        Ok(())
    }
}

fn render_prompt(
    system_message: &str,
    user_message: &str,
    schema: &Schema,
    variables: &Variables,
    tools: Option<&ToolRegistry>,
) -> Result<RenderedPrompt, StepError> {
    let mut prompt = Prompt::new(
        system_message,
        user_message,
        OutputContract::json(schema.clone()),
    )
    .with_variables(variables.clone())
    .with_tools(tools);

    prompt.format();
    prompt.add_tools()?;
    Ok(prompt.rendered())
}

fn step_failure(workflow_name: &str, source: StepError) -> WorkflowError {
    WorkflowError::Step {
        workflow: workflow_name.to_string(),
        source,
    }
}
