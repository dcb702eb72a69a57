//! Chain-of-thought loop: repeated agent steps, then one synthesis step.

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use crate::error::WorkflowError;
use crate::output::Record;
use crate::prompt::Variables;
use crate::schema::Schema;
use crate::state::WorkflowState;
use crate::tools::ToolRegistry;
use crate::workflow::Workflow;

pub const PREVIOUS_RESULT_KEY: &str = "previousResult";
pub const WORKFLOW_HISTORY_KEY: &str = "workflowHistory";
pub const SYNTHESIS_CONTEXT_KEY: &str = "context";

const IS_COMPLETE_KEY: &str = "isComplete";
const NEXT_STEP_KEY: &str = "nextStep";
const NEXT_WORKFLOW_KEY: &str = "nextWorkflowName";

const SYNTHESIS_SYSTEM_MESSAGE: &str = "You are a helpful analysis AI that can take all of the data gathered and provide accurate responses.
Ensure that you are not returning schema definition.";

const SYNTHESIS_USER_MESSAGE: &str = "Please finish your analysis and respond with the properly formatted JSON object from the provided schema.
Please use this context to complete the analysis: {{context}}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Running,
    Completed,
    /// Step budget ran out; synthesis still runs.
    Exhausted,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoopResult {
    pub steps: Vec<Record>,
    pub final_output: Record,
    pub step_count: usize,
    /// `Completed` or `Exhausted`.
    pub status: LoopState,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    Step {
        index: usize,
        workflow_name: String,
        record: Record,
    },
    Finished(LoopResult),
}

impl Workflow {
    /// Runs the full loop and returns the accumulated steps with the synthesized output.
    pub async fn run_chain_of_thought(
        &self,
        system_message: &str,
        user_message: &str,
        target_schema: &Schema,
        initial_variables: Variables,
        tools: Option<&ToolRegistry>,
    ) -> Result<LoopResult, WorkflowError> {
        let stream = self.chain_of_thought_stream(
            system_message,
            user_message,
            target_schema,
            initial_variables,
            tools,
        );
        futures_util::pin_mut!(stream);

        let mut result = None;
        while let Some(event) = stream.next().await {
            match event? {
                LoopEvent::Finished(done) => result = Some(done),
                LoopEvent::Step { .. } => {}
            }
        }

        result.ok_or(WorkflowError::MissingResult)
    }

    /// Same loop as [`run_chain_of_thought`](Self::run_chain_of_thought), yielding each
    /// completed step as it lands.
    pub fn chain_of_thought_stream<'a>(
        &'a self,
        system_message: &'a str,
        user_message: &'a str,
        target_schema: &'a Schema,
        initial_variables: Variables,
        tools: Option<&'a ToolRegistry>,
    ) -> impl Stream<Item = Result<LoopEvent, WorkflowError>> + 'a {
        try_stream! {
            let step_schema = Schema::agent_step();
            let mut state = WorkflowState::new();
            let mut variables = initial_variables;
            let mut current_message = user_message.to_string();
            let mut workflow_name = self.config.entry_workflow_name.clone();
            let mut loop_state = LoopState::Running;

            self.logger.record(
                &workflow_name,
                &format!("Starting chain-of-thought loop (max {} steps)", self.config.max_steps),
            );

            for index in 0..self.config.max_steps as usize {
                let record = self
                    .run_step(
                        &workflow_name,
                        system_message,
                        &current_message,
                        &step_schema,
                        &variables,
                        tools,
                    )
                    .await
                    .inspect_err(|_| self.transition(&workflow_name, LoopState::Failed, index))?;

                state.add(record.clone());
                variables.insert(PREVIOUS_RESULT_KEY.to_string(), record.to_value());
                variables.insert(WORKFLOW_HISTORY_KEY.to_string(), state.history_value());

                yield LoopEvent::Step {
                    index,
                    workflow_name: workflow_name.clone(),
                    record: record.clone(),
                };

                if record.flag(IS_COMPLETE_KEY) {
                    loop_state = LoopState::Completed;
                    break;
                }

                let (Some(next_step), Some(next_workflow)) = (
                    record.non_empty_str(NEXT_STEP_KEY),
                    record.non_empty_str(NEXT_WORKFLOW_KEY),
                ) else {
                    loop_state = LoopState::Completed;
                    break;
                };

                current_message = next_step.to_string();
                workflow_name = next_workflow.to_string();
            }

            if loop_state == LoopState::Running {
                loop_state = LoopState::Exhausted;
            }
            self.transition(&workflow_name, loop_state, state.len());

            let mut context = Variables::new();
            context.insert(SYNTHESIS_CONTEXT_KEY.to_string(), state.history_value());

            let final_output = self
                .run_step(
                    &self.config.synthesis_workflow_name,
                    SYNTHESIS_SYSTEM_MESSAGE,
                    SYNTHESIS_USER_MESSAGE,
                    target_schema,
                    &context,
                    None,
                )
                .await
                .map_err(|err| match err {
                    WorkflowError::Step { source, .. } => WorkflowError::Synthesis { source },
                    other => other,
                })?;

            let steps = state.into_steps();
            yield LoopEvent::Finished(LoopResult {
                step_count: steps.len(),
                steps,
                final_output,
                status: loop_state,
            });
        }
    }

    fn transition(&self, workflow_name: &str, state: LoopState, steps: usize) {
        tracing::debug!(workflow = workflow_name, ?state, steps, "loop transition");
        let message = match state {
            LoopState::Failed => format!("Error: loop failed after {steps} completed steps"),
            other => format!("Loop {other:?} after {steps} steps"),
        };
        self.logger.record(workflow_name, &message);
    }
}
