use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_STEPS: u32 = 50;
pub const DEFAULT_ENTRY_WORKFLOW: &str = "Entry Workflow";
pub const DEFAULT_SYNTHESIS_WORKFLOW: &str = "Exit Workflow";

/// What a step does when the model selects a tool the registry does not have.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMissPolicy {
    /// Leave the selection unconsumed; the record carries no `toolOutput`.
    #[default]
    Skip,
    /// Abort the step with `ToolError::NotFound`.
    Fail,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Chain-of-thought step budget before forced synthesis.
    pub max_steps: u32,
    /// Extra generate+parse attempts per step. Tool dispatch is never retried.
    pub max_retries: u32,
    pub tool_miss_policy: ToolMissPolicy,
    pub entry_workflow_name: String,
    pub synthesis_workflow_name: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_retries: 0,
            tool_miss_policy: ToolMissPolicy::Skip,
            entry_workflow_name: DEFAULT_ENTRY_WORKFLOW.to_string(),
            synthesis_workflow_name: DEFAULT_SYNTHESIS_WORKFLOW.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: WorkflowConfig =
            serde_json::from_value(json!({"max_steps": 5, "tool_miss_policy": "fail"}))
                .expect("config deserializes");

        assert_eq!(config.max_steps, 5);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.tool_miss_policy, ToolMissPolicy::Fail);
        assert_eq!(config.entry_workflow_name, DEFAULT_ENTRY_WORKFLOW);
    }
}
