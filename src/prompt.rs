//! Prompt assembly: output contract, variable substitution, and tool catalog.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::schema::Schema;
use crate::tools::ToolRegistry;

/// Values substituted into `{{name}}` placeholders, in insertion order.
pub type Variables = Map<String, Value>;

pub const DEFAULT_CONTRACT_DESCRIPTION: &str = "Return a JSON object with the specified fields.";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is valid")
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputContract {
    pub format: OutputFormat,
    pub schema: Schema,
    pub description: String,
}

impl OutputContract {
    pub fn json(schema: Schema) -> Self {
        Self {
            format: OutputFormat::Json,
            schema,
            description: DEFAULT_CONTRACT_DESCRIPTION.to_string(),
        }
    }

    fn render(&self) -> String {
        match self.format {
            OutputFormat::Json => {
                let properties = Value::Object(self.schema.build());
                let rendered = serde_json::to_string_pretty(&properties)
                    .unwrap_or_else(|_| properties.to_string());
                format!(
                    "\nYou must return a JSON object in the following format. {}\nUse this JSON schema: {}",
                    self.description, rendered
                )
            }
        }
    }
}

/// The two strings actually sent to a provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Clone, Debug)]
pub struct Prompt<'a> {
    pub system_message: String,
    pub user_message: String,
    pub variables: Variables,
    pub output_contract: OutputContract,
    pub tools: Option<&'a ToolRegistry>,
    formatted: bool,
    tools_added: bool,
}

impl<'a> Prompt<'a> {
    pub fn new(
        system_message: impl Into<String>,
        user_message: impl Into<String>,
        output_contract: OutputContract,
    ) -> Self {
        Self {
            system_message: system_message.into(),
            user_message: user_message.into(),
            variables: Variables::new(),
            output_contract,
            tools: None,
            formatted: false,
            tools_added: false,
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_tools(mut self, tools: Option<&'a ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Renders the output contract into the system message and substitutes variables into
    /// the user message, in place. Applying it again returns the same text unchanged.
    pub fn format(&mut self) -> (String, String) {
        if !self.formatted {
            self.system_message.push_str(&self.output_contract.render());
            self.user_message = substitute(&self.user_message, &self.variables);
            self.formatted = true;
        }
        (self.system_message.clone(), self.user_message.clone())
    }

    /// Appends the tool catalog to the system message, once.
    pub fn add_tools(&mut self) -> Result<(), ToolError> {
        let Some(registry) = self.tools else {
            return Ok(());
        };
        if self.tools_added {
            return Ok(());
        }

        let mut catalog = String::from("\nAvailable tools:\n");
        for tool in registry.iter() {
            catalog.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            if let Some(shape) = tool.input_shape() {
                let rendered =
                    serde_json::to_string_pretty(shape).map_err(|err| ToolError::InvalidInput {
                        tool: tool.name().to_string(),
                        message: format!("failed to render input shape: {err}"),
                    })?;
                catalog.push_str(&format!("  Inputs schema: {}\n", indent(&rendered, "  ")));
            }
        }

        self.system_message.push_str(&catalog);
        self.tools_added = true;
        Ok(())
    }

    pub fn rendered(&self) -> RenderedPrompt {
        RenderedPrompt {
            system: self.system_message.clone(),
            user: self.user_message.clone(),
        }
    }
}

/// Single-pass `{{key}}` substitution. Inserted text is never re-scanned and unknown
/// placeholders stay verbatim.
pub fn substitute(template: &str, variables: &Variables) -> String {
    if variables.is_empty() {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines().collect::<Vec<_>>().join(&format!("\n{prefix}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::FieldType;
    use crate::tools::ToolSpec;

    fn contract() -> OutputContract {
        OutputContract::json(
            Schema::builder()
                .required("answer", FieldType::String, "The answer")
                .build()
                .expect("schema builds"),
        )
    }

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn format_appends_contract_and_pretty_schema() {
        let mut prompt = Prompt::new("You are helpful.", "Hi", contract());
        let (system, user) = prompt.format();

        assert!(system.starts_with("You are helpful.\nYou must return a JSON object"));
        assert!(system.contains(DEFAULT_CONTRACT_DESCRIPTION));
        assert!(system.contains(
            "Use this JSON schema: {\n  \"answer\": {\n    \"type\": \"string\",\n    \"description\": \"The answer\"\n  }\n}"
        ));
        assert_eq!(user, "Hi");
        assert_eq!(prompt.system_message, system);
    }

    #[test]
    fn format_twice_does_not_double_append() {
        let mut prompt = Prompt::new("sys", "Hello {{name}}", contract())
            .with_variables(vars(json!({"name": "Ada"})));

        let first = prompt.format();
        let second = prompt.format();

        assert_eq!(first, second);
        assert_eq!(first.0.matches("Use this JSON schema").count(), 1);
    }

    #[test]
    fn substitution_replaces_every_occurrence() {
        let rendered = substitute(
            "{{x}} and {{x}} but not {{y}}",
            &vars(json!({"x": "one"})),
        );

        assert_eq!(rendered, "one and one but not {{y}}");
        assert_eq!(rendered.matches("{{x}}").count(), 0);
    }

    #[test]
    fn substitution_is_not_recursive() {
        let rendered = substitute(
            "{{a}} / {{b}}",
            &vars(json!({"a": "{{b}}", "b": "{{a}}"})),
        );

        assert_eq!(rendered, "{{b}} / {{a}}");
    }

    #[test]
    fn non_string_values_render_as_compact_json() {
        let rendered = substitute(
            "ctx={{context}} n={{n}} ok={{ok}}",
            &vars(json!({"context": [{"step": 1}], "n": 3, "ok": true})),
        );

        assert_eq!(rendered, r#"ctx=[{"step":1}] n=3 ok=true"#);
    }

    #[test]
    fn add_tools_lists_registry_in_order_once() {
        let registry = ToolRegistry::new()
            .with_tool(
                ToolSpec::new("whois", "domain lookup").with_input_shape(json!({"domain": "string"})),
            )
            .and_then(|registry| registry.with_tool(ToolSpec::new("readFile", "read a file")))
            .expect("registry builds");

        let mut prompt = Prompt::new("sys", "user", contract()).with_tools(Some(&registry));
        prompt.format();
        prompt.add_tools().expect("tools render");
        prompt.add_tools().expect("second call is a no-op");

        let system = prompt.rendered().system;
        assert_eq!(system.matches("Available tools:").count(), 1);

        let whois = system.find("- whois: domain lookup").expect("whois listed");
        let read = system.find("- readFile: read a file").expect("readFile listed");
        assert!(whois < read);
        assert!(system.contains("  Inputs schema: {\n    \"domain\": \"string\"\n  }"));
    }

    #[test]
    fn add_tools_without_registry_is_a_no_op() {
        let mut prompt = Prompt::new("sys", "user", contract());
        prompt.add_tools().expect("no-op");
        assert_eq!(prompt.system_message, "sys");
    }
}
