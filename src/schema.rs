//! Schema descriptors for structured model output.
//!
//! A [`Schema`] is both the documentation rendered into the system prompt and the
//! validation target of the output parser. It is immutable once built and is passed
//! explicitly to every format/parse call.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::SchemaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Matches JSON-schema type names, including ones a schema field never declares.
    pub(crate) fn is_schema_type_name(name: &str) -> bool {
        matches!(
            name,
            "string" | "number" | "integer" | "boolean" | "object" | "array" | "null"
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

impl SchemaField {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            field_type,
            required,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// The fixed schema every intermediate chain-of-thought step is parsed against.
    pub fn agent_step() -> Self {
        let fields = vec![
            SchemaField::new("toolName", FieldType::String, "Name of the tool to use", false),
            SchemaField::new(
                "toolInput",
                FieldType::Object,
                "Input for the selected tool",
                false,
            ),
            SchemaField::new(
                "isComplete",
                FieldType::Boolean,
                "Whether the task is complete, must be 'true' or 'false'",
                true,
            ),
            SchemaField::new(
                "nextStep",
                FieldType::String,
                "The next step to take if the task is not complete",
                false,
            ),
            SchemaField::new(
                "thought",
                FieldType::String,
                "This section is to capture your thoughts on the current task that can carry over to the next",
                false,
            ),
            SchemaField::new(
                "nextWorkflowName",
                FieldType::String,
                "Name for the next workflow",
                true,
            ),
        ];
        Self { fields }
    }

    /// Schema for a direct tool choice: the model must name a tool and its input.
    pub fn tool_selection() -> Self {
        let fields = vec![
            SchemaField::new("toolName", FieldType::String, "Name of the tool to use", true),
            SchemaField::new(
                "toolInput",
                FieldType::Object,
                "Input for the selected tool",
                true,
            ),
        ];
        Self { fields }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|field| field.required)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Property map of `name -> {type, description}` in insertion order.
    pub fn build(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| {
                (
                    field.name.clone(),
                    json!({
                        "type": field.field_type.as_str(),
                        "description": field.description,
                    }),
                )
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<SchemaField>,
}

impl SchemaBuilder {
    pub fn required(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields
            .push(SchemaField::new(name, field_type, description, true));
        self
    }

    pub fn optional(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields
            .push(SchemaField::new(name, field_type, description, false));
        self
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_preserves_insertion_order() {
        let schema = Schema::builder()
            .required("zeta", FieldType::String, "last letter")
            .optional("alpha", FieldType::Number, "first letter")
            .required("mid", FieldType::Array, "middle")
            .build()
            .expect("schema builds");

        let keys = schema.build().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(schema.build(), schema.build());
    }

    #[test]
    fn build_maps_type_and_description() {
        let schema = Schema::builder()
            .required("answer", FieldType::String, "The answer")
            .build()
            .expect("schema builds");

        assert_eq!(
            Value::Object(schema.build()),
            json!({"answer": {"type": "string", "description": "The answer"}})
        );
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = Schema::builder()
            .required("answer", FieldType::String, "one")
            .optional("answer", FieldType::Number, "two")
            .build()
            .expect_err("duplicate must fail");

        assert_eq!(err, SchemaError::DuplicateField("answer".to_string()));
    }

    #[test]
    fn agent_step_schema_requires_completion_and_next_workflow() {
        let schema = Schema::agent_step();
        let required = schema
            .required_fields()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(required, vec!["isComplete", "nextWorkflowName"]);
        assert_eq!(schema.len(), 6);
        assert_eq!(
            schema.field("toolInput").map(|field| field.field_type),
            Some(FieldType::Object)
        );
    }

    #[test]
    fn field_deserializes_from_wire_shape() {
        let field: SchemaField = serde_json::from_value(json!({
            "name": "domain",
            "description": "The domain being analyzed",
            "type": "string",
            "required": true
        }))
        .expect("field deserializes");

        assert_eq!(field.field_type, FieldType::String);
        assert!(field.required);
    }
}
