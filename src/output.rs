//! Turning raw model text into schema-checked [`Record`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, StepError};
use crate::schema::{FieldType, Schema};

/// Structured output of one step: a JSON object keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Returns the field as a string, failing when it is absent or not a string.
    pub fn str_field(&self, key: &str) -> Result<&str, StepError> {
        match self.0.get(key) {
            Some(Value::String(value)) => Ok(value),
            Some(other) => Err(shape_error(key, "a string", other)),
            None => Err(StepError::InvalidResultShape(format!(
                "field '{key}' is missing"
            ))),
        }
    }

    /// Returns the field as a bool, failing when it is absent or not a bool.
    pub fn bool_field(&self, key: &str) -> Result<bool, StepError> {
        match self.0.get(key) {
            Some(Value::Bool(value)) => Ok(*value),
            Some(other) => Err(shape_error(key, "a boolean", other)),
            None => Err(StepError::InvalidResultShape(format!(
                "field '{key}' is missing"
            ))),
        }
    }

    /// Returns the field as a string; `null` and absence map to `None`.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, StepError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(shape_error(key, "a string", other)),
        }
    }

    /// A string field that is present and not blank.
    pub fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Boolean flag that also accepts the strings `"true"`/`"false"`, which models
    /// often emit for boolean fields.
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::String(value)) => value.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

fn shape_error(key: &str, expected: &str, found: &Value) -> StepError {
    StepError::InvalidResultShape(format!(
        "field '{key}' must be {expected}, found {}",
        value_kind(found)
    ))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub trait OutputParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Record, ParseError>;
}

/// Parses JSON model output and checks it structurally against a [`Schema`].
///
/// Only presence of required fields is checked; value types are not, since model
/// output types are unreliable. Undeclared fields pass through.
#[derive(Debug, Clone, Copy)]
pub struct JsonParser<'a> {
    schema: &'a Schema,
}

impl<'a> JsonParser<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    fn is_schema_echo(&self, object: &Map<String, Value>) -> bool {
        if object.contains_key("properties") {
            return true;
        }

        // A bare `type` descriptor only counts when the real fields are absent.
        let incomplete = self
            .schema
            .required_fields()
            .any(|field| !object.contains_key(&field.name));
        if incomplete
            && self.schema.field("type").is_none()
            && object
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(FieldType::is_schema_type_name)
        {
            return true;
        }

        // Every declared field answered with `{type, description}` is the property map
        // from `Schema::build` sent back verbatim.
        !self.schema.is_empty()
            && self.schema.fields().iter().all(|field| {
                object
                    .get(&field.name)
                    .and_then(Value::as_object)
                    .is_some_and(|entry| {
                        entry.get("type").and_then(Value::as_str)
                            == Some(field.field_type.as_str())
                            && entry.contains_key("description")
                    })
            })
    }
}

impl OutputParser for JsonParser<'_> {
    fn parse(&self, raw: &str) -> Result<Record, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let decoded: Value =
            serde_json::from_str(raw).map_err(|err| ParseError::Malformed(err.to_string()))?;

        let Value::Object(object) = decoded else {
            return Err(ParseError::NotAnObject);
        };

        if self.is_schema_echo(&object) {
            return Err(ParseError::SchemaEcho);
        }

        if let Some(missing) = self
            .schema
            .required_fields()
            .find(|field| !object.contains_key(&field.name))
        {
            return Err(ParseError::MissingField(missing.name.clone()));
        }

        Ok(Record(object))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn answer_schema() -> Schema {
        Schema::builder()
            .required("answer", FieldType::String, "The answer")
            .build()
            .expect("schema builds")
    }

    #[test]
    fn parses_record_with_required_field() {
        let schema = answer_schema();
        let record = JsonParser::new(&schema)
            .parse(r#"{"answer":"42"}"#)
            .expect("parse succeeds");

        assert_eq!(record.into_value(), json!({"answer": "42"}));
    }

    #[test]
    fn rejects_empty_and_blank_input() {
        let schema = answer_schema();
        let parser = JsonParser::new(&schema);

        assert_eq!(parser.parse(""), Err(ParseError::EmptyInput));
        assert_eq!(parser.parse("  \n"), Err(ParseError::EmptyInput));
    }

    #[test]
    fn rejects_malformed_json() {
        let schema = answer_schema();
        let err = JsonParser::new(&schema)
            .parse("{answer: 42")
            .expect_err("must fail");

        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn rejects_non_object_json() {
        let schema = answer_schema();
        let err = JsonParser::new(&schema)
            .parse(r#"["answer"]"#)
            .expect_err("must fail");

        assert_eq!(err, ParseError::NotAnObject);
    }

    #[test]
    fn properties_key_is_always_a_schema_echo() {
        let schema = answer_schema();
        let parser = JsonParser::new(&schema);

        assert_eq!(
            parser.parse(r#"{"answer":"42","properties":{}}"#),
            Err(ParseError::SchemaEcho)
        );
        assert_eq!(
            parser.parse(r#"{"properties":null}"#),
            Err(ParseError::SchemaEcho)
        );
    }

    #[test]
    fn type_descriptor_is_a_schema_echo() {
        let schema = answer_schema();
        let err = JsonParser::new(&schema)
            .parse(r#"{"question":"What is the answer?","type":"string"}"#)
            .expect_err("must fail");

        assert_eq!(err, ParseError::SchemaEcho);
    }

    #[test]
    fn stray_type_key_on_complete_record_passes_through() {
        let schema = answer_schema();
        let record = JsonParser::new(&schema)
            .parse(r#"{"answer":"42","type":"string"}"#)
            .expect("complete record is data");
        assert_eq!(record.str_field("type"), Ok("string"));

        let step_schema = Schema::agent_step();
        let step = JsonParser::new(&step_schema)
            .parse(r#"{"isComplete":true,"nextWorkflowName":"x","type":"object"}"#)
            .expect("complete step is data");
        assert!(step.flag("isComplete"));
    }

    #[test]
    fn declared_type_field_is_not_an_echo() {
        let schema = Schema::builder()
            .required("type", FieldType::String, "record kind")
            .build()
            .expect("schema builds");

        let record = JsonParser::new(&schema)
            .parse(r#"{"type":"string"}"#)
            .expect("parse succeeds");
        assert_eq!(record.str_field("type"), Ok("string"));
    }

    #[test]
    fn echoed_property_map_is_rejected() {
        let schema = answer_schema();
        let echoed = serde_json::to_string(&schema.build()).expect("serializes");

        assert_eq!(
            JsonParser::new(&schema).parse(&echoed),
            Err(ParseError::SchemaEcho)
        );
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let schema = answer_schema();
        assert_eq!(
            JsonParser::new(&schema).parse("{}"),
            Err(ParseError::MissingField("answer".to_string()))
        );
    }

    #[test]
    fn first_missing_field_follows_schema_order() {
        let schema = Schema::builder()
            .required("first", FieldType::String, "a")
            .optional("maybe", FieldType::String, "b")
            .required("second", FieldType::String, "c")
            .build()
            .expect("schema builds");

        assert_eq!(
            JsonParser::new(&schema).parse(r#"{"maybe":"x"}"#),
            Err(ParseError::MissingField("first".to_string()))
        );
        assert_eq!(
            JsonParser::new(&schema).parse(r#"{"first":"x"}"#),
            Err(ParseError::MissingField("second".to_string()))
        );
    }

    #[test]
    fn extra_fields_pass_through_and_types_are_not_checked() {
        let schema = answer_schema();
        let record = JsonParser::new(&schema)
            .parse(r#"{"answer":42,"confidence":0.9}"#)
            .expect("parse succeeds");

        assert_eq!(record.get("answer"), Some(&json!(42)));
        assert_eq!(record.get("confidence"), Some(&json!(0.9)));
    }

    #[test]
    fn accessors_report_shape_errors() {
        let record = Record::from(
            json!({"name": "whois", "done": "yes", "flag": "TRUE", "nothing": null})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );

        assert_eq!(record.str_field("name"), Ok("whois"));
        assert!(matches!(
            record.bool_field("done"),
            Err(StepError::InvalidResultShape(_))
        ));
        assert!(matches!(
            record.str_field("absent"),
            Err(StepError::InvalidResultShape(_))
        ));
        assert_eq!(record.opt_str("nothing"), Ok(None));
        assert!(record.flag("flag"));
        assert!(!record.flag("done"));
        assert_eq!(record.non_empty_str("absent"), None);
    }
}
