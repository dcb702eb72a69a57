use serde_json::Value;

use crate::output::Record;

/// Append-only history of step records for a single loop run.
///
/// Owned by exactly one loop invocation and only cleared by an explicit [`clear`].
///
/// [`clear`]: WorkflowState::clear
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkflowState {
    steps: Vec<Record>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: Record) {
        self.steps.push(record);
    }

    pub fn history(&self) -> &[Record] {
        &self.steps
    }

    pub fn last(&self) -> Option<&Record> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// The whole history as a JSON array, for prompt context variables.
    pub fn history_value(&self) -> Value {
        Value::Array(self.steps.iter().map(Record::to_value).collect())
    }

    pub fn into_steps(self) -> Vec<Record> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(step: u64) -> Record {
        let mut record = Record::new();
        record.insert("step", json!(step));
        record
    }

    #[test]
    fn keeps_insertion_order_and_last_entry() {
        let mut state = WorkflowState::new();
        assert!(state.last().is_none());

        state.add(record(1));
        state.add(record(2));

        assert_eq!(state.len(), 2);
        assert_eq!(state.last(), Some(&record(2)));
        assert_eq!(state.history_value(), json!([{"step": 1}, {"step": 2}]));
    }

    #[test]
    fn clear_is_explicit() {
        let mut state = WorkflowState::new();
        state.add(record(1));
        state.clear();

        assert!(state.is_empty());
        assert_eq!(state.history_value(), json!([]));
    }
}
