use std::collections::BTreeMap;

use ckstate_core::api::{StateValidator, ValidationError, ValidationRule};
use serde_json::Value;

use super::session::as_object;

/// Only rejects null.
pub struct WorkflowStateValidator;

impl StateValidator for WorkflowStateValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        if state.is_null() {
            return Err(ValidationError::new("required", "", "workflow state is null"));
        }
        Ok(())
    }

    fn rules(&self) -> Vec<ValidationRule> {
        vec![ValidationRule::required("not_null", "", "Workflow state must be present")]
    }
}

/// Only rejects null.
pub struct GlobalStateValidator;

impl StateValidator for GlobalStateValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        if state.is_null() {
            return Err(ValidationError::new("required", "", "global state is null"));
        }
        Ok(())
    }

    fn rules(&self) -> Vec<ValidationRule> {
        vec![ValidationRule::required("not_null", "", "Global state must be present")]
    }
}

pub type FieldCheck = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Tool state: an object whose registered fields each pass their own check.
/// A registered field that is absent fails as `required`.
pub struct ToolStateValidator {
    fields: BTreeMap<String, FieldCheck>,
}

impl ToolStateValidator {
    /// Starts with a `tool_name` string check.
    pub fn new() -> Self {
        Self::empty().with_field("tool_name", Box::new(|v: &Value| match v.as_str() {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err("tool_name must be a non-empty string".to_string()),
        }))
    }

    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, check: FieldCheck) -> Self {
        self.fields.insert(field.into(), check);
        self
    }
}

impl Default for ToolStateValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateValidator for ToolStateValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        let map = as_object(state, "tool")?;
        for (field, check) in &self.fields {
            let value = map.get(field).ok_or_else(|| {
                ValidationError::new("required", field.as_str(), format!("{field} is missing"))
            })?;
            check(value).map_err(|msg| ValidationError::new("invalid_value", field.as_str(), msg))?;
        }
        Ok(())
    }

    fn rules(&self) -> Vec<ValidationRule> {
        self.fields
            .keys()
            .map(|f| ValidationRule::required(f, f, "Field must pass its registered check"))
            .collect()
    }
}
