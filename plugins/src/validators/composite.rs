use std::sync::Arc;

use ckstate_core::api::{StateValidator, ValidationError, ValidationRule};
use serde_json::Value;

/// Runs members in order; the first rejection wins and names the member's
/// position in its message.
pub struct CompositeValidator {
    validators: Vec<Arc<dyn StateValidator>>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<Arc<dyn StateValidator>>) -> Self {
        Self { validators }
    }
}

impl StateValidator for CompositeValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        for (index, validator) in self.validators.iter().enumerate() {
            validator.validate(state).map_err(|mut e| {
                e.message = format!("validator {index}: {}", e.message);
                e
            })?;
        }
        Ok(())
    }

    fn rules(&self) -> Vec<ValidationRule> {
        self.validators.iter().flat_map(|v| v.rules()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::{ToolStateValidator, WorkflowStateValidator};
    use serde_json::json;

    #[test]
    fn first_failure_wins() {
        let composite = CompositeValidator::new(vec![
            Arc::new(WorkflowStateValidator),
            Arc::new(ToolStateValidator::new()),
        ]);
        let err = composite.validate(&json!({"other": 1})).unwrap_err();
        assert!(err.message.starts_with("validator 1:"));
        assert_eq!(err.field, "tool_name");
        assert_eq!(composite.rules().len(), 2);
    }
}
