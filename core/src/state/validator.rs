use serde_json::Value;

use super::types::ValidationRule;
use crate::error::ValidationError;

/// Pure check run before a write reaches its provider.
pub trait StateValidator: Send + Sync {
    fn validate(&self, state: &Value) -> Result<(), ValidationError>;

    fn rules(&self) -> Vec<ValidationRule> {
        Vec::new()
    }
}
