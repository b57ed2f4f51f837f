use ckstate_core::api::{StateValidator, ValidationError, ValidationRule};
use serde_json::Value;

use super::session::{as_object, non_empty_str, SessionStateValidator};

pub const CONVERSATION_STAGES: [&str; 5] =
    ["planning", "building", "deploying", "monitoring", "optimizing"];

/// Conversation state: non-empty id, a valid embedded `session_state`, and a
/// known stage when one is set.
pub struct ConversationStateValidator {
    session: SessionStateValidator,
}

impl ConversationStateValidator {
    pub fn new() -> Self {
        Self {
            session: SessionStateValidator,
        }
    }
}

impl Default for ConversationStateValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateValidator for ConversationStateValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        let map = as_object(state, "conversation")?;
        non_empty_str(map, "conversation_id")?;

        let session = map.get("session_state").ok_or_else(|| {
            ValidationError::new("required", "session_state", "session_state is missing")
                .with_suggestion("Embed the owning session's state")
        })?;
        self.session
            .validate(session)
            .map_err(|e| e.nested("session_state"))?;

        match map.get("current_stage") {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(stage)) if CONVERSATION_STAGES.contains(&stage.as_str()) => Ok(()),
            Some(other) => Err(ValidationError::new(
                "invalid_value",
                "current_stage",
                format!("unknown stage {other}"),
            )
            .with_suggestion(format!("Use one of: {}", CONVERSATION_STAGES.join(", ")))),
        }
    }

    fn rules(&self) -> Vec<ValidationRule> {
        let mut rules = vec![
            ValidationRule::required(
                "conversation_id",
                "conversation_id",
                "Conversation ID must be non-empty",
            ),
            ValidationRule::optional("current_stage", "current_stage", "Stage must be a known stage"),
        ];
        rules.extend(self.session.rules().into_iter().map(|mut r| {
            r.field = format!("session_state.{}", r.field);
            r
        }));
        rules
    }
}
