use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::StateType;

/// Structured validator rejection: every failure names a code and the field it
/// tripped on, plus a hint for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub field: String,
    pub message: String,
    pub suggestion: String,
}

impl ValidationError {
    pub fn new(code: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            field: field.into(),
            message: message.into(),
            suggestion: String::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Re-roots the offending field under `prefix` (used for embedded state).
    pub fn nested(mut self, prefix: &str) -> Self {
        self.field = if self.field.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}.{}", self.field)
        };
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.field, self.message)?;
        if !self.suggestion.is_empty() {
            write!(f, " ({})", self.suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("no provider registered for state type: {0}")]
    ProviderNotRegistered(StateType),
    #[error("state not found: {state_type}/{key}")]
    NotFound { state_type: StateType, key: String },
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("transaction operation {index} failed on {state_type}/{key}: {source}")]
    System {
        index: usize,
        state_type: StateType,
        key: String,
        #[source]
        source: Box<StateError>,
    },
    #[error("transaction already committed")]
    AlreadyCommitted,
    #[error("operation cancelled")]
    Cancelled,
    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StateError::NotFound { .. }
                | StateError::ProviderNotRegistered(_)
                | StateError::EventNotFound(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session expired: {0}")]
    Expired(String),
    #[error("session manager stopped")]
    Stopped,
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_) | SessionError::Expired(_))
    }
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("context request cancelled for session {0}")]
    Cancelled(String),
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("context error: {0}")]
    Context(#[from] ContextError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
