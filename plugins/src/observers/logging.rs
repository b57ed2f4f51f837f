use async_trait::async_trait;
use ckstate_core::api::{StateEvent, StateObserver};

/// Emits one structured `tracing` line per state change.
pub struct LoggingObserver {
    id: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            id: "logging".to_string(),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateObserver for LoggingObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
        tracing::info!(
            target: "ckstate.state",
            event_id = %event.id,
            kind = %event.kind,
            state_type = %event.state_type,
            key = %event.state_id,
            actor = event.actor.as_deref().unwrap_or("-"),
            has_old = event.old_value.is_some(),
            has_new = event.new_value.is_some(),
            "state changed"
        );
        Ok(())
    }
}
