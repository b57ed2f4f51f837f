use async_trait::async_trait;

use super::types::StateEvent;

/// Passive consumer of state-change events. Failures are logged by the
/// dispatcher and never reach the writer.
#[async_trait]
pub trait StateObserver: Send + Sync {
    fn id(&self) -> &str;

    fn is_active(&self) -> bool {
        true
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()>;
}
