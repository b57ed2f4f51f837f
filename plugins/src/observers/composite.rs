use std::sync::Arc;

use async_trait::async_trait;
use ckstate_core::api::{StateEvent, StateObserver};

/// Forwards to a fixed list of observers in order and stops at the first
/// error. Inactive members are skipped.
pub struct CompositeObserver {
    id: String,
    observers: Vec<Arc<dyn StateObserver>>,
}

impl CompositeObserver {
    pub fn new(id: impl Into<String>, observers: Vec<Arc<dyn StateObserver>>) -> Self {
        Self {
            id: id.into(),
            observers,
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[async_trait]
impl StateObserver for CompositeObserver {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.observers.iter().any(|o| o.is_active())
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
        for observer in self.observers.iter().filter(|o| o.is_active()) {
            observer
                .on_state_change(event)
                .await
                .map_err(|e| e.context(format!("observer {} failed", observer.id())))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::AuditObserver;
    use ckstate_core::api::{StateEventKind, StateType};

    struct Failing;

    #[async_trait]
    impl StateObserver for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        async fn on_state_change(&self, _event: &StateEvent) -> anyhow::Result<()> {
            anyhow::bail!("sink rejected event")
        }
    }

    #[tokio::test]
    async fn first_error_stops_the_chain() {
        let before = Arc::new(AuditObserver::new(10));
        let after = Arc::new(AuditObserver::new(10));
        let members: Vec<Arc<dyn StateObserver>> = vec![
            before.clone() as Arc<dyn StateObserver>,
            Arc::new(Failing),
            after.clone(),
        ];
        let composite = CompositeObserver::new("chain", members);

        let event = StateEvent::new(StateEventKind::Updated, StateType::Tool, "t");
        let err = composite.on_state_change(&event).await.unwrap_err();

        assert!(err.to_string().contains("failing"));
        assert_eq!(before.len().await, 1);
        assert!(after.is_empty().await);
    }
}
