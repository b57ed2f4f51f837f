use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use ckstate_core::api::{StateEvent, StateObserver};
use futures::FutureExt;
use tokio::sync::RwLock;

pub type AlertHandler = Arc<dyn Fn(&StateEvent) -> anyhow::Result<()> + Send + Sync>;

/// Fans each event out to named handlers on their own tasks. Handler errors
/// and panics are logged and go no further.
pub struct AlertingObserver {
    id: String,
    handlers: RwLock<Vec<(String, AlertHandler)>>,
}

impl AlertingObserver {
    pub fn new() -> Self {
        Self {
            id: "alerting".to_string(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_handler(&self, name: impl Into<String>, handler: AlertHandler) {
        self.handlers.write().await.push((name.into(), handler));
    }

    pub async fn handler_names(&self) -> Vec<String> {
        self.handlers
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }
}

impl Default for AlertingObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateObserver for AlertingObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
        let handlers = self.handlers.read().await.clone();
        if handlers.is_empty() {
            return Ok(());
        }
        let event = Arc::new(event.clone());

        for (name, handler) in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(async { handler(&event) })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(handler = %name, event_id = %event.id, error = %e, "alert handler failed");
                    }
                    Err(_) => {
                        tracing::error!(handler = %name, event_id = %event.id, "alert handler panicked");
                    }
                }
            });
        }
        Ok(())
    }
}
