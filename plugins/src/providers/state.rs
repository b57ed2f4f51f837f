use std::sync::Arc;

use async_trait::async_trait;
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType, Event,
    StateEngine, StateType,
};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::{ensure_live, metadata_map};
use crate::observers::MetricsObserver;

const RECENT_PER_TYPE: usize = 5;

/// Engine-wide change counters and the session's own recent changes.
pub struct StateContextProvider {
    engine: StateEngine,
    metrics: Option<Arc<MetricsObserver>>,
}

impl StateContextProvider {
    pub fn new(engine: StateEngine, metrics: Option<Arc<MetricsObserver>>) -> Self {
        Self { engine, metrics }
    }
}

#[async_trait]
impl ContextProvider for StateContextProvider {
    fn name(&self) -> &str {
        "state"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![ContextType::State, ContextType::All],
            supports_history: true,
            max_history_days: 7,
            real_time_updates: true,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        ensure_live(cancel, "state context")?;
        let mut data = ContextData::new("state", ContextType::State, 0.6, 1.0);

        let mut state_metrics = Map::new();
        if let Some(observer) = &self.metrics {
            for (state_type, m) in observer.metrics().await {
                state_metrics.insert(state_type, serde_json::to_value(m)?);
            }
        }
        data.data
            .insert("state_metrics".into(), Value::Object(state_metrics));

        let mut changes = Vec::new();
        for state_type in [StateType::Session, StateType::Workflow, StateType::Tool] {
            let history = self
                .engine
                .get_state_history(state_type, &request.session_id, RECENT_PER_TYPE)
                .await;
            for ev in history.iter() {
                changes.push(json!({
                    "state_type": ev.state_type,
                    "event_type": ev.kind,
                    "timestamp": ev.timestamp,
                    "metadata": metadata_map(ev),
                }));
                let mut event = Event::new(format!("{}_{}", ev.state_type, ev.kind), "state")
                    .at(ev.timestamp);
                event.data = metadata_map(ev);
                data.events.push(event);
            }
        }
        let change_count = changes.len();
        data.data.insert("recent_changes".into(), Value::Array(changes));

        tracing::info!(
            session_id = %request.session_id,
            recent_changes = change_count,
            "state context retrieved"
        );
        Ok(data)
    }
}
