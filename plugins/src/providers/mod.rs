pub mod build;
pub mod deployment;
pub mod performance;
pub mod security;
pub mod state;

pub use build::BuildContextProvider;
pub use deployment::DeploymentContextProvider;
pub use performance::{PerformanceContextProvider, PerformanceMetrics};
pub use security::SecurityContextProvider;
pub use state::StateContextProvider;

use ckstate_core::api::{
    Event, SessionError, SessionManager, SessionState, StateEngine, StateEvent, StateEventKind,
    StateType,
};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

pub(crate) fn ensure_live(cancel: &CancellationToken, stage: &str) -> anyhow::Result<()> {
    if cancel.is_cancelled() {
        anyhow::bail!("{stage} cancelled");
    }
    Ok(())
}

/// Reads the session without refreshing its access time, so building a
/// context does not change eviction order.
pub(crate) async fn session_snapshot(
    sessions: &SessionManager,
    session_id: &str,
) -> anyhow::Result<SessionState> {
    sessions
        .peek(session_id)
        .await
        .ok_or_else(|| SessionError::NotFound(session_id.to_string()).into())
}

pub(crate) fn metadata_map(event: &StateEvent) -> Map<String, Value> {
    event
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Updated events from one tool's history, as data rows plus timeline events.
/// A `success: false` in the written value marks the event as a failure.
pub(crate) async fn tool_runs(
    engine: &StateEngine,
    tool_key: &str,
    limit: usize,
    event_type: &str,
    source: &str,
) -> (Vec<Value>, Vec<Event>) {
    let history = engine
        .get_state_history(StateType::Tool, tool_key, limit)
        .await;

    let mut rows = Vec::new();
    let mut events = Vec::new();
    for ev in history.iter().filter(|e| e.kind == StateEventKind::Updated) {
        rows.push(json!({
            "timestamp": ev.timestamp,
            "metadata": metadata_map(ev),
        }));

        let failed = ev
            .new_value
            .as_ref()
            .and_then(|v| v.get("success"))
            .and_then(Value::as_bool)
            == Some(false);
        let mut event = Event::new(
            if failed {
                format!("{event_type}_failure")
            } else {
                event_type.to_string()
            },
            source,
        )
        .at(ev.timestamp);
        if failed {
            event = event.with_severity("high");
        }
        event.data = metadata_map(ev);
        events.push(event);
    }
    (rows, events)
}
