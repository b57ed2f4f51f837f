use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ckstate_core::api::{StateEvent, StateEventKind, StateObserver, StateType};
use serde::Serialize;
use tokio::sync::RwLock;

/// Point-in-time view of one state type's change counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateTypeMetrics {
    pub total_changes: u64,
    pub create_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    /// Changes per minute over the sliding window.
    pub change_rate: f64,
    pub last_change: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    total: u64,
    create: u64,
    update: u64,
    delete: u64,
    last_change: Option<DateTime<Utc>>,
    window: VecDeque<DateTime<Utc>>,
}

impl Counters {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.window.front().is_some_and(|t| *t < cutoff) {
            self.window.pop_front();
        }
    }
}

/// Per-state-type counters with a sliding-window change rate.
pub struct MetricsObserver {
    id: String,
    window: Duration,
    counters: RwLock<HashMap<StateType, Counters>>,
}

impl MetricsObserver {
    pub fn new(window: Duration) -> Self {
        Self {
            id: "metrics".to_string(),
            window: window.max(Duration::from_secs(1)),
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Snapshot keyed by state type name. Types that never changed are absent.
    pub async fn metrics(&self) -> BTreeMap<String, StateTypeMetrics> {
        let now = Utc::now();
        let cutoff = self.cutoff(now);
        let minutes = self.window.as_secs_f64() / 60.0;

        let mut counters = self.counters.write().await;
        counters
            .iter_mut()
            .map(|(state_type, c)| {
                c.prune(cutoff);
                (
                    state_type.to_string(),
                    StateTypeMetrics {
                        total_changes: c.total,
                        create_count: c.create,
                        update_count: c.update,
                        delete_count: c.delete,
                        change_rate: c.window.len() as f64 / minutes,
                        last_change: c.last_change,
                    },
                )
            })
            .collect()
    }

    pub async fn metrics_for(&self, state_type: StateType) -> Option<StateTypeMetrics> {
        self.metrics().await.remove(state_type.as_str())
    }
}

#[async_trait]
impl StateObserver for MetricsObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
        let cutoff = self.cutoff(Utc::now());
        let mut counters = self.counters.write().await;
        let c = counters.entry(event.state_type).or_default();

        match event.kind {
            StateEventKind::Created => c.create += 1,
            StateEventKind::Updated | StateEventKind::Restored => c.update += 1,
            StateEventKind::Deleted | StateEventKind::Expired => c.delete += 1,
            StateEventKind::Accessed => return Ok(()),
        }
        c.total += 1;
        c.last_change = Some(event.timestamp);
        c.window.push_back(event.timestamp);
        c.prune(cutoff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn counts_by_kind_and_type() {
        let obs = MetricsObserver::new(Duration::from_secs(60));
        for kind in [
            StateEventKind::Created,
            StateEventKind::Updated,
            StateEventKind::Updated,
            StateEventKind::Deleted,
            StateEventKind::Accessed,
        ] {
            obs.on_state_change(&StateEvent::new(kind, StateType::Tool, "t"))
                .await
                .unwrap();
        }

        let m = obs.metrics_for(StateType::Tool).await.unwrap();
        assert_eq!(m.total_changes, 4);
        assert_eq!(m.create_count, 1);
        assert_eq!(m.update_count, 2);
        assert_eq!(m.delete_count, 1);
        assert_eq!(m.change_rate, 4.0);
        assert!(obs.metrics_for(StateType::Session).await.is_none());
    }

    #[tokio::test]
    async fn old_events_leave_the_window() {
        let obs = MetricsObserver::new(Duration::from_secs(60));
        let old = StateEvent::new(StateEventKind::Updated, StateType::Global, "g")
            .with_timestamp(Utc::now() - chrono::Duration::minutes(5));
        obs.on_state_change(&old).await.unwrap();

        let m = obs.metrics_for(StateType::Global).await.unwrap();
        assert_eq!(m.total_changes, 1);
        assert_eq!(m.change_rate, 0.0);
    }
}
