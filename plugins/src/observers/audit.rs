use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ckstate_core::api::{StateEvent, StateEventKind, StateObserver, StateType};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: StateEventKind,
    pub state_type: StateType,
    pub key: String,
    pub actor: Option<String>,
    /// Present for updates that carry both the old and the new value.
    pub changes: Option<String>,
}

/// Bounded ring buffer of audit entries; the oldest entry is overwritten.
pub struct AuditObserver {
    id: String,
    max_entries: usize,
    entries: RwLock<VecDeque<AuditEntry>>,
}

impl AuditObserver {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            id: "audit".to_string(),
            max_entries,
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(1024))),
        }
    }

    /// Oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateObserver for AuditObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
        let changes = match (event.kind, &event.old_value, &event.new_value) {
            (StateEventKind::Updated, Some(old), Some(new)) => Some(diff_summary(old, new)),
            _ => None,
        };
        let entry = AuditEntry {
            event_id: event.id.clone(),
            timestamp: event.timestamp,
            kind: event.kind,
            state_type: event.state_type,
            key: event.state_id.clone(),
            actor: event.actor.clone(),
            changes,
        };

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }
}

/// Short human-readable description of what changed between two values.
pub fn diff_summary(old: &Value, new: &Value) -> String {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let added: Vec<&str> = b
                .keys()
                .filter(|k| !a.contains_key(*k))
                .map(String::as_str)
                .collect();
            let removed: Vec<&str> = a
                .keys()
                .filter(|k| !b.contains_key(*k))
                .map(String::as_str)
                .collect();
            let changed: Vec<&str> = a
                .iter()
                .filter(|(k, v)| b.get(*k).is_some_and(|nv| nv != *v))
                .map(|(k, _)| k.as_str())
                .collect();

            let mut parts = Vec::new();
            if !added.is_empty() {
                parts.push(format!("added: {}", added.join(", ")));
            }
            if !removed.is_empty() {
                parts.push(format!("removed: {}", removed.join(", ")));
            }
            if !changed.is_empty() {
                parts.push(format!("changed: {}", changed.join(", ")));
            }
            if parts.is_empty() {
                "no changes".to_string()
            } else {
                parts.join("; ")
            }
        }
        _ if old == new => "no changes".to_string(),
        _ => "value replaced".to_string(),
    }
}
