use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType,
    SessionManager,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{ensure_live, session_snapshot};

/// Runtime sample pushed by whoever watches the workload. CPU, memory and disk
/// are percentages; `error_rate` is a fraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
    pub latency: Duration,
    pub throughput: f64,
    pub error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Workspace resource usage plus the last recorded runtime sample.
pub struct PerformanceContextProvider {
    sessions: SessionManager,
    collected: RwLock<HashMap<String, PerformanceMetrics>>,
}

impl PerformanceContextProvider {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            collected: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the sample for `session_id`.
    pub async fn record_metrics(&self, session_id: &str, metrics: PerformanceMetrics) {
        self.collected
            .write()
            .await
            .insert(session_id.to_string(), metrics);
    }

    pub async fn forget(&self, session_id: &str) {
        self.collected.write().await.remove(session_id);
    }
}

#[async_trait]
impl ContextProvider for PerformanceContextProvider {
    fn name(&self) -> &str {
        "performance"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![ContextType::Performance],
            supports_history: true,
            max_history_days: 1,
            real_time_updates: true,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        ensure_live(cancel, "performance context")?;
        let session = session_snapshot(&self.sessions, &request.session_id).await?;
        let mut data = ContextData::new("performance", ContextType::Performance, 0.7, 0.9);

        data.data.insert(
            "resource_usage".into(),
            json!({
                "token_usage": session.token_usage,
                "disk_space_bytes": session.disk_usage,
                "max_disk_usage": session.max_disk_usage,
                "jobs_active": session.active_job_count(),
            }),
        );
        if let Some(ratio) = session.disk_usage_ratio() {
            data.data
                .insert("usage_percentages".into(), json!({ "disk_usage": ratio }));
            if ratio > 0.8 {
                data.set_relevance(0.95);
            }
        }

        if let Some(m) = self.collected.read().await.get(&request.session_id) {
            let latency_ms = m.latency.as_millis() as u64;
            data.data.insert(
                "performance_metrics".into(),
                json!({
                    "cpu_usage": m.cpu,
                    "memory_usage": m.memory,
                    "disk_usage": m.disk,
                    "network_usage": m.network,
                    "latency_ms": latency_ms,
                    "response_time_ms": latency_ms as f64,
                    "throughput": m.throughput,
                    "error_rate": m.error_rate,
                    "last_updated": m.last_updated,
                }),
            );
        }

        tracing::info!(
            session_id = %request.session_id,
            relevance = data.relevance,
            "performance context retrieved"
        );
        Ok(data)
    }
}
