use async_trait::async_trait;
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType,
    SessionManager, StateEngine,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{ensure_live, session_snapshot, tool_runs};

/// Kubernetes manifests of the session plus the last `k8s_deploy` runs.
pub struct DeploymentContextProvider {
    sessions: SessionManager,
    engine: StateEngine,
}

impl DeploymentContextProvider {
    pub fn new(sessions: SessionManager, engine: StateEngine) -> Self {
        Self { sessions, engine }
    }
}

#[async_trait]
impl ContextProvider for DeploymentContextProvider {
    fn name(&self) -> &str {
        "deployment"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![ContextType::Deployment],
            supports_history: true,
            max_history_days: 30,
            real_time_updates: false,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        ensure_live(cancel, "deployment context")?;
        let session = session_snapshot(&self.sessions, &request.session_id).await?;
        let mut data = ContextData::new("deployment", ContextType::Deployment, 0.7, 0.85);

        if !session.k8s_manifests.is_empty() {
            data.data.insert(
                "kubernetes".into(),
                json!({
                    "manifests_count": session.k8s_manifests.len(),
                    "manifests": session.k8s_manifests.keys().collect::<Vec<_>>(),
                    // Manifests are not parsed; these are the kinds the generator emits.
                    "namespaces": ["default"],
                    "resource_types": ["Deployment", "Service", "ConfigMap"],
                }),
            );
        }

        let (deployments, events) =
            tool_runs(&self.engine, "k8s_deploy", 10, "deployment", "deployment").await;
        data.data
            .insert("recent_deployments".into(), Value::Array(deployments));
        data.events = events;

        tracing::info!(
            session_id = %request.session_id,
            manifests = session.k8s_manifests.len(),
            "deployment context retrieved"
        );
        Ok(data)
    }
}
