use async_trait::async_trait;
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType,
    SessionManager, StateEngine,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{ensure_live, session_snapshot, tool_runs};

/// Dockerfile and image state plus the last `docker_build` runs.
pub struct BuildContextProvider {
    sessions: SessionManager,
    engine: StateEngine,
}

impl BuildContextProvider {
    pub fn new(sessions: SessionManager, engine: StateEngine) -> Self {
        Self { sessions, engine }
    }
}

#[async_trait]
impl ContextProvider for BuildContextProvider {
    fn name(&self) -> &str {
        "build"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![ContextType::Build, ContextType::Analysis],
            supports_history: true,
            max_history_days: 7,
            real_time_updates: false,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        ensure_live(cancel, "build context")?;
        let session = session_snapshot(&self.sessions, &request.session_id).await?;
        let mut data = ContextData::new("build", ContextType::Build, 0.8, 0.9);

        if !session.dockerfile.content.is_empty() {
            data.data.insert(
                "docker_build".into(),
                json!({
                    "dockerfile_generated": true,
                    "dockerfile_path": session.dockerfile.path,
                    "image_built": session.dockerfile.built,
                    "image_ref": session.image_ref,
                    "images_built": u64::from(session.dockerfile.built),
                }),
            );
        }

        let (builds, events) = tool_runs(&self.engine, "docker_build", 20, "build", "build").await;
        data.data.insert("recent_builds".into(), Value::Array(builds));
        data.events = events;

        tracing::info!(
            session_id = %request.session_id,
            data_keys = data.data.len(),
            "build context retrieved"
        );
        Ok(data)
    }
}
