use async_trait::async_trait;
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType,
    SessionManager,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{ensure_live, session_snapshot};

/// Latest vulnerability scan. Relevance rises to 1.0 with critical findings.
pub struct SecurityContextProvider {
    sessions: SessionManager,
}

impl SecurityContextProvider {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl ContextProvider for SecurityContextProvider {
    fn name(&self) -> &str {
        "security"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![ContextType::Security],
            supports_history: true,
            max_history_days: 90,
            real_time_updates: false,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        ensure_live(cancel, "security context")?;
        let session = session_snapshot(&self.sessions, &request.session_id).await?;
        let mut data = ContextData::new("security", ContextType::Security, 0.9, 0.8);

        if let Some(scan) = &session.security_scan {
            data.data.insert(
                "security_scans".into(),
                json!({
                    "success": scan.success,
                    "scanned_at": scan.scanned_at,
                    "scanner": scan.scanner,
                    "critical_issues": scan.summary.critical,
                    "high_issues": scan.summary.high,
                    "total_issues": scan.summary.total,
                    "fixable_count": scan.fixable,
                }),
            );
            if scan.summary.critical > 0 {
                data.set_relevance(1.0);
            } else if scan.summary.high > 0 {
                data.set_relevance(0.9);
            }
        }

        tracing::info!(
            session_id = %request.session_id,
            relevance = data.relevance,
            "security context retrieved"
        );
        Ok(data)
    }
}
