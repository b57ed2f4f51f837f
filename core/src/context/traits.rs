use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{ComprehensiveContext, ContextData, ContextProviderCapabilities, ContextRequest};

/// Reads one domain of session state and turns it into a `ContextData`.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> ContextProviderCapabilities;

    async fn get_context(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData>;
}

/// Pipeline stage run over an assembled context, in registration order.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(
        &self,
        context: &mut ComprehensiveContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;
}

/// External model backend. Implementations should stop early once `cancel` fires.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, prompt: &str, cancel: &CancellationToken) -> anyhow::Result<String>;
}
