use async_trait::async_trait;

use super::types::StateEvent;

/// Hook invoked after a write is accepted locally. Multi-node replication is
/// not implemented; the default hook does nothing.
#[async_trait]
pub trait ReplicationHook: Send + Sync {
    async fn replicate(&self, event: &StateEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReplication;

#[async_trait]
impl ReplicationHook for NoopReplication {
    async fn replicate(&self, _event: &StateEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
