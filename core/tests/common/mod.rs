#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ckstate_core::api::{
    ContextData, ContextProvider, ContextProviderCapabilities, ContextRequest, ContextType,
    StateConfig, StateEngine, StateProvider, StateType, StateValidator, ValidationError,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// In-memory provider whose `set` fails for selected keys.
pub struct FlakyProvider {
    state_type: StateType,
    values: RwLock<HashMap<String, Value>>,
    failing_keys: HashSet<String>,
    cancel_after_set: Option<CancellationToken>,
}

impl FlakyProvider {
    pub fn new(state_type: StateType, failing_keys: &[&str]) -> Self {
        Self {
            state_type,
            values: RwLock::new(HashMap::new()),
            failing_keys: failing_keys.iter().map(|k| k.to_string()).collect(),
            cancel_after_set: None,
        }
    }

    /// Cancels `token` right after every successful `set`.
    pub fn cancelling(state_type: StateType, token: CancellationToken) -> Self {
        Self {
            cancel_after_set: Some(token),
            ..Self::new(state_type, &[])
        }
    }

    pub async fn seed(&self, key: &str, value: Value) {
        self.values.write().await.insert(key.to_string(), value);
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl StateProvider for FlakyProvider {
    fn state_type(&self) -> StateType {
        self.state_type
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        if self.failing_keys.contains(key) {
            anyhow::bail!("write rejected for {key}");
        }
        self.values.write().await.insert(key.to_string(), value);
        if let Some(token) = &self.cancel_after_set {
            token.cancel();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

pub fn engine_with(provider: Arc<FlakyProvider>) -> StateEngine {
    let state_type = provider.state_type();
    StateEngine::builder(StateConfig::default())
        .register_state_provider(state_type, provider)
        .build()
}

/// Rejects JSON null, like the stock workflow/global validators.
pub struct RejectNull;

impl StateValidator for RejectNull {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        if state.is_null() {
            return Err(ValidationError::new("null_state", "", "state must not be null"));
        }
        Ok(())
    }
}

pub struct AcceptAll;

impl StateValidator for AcceptAll {
    fn validate(&self, _state: &Value) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Context provider that counts how often it is asked.
pub struct CountingProvider {
    pub calls: AtomicUsize,
    context_type: ContextType,
    delay: Duration,
    fail_for: Option<String>,
}

impl CountingProvider {
    pub fn new(context_type: ContextType) -> Arc<Self> {
        Self::build(context_type, Duration::ZERO, None)
    }

    /// Sleeps `delay` before answering.
    pub fn slow(context_type: ContextType, delay: Duration) -> Arc<Self> {
        Self::build(context_type, delay, None)
    }

    /// Fails every request for `session_id`.
    pub fn failing_for(context_type: ContextType, session_id: &str) -> Arc<Self> {
        Self::build(context_type, Duration::ZERO, Some(session_id.to_string()))
    }

    fn build(context_type: ContextType, delay: Duration, fail_for: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            context_type,
            delay,
            fail_for,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn capabilities(&self) -> ContextProviderCapabilities {
        ContextProviderCapabilities {
            supported_types: vec![self.context_type],
            supports_history: false,
            max_history_days: 0,
            real_time_updates: false,
        }
    }

    async fn get_context(
        &self,
        request: &ContextRequest,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ContextData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_for.as_deref() == Some(request.session_id.as_str()) {
            anyhow::bail!("no data for {}", request.session_id);
        }
        let mut data = ContextData::new("counting", self.context_type, 0.5, 0.5);
        data.data
            .insert("session".into(), Value::String(request.session_id.clone()));
        Ok(data)
    }
}
