//! 统一状态引擎

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatch::ObserverDispatcher;
use super::event_store::EventStore;
use super::observer::StateObserver;
use super::provider::StateProvider;
use super::replication::{NoopReplication, ReplicationHook};
use super::transaction::StateTransaction;
use super::types::{StateEvent, StateEventKind, StateHistoryEntry, StateType};
use super::validator::StateValidator;
use crate::config::StateConfig;
use crate::error::StateError;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 注册阶段：一次性配置 provider / validator / observer，`build` 后不可再改
pub struct StateEngineBuilder {
    config: StateConfig,
    providers: HashMap<StateType, Arc<dyn StateProvider>>,
    validators: HashMap<StateType, Arc<dyn StateValidator>>,
    observers: Vec<Arc<dyn StateObserver>>,
    replication: Arc<dyn ReplicationHook>,
}

impl StateEngineBuilder {
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
            validators: HashMap::new(),
            observers: Vec::new(),
            replication: Arc::new(NoopReplication),
        }
    }

    /// 注册 provider（同类别后注册者覆盖）
    pub fn register_state_provider(
        mut self,
        state_type: StateType,
        provider: Arc<dyn StateProvider>,
    ) -> Self {
        if self.providers.insert(state_type, provider).is_some() {
            tracing::debug!(%state_type, "state provider replaced");
        }
        self
    }

    /// 注册校验器（同类别后注册者覆盖）
    pub fn register_validator(
        mut self,
        state_type: StateType,
        validator: Arc<dyn StateValidator>,
    ) -> Self {
        self.validators.insert(state_type, validator);
        self
    }

    /// 追加观察者
    pub fn register_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_replication(mut self, hook: Arc<dyn ReplicationHook>) -> Self {
        self.replication = hook;
        self
    }

    /// 构建引擎；有观察者时会在当前 tokio 运行时中启动分发任务
    pub fn build(self) -> StateEngine {
        let events = Arc::new(EventStore::new(
            self.config.max_events_per_key,
            self.config.event_retention(),
        ));
        let dispatcher =
            ObserverDispatcher::start(self.observers, self.config.observer_queue_capacity);

        StateEngine {
            inner: Arc::new(StateEngineInner {
                providers: self.providers,
                validators: self.validators,
                history: RwLock::new(HashMap::new()),
                history_limit: self.config.history_limit.max(1),
                retention: self.config.event_retention(),
                cleanup_interval: self.config.event_cleanup_interval(),
                history_cleanup: Mutex::new(None),
                events,
                dispatcher,
                replication: self.replication,
            }),
        }
    }
}

/// 状态引擎句柄
#[derive(Clone)]
pub struct StateEngine {
    inner: Arc<StateEngineInner>,
}

struct StateEngineInner {
    providers: HashMap<StateType, Arc<dyn StateProvider>>,
    validators: HashMap<StateType, Arc<dyn StateValidator>>,
    /// 每个键最近的写入历史
    history: RwLock<HashMap<(StateType, String), VecDeque<StateHistoryEntry>>>,
    history_limit: usize,
    retention: Duration,
    cleanup_interval: Duration,
    history_cleanup: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    events: Arc<EventStore>,
    dispatcher: ObserverDispatcher,
    replication: Arc<dyn ReplicationHook>,
}

impl StateEngine {
    pub fn builder(config: StateConfig) -> StateEngineBuilder {
        StateEngineBuilder::new(config)
    }

    fn provider(&self, state_type: StateType) -> Result<&Arc<dyn StateProvider>, StateError> {
        self.inner
            .providers
            .get(&state_type)
            .ok_or(StateError::ProviderNotRegistered(state_type))
    }

    pub fn has_provider(&self, state_type: StateType) -> bool {
        self.inner.providers.contains_key(&state_type)
    }

    pub fn validator(&self, state_type: StateType) -> Option<Arc<dyn StateValidator>> {
        self.inner.validators.get(&state_type).cloned()
    }

    /// 读取状态
    pub async fn get_state(&self, state_type: StateType, key: &str) -> Result<Value, StateError> {
        let provider = self.provider(state_type)?;
        provider
            .get(key)
            .await?
            .ok_or_else(|| StateError::NotFound {
                state_type,
                key: key.to_string(),
            })
    }

    pub async fn get_session_state(&self, session_id: &str) -> Result<Value, StateError> {
        self.get_state(StateType::Session, session_id).await
    }

    /// 写入状态
    ///
    /// 历史与事件在调用 provider 之前记录；provider 失败时错误返回给调用方，
    /// 但历史与通知不会撤回。
    pub async fn set_state(
        &self,
        state_type: StateType,
        key: &str,
        value: Value,
    ) -> Result<(), StateError> {
        let provider = self.provider(state_type)?;
        if let Some(validator) = self.inner.validators.get(&state_type) {
            validator.validate(&value)?;
        }
        self.record(state_type, key, StateEventKind::Updated, Some(value.clone()))
            .await;
        provider.set(key, value).await?;
        Ok(())
    }

    /// 删除状态
    pub async fn delete_state(&self, state_type: StateType, key: &str) -> Result<(), StateError> {
        let provider = self.provider(state_type)?;
        self.record(state_type, key, StateEventKind::Deleted, None).await;
        provider.delete(key).await?;
        Ok(())
    }

    /// 回滚用：写回事务前的值，不经过校验，事件种类为 `restored`
    pub(crate) async fn restore_state(
        &self,
        state_type: StateType,
        key: &str,
        value: Value,
    ) -> Result<(), StateError> {
        let provider = self.provider(state_type)?;
        self.record(state_type, key, StateEventKind::Restored, Some(value.clone()))
            .await;
        provider.set(key, value).await?;
        Ok(())
    }

    async fn record(
        &self,
        state_type: StateType,
        key: &str,
        kind: StateEventKind,
        value: Option<Value>,
    ) {
        let old_value = {
            let mut history = self.inner.history.write().await;
            let history_key = (state_type, key.to_string());
            // 删除即丢弃该键的历史，事件仍保留在 EventStore
            if kind == StateEventKind::Deleted {
                history
                    .remove(&history_key)
                    .and_then(|entries| entries.back().and_then(|e| e.value.clone()))
            } else {
                let entries = history.entry(history_key).or_default();
                let previous = entries.back().and_then(|e| e.value.clone());
                entries.push_back(StateHistoryEntry {
                    timestamp: Utc::now(),
                    state_type,
                    key: key.to_string(),
                    kind,
                    value: value.clone(),
                });
                while entries.len() > self.inner.history_limit {
                    entries.pop_front();
                }
                previous
            }
        };

        let event = Arc::new(
            StateEvent::new(kind, state_type, key)
                .with_old_value(old_value)
                .with_new_value(value),
        );
        self.inner.events.store_event(event.clone()).await;
        self.inner.dispatcher.notify(event.clone());

        if let Err(e) = self.inner.replication.replicate(&event).await {
            tracing::warn!(%state_type, key, error = %e, "replication hook failed");
        }
    }

    /// 最近的 `limit` 条事件，保持存储顺序
    pub async fn get_state_history(
        &self,
        state_type: StateType,
        key: &str,
        limit: usize,
    ) -> Vec<Arc<StateEvent>> {
        self.inner.events.get_events(state_type, key, limit).await
    }

    pub async fn history_entries(&self, state_type: StateType, key: &str) -> Vec<StateHistoryEntry> {
        self.inner
            .history
            .read()
            .await
            .get(&(state_type, key.to_string()))
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 创建绑定到本引擎和取消令牌的事务
    pub fn create_state_transaction(&self, cancel: CancellationToken) -> StateTransaction {
        StateTransaction::new(self.clone(), cancel)
    }

    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.inner.events
    }

    /// 启动事件与写入历史的保留期清理（重复调用无效）
    pub async fn start_event_cleanup(&self) {
        self.inner
            .events
            .start_cleanup(self.inner.cleanup_interval)
            .await;

        let mut slot = self.inner.history_cleanup.lock().await;
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::downgrade(&self.inner);
        let interval = self.inner.cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = inner.upgrade() else { break };
                        let removed = inner.prune_history(Utc::now()).await;
                        if removed > 0 {
                            tracing::debug!(removed, "history retention sweep");
                        }
                    }
                }
            }
        });
        *slot = Some((token, handle));
    }

    /// 丢弃早于保留窗口的写入历史；返回被整体移除的键数
    pub async fn prune_history(&self, now: DateTime<Utc>) -> usize {
        self.inner.prune_history(now).await
    }

    pub async fn flush_observers(&self) {
        self.inner.dispatcher.flush().await;
    }

    pub fn dropped_events(&self) -> u64 {
        self.inner.dispatcher.dropped_count()
    }

    /// 投递完已排队事件后停止后台任务
    pub async fn shutdown(&self) {
        self.inner.dispatcher.flush().await;
        self.inner.dispatcher.stop(STOP_TIMEOUT).await;
        self.inner.events.stop(STOP_TIMEOUT).await;
        if let Some((token, handle)) = self.inner.history_cleanup.lock().await.take() {
            token.cancel();
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                tracing::warn!("history cleanup task did not stop in time");
            }
        }
    }
}

impl StateEngineInner {
    async fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return 0;
        };
        let cutoff = now - retention;
        let mut history = self.history.write().await;
        let before = history.len();
        history.retain(|_, entries| {
            entries.retain(|e| e.timestamp >= cutoff);
            !entries.is_empty()
        });
        before - history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::state::provider::MemoryStateProvider;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    struct NonEmptyObject;

    impl StateValidator for NonEmptyObject {
        fn validate(&self, state: &Value) -> Result<(), ValidationError> {
            match state.as_object() {
                Some(map) if !map.is_empty() => Ok(()),
                _ => Err(ValidationError::new("EMPTY", "state", "empty state")),
            }
        }
    }

    struct Recorder {
        kinds: Mutex<Vec<StateEventKind>>,
    }

    #[async_trait]
    impl StateObserver for Recorder {
        fn id(&self) -> &str {
            "recorder"
        }

        async fn on_state_change(&self, event: &StateEvent) -> anyhow::Result<()> {
            self.kinds.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl StateProvider for BrokenProvider {
        fn state_type(&self) -> StateType {
            StateType::Cache
        }

        async fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine_with(observer: Option<Arc<dyn StateObserver>>) -> StateEngine {
        let mut builder = StateEngine::builder(StateConfig::default())
            .register_state_provider(
                StateType::Workflow,
                Arc::new(MemoryStateProvider::new(StateType::Workflow)),
            )
            .register_state_provider(StateType::Cache, Arc::new(BrokenProvider))
            .register_validator(StateType::Workflow, Arc::new(NonEmptyObject));
        if let Some(observer) = observer {
            builder = builder.register_observer(observer);
        }
        builder.build()
    }

    #[tokio::test]
    async fn get_without_provider_is_not_found() {
        let engine = engine_with(None);
        let err = engine.get_state(StateType::Tool, "x").await.unwrap_err();
        assert!(err.is_not_found());
        let err = engine.get_state(StateType::Workflow, "x").await.unwrap_err();
        assert!(matches!(err, StateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn set_get_delete_and_observe() {
        let recorder = Arc::new(Recorder {
            kinds: Mutex::new(Vec::new()),
        });
        let engine = engine_with(Some(recorder.clone()));

        engine
            .set_state(StateType::Workflow, "wf-1", json!({"step": "build"}))
            .await
            .unwrap();
        assert_eq!(
            engine.get_state(StateType::Workflow, "wf-1").await.unwrap(),
            json!({"step": "build"})
        );
        engine.delete_state(StateType::Workflow, "wf-1").await.unwrap();
        engine.flush_observers().await;

        assert_eq!(
            *recorder.kinds.lock().unwrap(),
            vec![StateEventKind::Updated, StateEventKind::Deleted]
        );
        let history = engine.get_state_history(StateType::Workflow, "wf-1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].old_value, Some(json!({"step": "build"})));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn validator_rejects_before_side_effects() {
        let engine = engine_with(None);
        let err = engine
            .set_state(StateType::Workflow, "wf", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(engine.history_entries(StateType::Workflow, "wf").await.is_empty());
        assert!(engine.event_store().is_empty().await);
    }

    #[tokio::test]
    async fn provider_failure_still_records_history() {
        let engine = engine_with(None);
        let err = engine
            .set_state(StateType::Cache, "c", json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Provider(_)));
        assert_eq!(engine.history_entries(StateType::Cache, "c").await.len(), 1);
        assert_eq!(engine.get_state_history(StateType::Cache, "c", 5).await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let config = StateConfig {
            history_limit: 3,
            ..StateConfig::default()
        };
        let engine = StateEngine::builder(config)
            .register_state_provider(
                StateType::Global,
                Arc::new(MemoryStateProvider::new(StateType::Global)),
            )
            .build();
        for i in 0..5 {
            engine.set_state(StateType::Global, "g", json!(i)).await.unwrap();
        }
        let values: Vec<Option<Value>> = engine
            .history_entries(StateType::Global, "g")
            .await
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![Some(json!(2)), Some(json!(3)), Some(json!(4))]);
    }

    #[tokio::test]
    async fn delete_drops_key_history() {
        let engine = StateEngine::builder(StateConfig::default())
            .register_state_provider(
                StateType::Global,
                Arc::new(MemoryStateProvider::new(StateType::Global)),
            )
            .build();
        engine.set_state(StateType::Global, "g", json!(1)).await.unwrap();
        engine.set_state(StateType::Global, "g", json!(2)).await.unwrap();
        engine.delete_state(StateType::Global, "g").await.unwrap();

        assert!(engine.history_entries(StateType::Global, "g").await.is_empty());
        let events = engine.get_state_history(StateType::Global, "g", 0).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].old_value, Some(json!(2)));

        engine.set_state(StateType::Global, "g", json!(3)).await.unwrap();
        let events = engine.get_state_history(StateType::Global, "g", 0).await;
        assert_eq!(events[3].old_value, None);
        assert_eq!(engine.history_entries(StateType::Global, "g").await.len(), 1);
    }

    #[tokio::test]
    async fn retention_prunes_stale_history_keys() {
        let config = StateConfig {
            event_retention_secs: 60,
            ..StateConfig::default()
        };
        let engine = StateEngine::builder(config)
            .register_state_provider(
                StateType::Global,
                Arc::new(MemoryStateProvider::new(StateType::Global)),
            )
            .build();
        for i in 0..3 {
            let key = format!("analysis_{i}");
            engine.set_state(StateType::Global, &key, json!(i)).await.unwrap();
        }

        assert_eq!(engine.prune_history(Utc::now()).await, 0);
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(engine.prune_history(later).await, 3);
        assert!(engine.history_entries(StateType::Global, "analysis_0").await.is_empty());
    }
}
