//! 事件存储

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{StateEvent, StateEventKind, StateType};
use crate::error::StateError;

type BucketKey = (StateType, String);

#[derive(Default)]
struct EventStoreInner {
    /// 按 (类别, 键) 分桶，桶内保持写入顺序
    buckets: HashMap<BucketKey, VecDeque<Arc<StateEvent>>>,
    /// 事件 ID 索引
    by_id: HashMap<String, Arc<StateEvent>>,
}

/// 追加式事件缓冲：每个键有上限，超出后按 FIFO 淘汰
pub struct EventStore {
    inner: RwLock<EventStoreInner>,
    max_events: usize,
    retention: Duration,
    cleanup: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl EventStore {
    pub fn new(max_events: usize, retention: Duration) -> Self {
        Self {
            inner: RwLock::new(EventStoreInner::default()),
            max_events: max_events.max(1),
            retention,
            cleanup: Mutex::new(None),
        }
    }

    /// 追加事件
    pub async fn store_event(&self, event: Arc<StateEvent>) {
        let mut inner = self.inner.write().await;
        let key = (event.state_type, event.state_id.clone());
        inner.by_id.insert(event.id.clone(), event.clone());

        let bucket = inner.buckets.entry(key).or_default();
        bucket.push_back(event);
        let mut trimmed = Vec::new();
        while bucket.len() > self.max_events {
            if let Some(old) = bucket.pop_front() {
                trimmed.push(old.id.clone());
            }
        }
        for id in trimmed {
            inner.by_id.remove(&id);
        }
    }

    /// 获取某个键最近的 `limit` 条事件（0 表示全部），保持写入顺序
    pub async fn get_events(
        &self,
        state_type: StateType,
        state_id: &str,
        limit: usize,
    ) -> Vec<Arc<StateEvent>> {
        let inner = self.inner.read().await;
        let Some(bucket) = inner.buckets.get(&(state_type, state_id.to_string())) else {
            return Vec::new();
        };
        let skip = if limit > 0 {
            bucket.len().saturating_sub(limit)
        } else {
            0
        };
        bucket.iter().skip(skip).cloned().collect()
    }

    pub async fn get_event_by_id(&self, id: &str) -> Result<Arc<StateEvent>, StateError> {
        self.inner
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::EventNotFound(id.to_string()))
    }

    /// 返回时间戳不早于 `since` 的事件，按时间排序
    pub async fn get_events_since(&self, since: DateTime<Utc>) -> Vec<Arc<StateEvent>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Arc<StateEvent>> = inner
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.timestamp);
        out
    }

    /// 按事件种类筛选最近的 `limit` 条（0 表示全部）
    pub async fn get_events_by_kind(
        &self,
        kind: StateEventKind,
        limit: usize,
    ) -> Vec<Arc<StateEvent>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Arc<StateEvent>> = inner
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.timestamp);
        if limit > 0 && out.len() > limit {
            out.drain(..out.len() - limit);
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 删除早于保留窗口的事件，空桶一并移除；返回删除数量
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = match chrono::Duration::from_std(self.retention) {
            Ok(d) => d,
            Err(_) => return 0,
        };
        let cutoff = now - retention;

        let mut inner = self.inner.write().await;
        let mut removed_ids = Vec::new();
        inner.buckets.retain(|_, bucket| {
            bucket.retain(|e| {
                let keep = e.timestamp >= cutoff;
                if !keep {
                    removed_ids.push(e.id.clone());
                }
                keep
            });
            !bucket.is_empty()
        });
        for id in &removed_ids {
            inner.by_id.remove(id);
        }
        removed_ids.len()
    }

    /// 启动后台保留期清理任务（重复调用无效）
    pub async fn start_cleanup(self: &Arc<Self>, interval: Duration) {
        let mut slot = self.cleanup.lock().await;
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let store = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let removed = store.cleanup_expired(Utc::now()).await;
                        if removed > 0 {
                            tracing::debug!(removed, "event retention sweep");
                        }
                    }
                }
            }
        });
        *slot = Some((token, handle));
    }

    pub async fn stop(&self, timeout: Duration) {
        let Some((token, handle)) = self.cleanup.lock().await.take() else {
            return;
        };
        token.cancel();
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!(?timeout, "event cleanup task did not stop in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ev(id: &str) -> Arc<StateEvent> {
        Arc::new(StateEvent::new(
            StateEventKind::Updated,
            StateType::Tool,
            id,
        ))
    }

    #[tokio::test]
    async fn bucket_keeps_most_recent_in_order() {
        let store = EventStore::new(3, Duration::from_secs(60));
        let mut ids = Vec::new();
        for _ in 0..5 {
            let e = ev("build");
            ids.push(e.id.clone());
            store.store_event(e).await;
        }

        let kept: Vec<String> = store
            .get_events(StateType::Tool, "build", 0)
            .await
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(kept, ids[2..].to_vec());
        assert_eq!(store.len().await, 3);
        assert!(store.get_event_by_id(&ids[0]).await.is_err());
        assert!(store.get_event_by_id(&ids[4]).await.is_ok());
    }

    #[tokio::test]
    async fn limit_returns_tail() {
        let store = EventStore::new(10, Duration::from_secs(60));
        for _ in 0..4 {
            store.store_event(ev("k")).await;
        }
        assert_eq!(store.get_events(StateType::Tool, "k", 2).await.len(), 2);
        assert!(store.get_events(StateType::Tool, "other", 2).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_id_is_not_found() {
        let store = EventStore::new(10, Duration::from_secs(60));
        let err = store.get_event_by_id("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cleanup_drops_old_events_and_empty_buckets() {
        let store = EventStore::new(10, Duration::from_secs(60));
        let old = StateEvent::new(StateEventKind::Created, StateType::Session, "old")
            .with_timestamp(Utc::now() - chrono::Duration::minutes(5));
        store.store_event(Arc::new(old)).await;
        store.store_event(ev("fresh")).await;

        let removed = store.cleanup_expired(Utc::now()).await;
        assert_eq!(removed, 1);
        assert!(store.get_events(StateType::Session, "old", 0).await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn filters_by_kind_and_time() {
        let store = EventStore::new(10, Duration::from_secs(60));
        let start = Utc::now();
        store
            .store_event(Arc::new(StateEvent::new(
                StateEventKind::Deleted,
                StateType::Cache,
                "c",
            )))
            .await;
        store.store_event(ev("t")).await;

        assert_eq!(store.get_events_by_kind(StateEventKind::Deleted, 0).await.len(), 1);
        assert_eq!(store.get_events_since(start).await.len(), 2);
    }
}
