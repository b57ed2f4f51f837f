//! 会话管理器：TTL 过期、容量淘汰与后台清扫

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::{SessionState, ToolExecution};
use crate::config::SessionConfig;
use crate::error::SessionError;

/// 会话条目
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub labels: BTreeSet<String>,
}

impl SessionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 会话统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active: usize,
    /// 已过期但尚未清理
    pub expired_pending: usize,
    pub total: usize,
    pub max_sessions: usize,
}

/// 会话管理器
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    default_ttl: Duration,
    max_sessions: usize,
    stopped: AtomicBool,
    sweeper: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

fn add_ttl(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(config.default_ttl(), config.max_sessions)
    }

    pub fn with_limits(default_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                sessions: RwLock::new(HashMap::new()),
                default_ttl,
                max_sessions: max_sessions.max(1),
                stopped: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// 获取会话（刷新最近访问时间）；过期条目会被删除
    pub async fn get(&self, session_id: &str) -> Result<SessionState, SessionError> {
        let mut sessions = self.inner.sessions.write().await;
        let now = Utc::now();
        let entry = Self::live_entry(&mut sessions, session_id, now)?;
        entry.last_access = now;
        entry.state.updated_at = now;
        Ok(entry.state.clone())
    }

    /// 只读查看，不刷新访问时间，也不清理过期条目
    pub async fn peek(&self, session_id: &str) -> Option<SessionState> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|e| !e.is_expired(Utc::now()))
            .map(|e| e.state.clone())
    }

    fn live_entry<'a>(
        sessions: &'a mut HashMap<String, SessionEntry>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&'a mut SessionEntry, SessionError> {
        let expired = match sessions.get(session_id) {
            None => return Err(SessionError::NotFound(session_id.to_string())),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            sessions.remove(session_id);
            tracing::debug!(session_id, "session expired on access");
            return Err(SessionError::Expired(session_id.to_string()));
        }
        sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// 获取或创建会话
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionState, SessionError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(SessionError::Stopped);
        }
        match self.get(session_id).await {
            Ok(state) => return Ok(state),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut sessions = self.inner.sessions.write().await;
        let now = Utc::now();

        // 再次检查：并发调用可能已经创建
        if let Some(entry) = sessions.get_mut(session_id) {
            if !entry.is_expired(now) {
                entry.last_access = now;
                return Ok(entry.state.clone());
            }
            sessions.remove(session_id);
        }

        if sessions.len() >= self.inner.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                tracing::info!(evicted = %oldest, max = self.inner.max_sessions, "session evicted at capacity");
            }
        }

        let state = SessionState::new(session_id);
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                state: state.clone(),
                expires_at: add_ttl(now, self.inner.default_ttl),
                last_access: now,
                labels: BTreeSet::new(),
            },
        );
        tracing::debug!(session_id, "session created");
        Ok(state)
    }

    /// 原地修改会话
    pub async fn update<F>(&self, session_id: &str, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut sessions = self.inner.sessions.write().await;
        let now = Utc::now();
        let entry = Self::live_entry(&mut sessions, session_id, now)?;
        f(&mut entry.state);
        entry.state.updated_at = now;
        entry.last_access = now;
        Ok(())
    }

    /// 所有未过期会话；不会删除遇到的过期条目
    pub async fn list(&self) -> Vec<SessionState> {
        let sessions = self.inner.sessions.read().await;
        let now = Utc::now();
        let mut out: Vec<SessionState> = sessions
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.state.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub async fn delete(&self, session_id: &str) -> bool {
        self.inner.sessions.write().await.remove(session_id).is_some()
    }

    /// 续期：`expires_at` 只会通过这里前移
    pub async fn renew(
        &self,
        session_id: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, SessionError> {
        let mut sessions = self.inner.sessions.write().await;
        let now = Utc::now();
        let entry = Self::live_entry(&mut sessions, session_id, now)?;
        let candidate = add_ttl(now, ttl);
        if candidate > entry.expires_at {
            entry.expires_at = candidate;
        }
        Ok(entry.expires_at)
    }

    pub async fn expires_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|e| e.expires_at)
    }

    pub async fn add_label(&self, session_id: &str, label: &str) -> Result<(), SessionError> {
        self.with_entry(session_id, |e| {
            e.labels.insert(label.to_string());
        })
        .await
    }

    pub async fn remove_label(&self, session_id: &str, label: &str) -> Result<(), SessionError> {
        self.with_entry(session_id, |e| {
            e.labels.remove(label);
        })
        .await
    }

    pub async fn set_labels(
        &self,
        session_id: &str,
        labels: impl IntoIterator<Item = String>,
    ) -> Result<(), SessionError> {
        let labels: BTreeSet<String> = labels.into_iter().collect();
        self.with_entry(session_id, |e| e.labels = labels).await
    }

    pub async fn labels(&self, session_id: &str) -> Result<BTreeSet<String>, SessionError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|e| !e.is_expired(Utc::now()))
            .map(|e| e.labels.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// 所有会话上出现过的标签
    pub async fn all_labels(&self) -> BTreeSet<String> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .values()
            .flat_map(|e| e.labels.iter().cloned())
            .collect()
    }

    pub async fn list_by_label(&self, label: &str) -> Vec<SessionState> {
        let sessions = self.inner.sessions.read().await;
        let now = Utc::now();
        sessions
            .values()
            .filter(|e| !e.is_expired(now) && e.labels.contains(label))
            .map(|e| e.state.clone())
            .collect()
    }

    async fn with_entry<F>(&self, session_id: &str, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionEntry),
    {
        let mut sessions = self.inner.sessions.write().await;
        let entry = Self::live_entry(&mut sessions, session_id, Utc::now())?;
        f(entry);
        Ok(())
    }

    /// 记录工具开始执行，返回执行 ID
    pub async fn track_tool_execution(
        &self,
        session_id: &str,
        tool: &str,
    ) -> Result<String, SessionError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let record = ToolExecution {
            execution_id: execution_id.clone(),
            tool: tool.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            error: None,
        };
        self.update(session_id, |s| s.tool_executions.push(record))
            .await?;
        Ok(execution_id)
    }

    /// 标记工具执行结束；未知执行 ID 视为 NotFound
    pub async fn complete_tool_execution(
        &self,
        session_id: &str,
        execution_id: &str,
        success: bool,
        error: Option<String>,
    ) -> Result<(), SessionError> {
        let mut found = false;
        self.update(session_id, |s| {
            if let Some(exec) = s
                .tool_executions
                .iter_mut()
                .find(|e| e.execution_id == execution_id)
            {
                exec.completed_at = Some(Utc::now());
                exec.success = Some(success);
                if let Some(err) = &error {
                    s.errors.push(format!("{}: {err}", exec.tool));
                }
                exec.error = error;
                found = true;
            }
        })
        .await?;
        if found {
            Ok(())
        } else {
            Err(SessionError::NotFound(execution_id.to_string()))
        }
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.inner.sessions.read().await;
        let now = Utc::now();
        let expired_pending = sessions.values().filter(|e| e.is_expired(now)).count();
        SessionStats {
            active: sessions.len() - expired_pending,
            expired_pending,
            total: sessions.len(),
            max_sessions: self.inner.max_sessions,
        }
    }

    /// 删除所有已过期会话，返回删除数量
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, e| !e.is_expired(now));
        before - sessions.len()
    }

    /// 启动后台清扫（周期为 TTL/4；重复调用无效）
    pub async fn start_sweeper(&self) {
        let mut slot = self.inner.sweeper.lock().await;
        if slot.is_some() {
            return;
        }
        let period = (self.inner.default_ttl / 4).max(Duration::from_millis(1));
        let token = CancellationToken::new();
        let child = token.clone();
        let manager = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.sweep_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "session sweep");
                        }
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        });
        *slot = Some((token, handle));
    }

    /// 停止清扫任务（最多等待 `timeout`），然后清空所有会话
    pub async fn stop(&self, timeout: Duration) {
        self.inner.stopped.store(true, Ordering::Release);
        let sweeper = self.inner.sweeper.lock().await.take();
        if let Some((token, handle)) = sweeper {
            token.cancel();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!(?timeout, "session sweeper did not stop in time");
            }
        }
        self.inner.sessions.write().await.clear();
    }
}
