//! 会话状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Dockerfile 状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerfileState {
    pub path: String,
    pub content: String,
    /// 镜像是否已构建
    pub built: bool,
}

/// 漏洞统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilitySummary {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub total: u32,
}

/// 安全扫描结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScanResult {
    pub success: bool,
    pub scanner: String,
    pub scanned_at: DateTime<Utc>,
    pub summary: VulnerabilitySummary,
    /// 可修复数量
    pub fixable: u32,
}

/// 后台任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 工具执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub execution_id: String,
    pub tool: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 会话状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// 会话唯一 ID
    pub session_id: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub workspace_dir: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub dockerfile: DockerfileState,
    #[serde(default)]
    pub image_ref: String,
    /// 清单名 -> 内容
    #[serde(default)]
    pub k8s_manifests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_scan: Option<SecurityScanResult>,
    #[serde(default)]
    pub token_usage: u64,
    /// 工作区占用（字节）
    #[serde(default)]
    pub disk_usage: i64,
    /// 工作区配额（字节），0 表示不限
    #[serde(default)]
    pub max_disk_usage: i64,
    #[serde(default)]
    pub jobs: BTreeMap<String, JobStatus>,
    #[serde(default)]
    pub tool_executions: Vec<ToolExecution>,
    /// 当前阶段
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SessionState {
    /// 创建新会话
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            workspace_dir: String::new(),
            repo_url: String::new(),
            dockerfile: DockerfileState::default(),
            image_ref: String::new(),
            k8s_manifests: BTreeMap::new(),
            security_scan: None,
            token_usage: 0,
            disk_usage: 0,
            max_disk_usage: 0,
            jobs: BTreeMap::new(),
            tool_executions: Vec::new(),
            current_stage: String::new(),
            errors: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// 进行中的任务数
    pub fn active_job_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|s| matches!(s, JobStatus::Pending | JobStatus::Running))
            .count()
    }

    /// 磁盘使用比例；未设置配额时为 `None`
    pub fn disk_usage_ratio(&self) -> Option<f64> {
        if self.max_disk_usage > 0 {
            Some(self.disk_usage as f64 / self.max_disk_usage as f64)
        } else {
            None
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_and_disk_helpers() {
        let mut s = SessionState::new("s1");
        s.jobs.insert("a".into(), JobStatus::Running);
        s.jobs.insert("b".into(), JobStatus::Completed);
        assert_eq!(s.active_job_count(), 1);

        assert_eq!(s.disk_usage_ratio(), None);
        s.disk_usage = 90;
        s.max_disk_usage = 100;
        assert_eq!(s.disk_usage_ratio(), Some(0.9));
    }
}
