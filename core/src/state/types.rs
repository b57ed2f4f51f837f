//! 状态类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 状态类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    /// 会话
    Session,
    /// 对话
    Conversation,
    /// 工作流
    Workflow,
    /// 工具
    Tool,
    /// 全局
    Global,
    /// 缓存
    Cache,
}

impl StateType {
    pub const ALL: [StateType; 6] = [
        StateType::Session,
        StateType::Conversation,
        StateType::Workflow,
        StateType::Tool,
        StateType::Global,
        StateType::Cache,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Session => "session",
            StateType::Conversation => "conversation",
            StateType::Workflow => "workflow",
            StateType::Tool => "tool",
            StateType::Global => "global",
            StateType::Cache => "cache",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateEventKind {
    Created,
    Updated,
    Deleted,
    Accessed,
    Expired,
    Restored,
}

impl StateEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateEventKind::Created => "created",
            StateEventKind::Updated => "updated",
            StateEventKind::Deleted => "deleted",
            StateEventKind::Accessed => "accessed",
            StateEventKind::Expired => "expired",
            StateEventKind::Restored => "restored",
        }
    }
}

impl fmt::Display for StateEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态变更事件（创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// 事件 ID
    pub id: String,
    /// 事件种类
    pub kind: StateEventKind,
    /// 状态类别
    pub state_type: StateType,
    /// 状态键
    pub state_id: String,
    /// 发生时间
    pub timestamp: DateTime<Utc>,
    /// 触发者
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// 附加元数据
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// 旧值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// 新值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl StateEvent {
    /// 创建事件
    pub fn new(kind: StateEventKind, state_type: StateType, state_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            state_type,
            state_id: state_id.into(),
            timestamp: Utc::now(),
            actor: None,
            metadata: HashMap::new(),
            old_value: None,
            new_value: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_old_value(mut self, value: Option<Value>) -> Self {
        self.old_value = value;
        self
    }

    pub fn with_new_value(mut self, value: Option<Value>) -> Self {
        self.new_value = value;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// 单键值历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub state_type: StateType,
    pub key: String,
    pub kind: StateEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// 校验规则描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub field: String,
    pub description: String,
    pub required: bool,
}

impl ValidationRule {
    pub fn required(name: &str, field: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field: field.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, field: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, field, description)
        }
    }
}
