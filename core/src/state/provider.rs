//! 状态提供者

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::types::StateType;

/// 某一状态类别的 CRUD 后端
///
/// `get` 返回 `Ok(None)` 表示键不存在；其它 I/O 失败走 `Err`。
#[async_trait]
pub trait StateProvider: Send + Sync {
    fn state_type(&self) -> StateType;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// 内存状态提供者
pub struct MemoryStateProvider {
    state_type: StateType,
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStateProvider {
    pub fn new(state_type: StateType) -> Self {
        Self {
            state_type,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl StateProvider for MemoryStateProvider {
    fn state_type(&self) -> StateType {
        self.state_type
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_provider_crud() {
        let p = MemoryStateProvider::new(StateType::Workflow);
        assert_eq!(p.get("wf").await.unwrap(), None);

        p.set("wf", json!({"step": 1})).await.unwrap();
        assert_eq!(p.get("wf").await.unwrap(), Some(json!({"step": 1})));
        assert_eq!(p.keys().await.unwrap(), vec!["wf".to_string()]);

        p.delete("wf").await.unwrap();
        assert!(p.is_empty().await);
    }
}
