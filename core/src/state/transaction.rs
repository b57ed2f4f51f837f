//! 多键事务（失败回滚）

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::engine::StateEngine;
use super::types::StateType;
use super::validator::StateValidator;
use crate::error::StateError;

/// 事务中的单个操作
pub enum StateOperation {
    Set {
        state_type: StateType,
        key: String,
        value: Value,
        validator: Option<Arc<dyn StateValidator>>,
    },
    Delete {
        state_type: StateType,
        key: String,
    },
}

impl StateOperation {
    pub fn state_type(&self) -> StateType {
        match self {
            StateOperation::Set { state_type, .. } | StateOperation::Delete { state_type, .. } => {
                *state_type
            }
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StateOperation::Set { key, .. } | StateOperation::Delete { key, .. } => key,
        }
    }
}

/// 回滚栈条目：`previous` 为 `None` 表示操作前不存在
struct Inverse {
    state_type: StateType,
    key: String,
    previous: Option<Value>,
}

/// 按追加顺序执行的操作序列；任一步失败时逆序撤销已执行的操作
///
/// 提交过程不持有全局锁，并发读者可能看到中间状态。
pub struct StateTransaction {
    engine: StateEngine,
    cancel: CancellationToken,
    operations: Vec<StateOperation>,
    committed: bool,
}

impl StateTransaction {
    pub(crate) fn new(engine: StateEngine, cancel: CancellationToken) -> Self {
        Self {
            engine,
            cancel,
            operations: Vec::new(),
            committed: false,
        }
    }

    pub fn set(&mut self, state_type: StateType, key: impl Into<String>, value: Value) -> &mut Self {
        self.operations.push(StateOperation::Set {
            state_type,
            key: key.into(),
            value,
            validator: None,
        });
        self
    }

    pub fn set_with_validation(
        &mut self,
        state_type: StateType,
        key: impl Into<String>,
        value: Value,
        validator: Arc<dyn StateValidator>,
    ) -> &mut Self {
        self.operations.push(StateOperation::Set {
            state_type,
            key: key.into(),
            value,
            validator: Some(validator),
        });
        self
    }

    pub fn delete(&mut self, state_type: StateType, key: impl Into<String>) -> &mut Self {
        self.operations.push(StateOperation::Delete {
            state_type,
            key: key.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// 提交事务
    ///
    /// 校验全部通过后才开始写入；第 k 步失败时，0..k 步按逆序恢复为事务前的值，
    /// 返回 `StateError::System`。无论成败，事务此后不可再提交。
    pub async fn commit(&mut self) -> Result<(), StateError> {
        if self.committed {
            return Err(StateError::AlreadyCommitted);
        }
        self.committed = true;
        let operations = std::mem::take(&mut self.operations);

        for op in &operations {
            if let StateOperation::Set {
                state_type,
                value,
                validator,
                ..
            } = op
            {
                // set_state 会再跑一次类型校验器，这里必须先拦下
                if let Some(validator) = validator {
                    validator.validate(value)?;
                }
                if let Some(type_validator) = self.engine.validator(*state_type) {
                    type_validator.validate(value)?;
                }
            }
        }

        let mut rollback: Vec<Inverse> = Vec::with_capacity(operations.len());

        for (index, op) in operations.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(index, applied = rollback.len(), "transaction cancelled");
                self.roll_back(rollback).await;
                return Err(StateError::Cancelled);
            }

            let state_type = op.state_type();
            let key = op.key().to_string();

            let applied = match self.engine.get_state(state_type, &key).await {
                Ok(v) => Ok(Some(v)),
                Err(StateError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            };
            let applied = match applied {
                Ok(previous) => {
                    let result = match op {
                        StateOperation::Set { value, .. } => {
                            self.engine.set_state(state_type, &key, value).await
                        }
                        StateOperation::Delete { .. } => {
                            self.engine.delete_state(state_type, &key).await
                        }
                    };
                    result.map(|()| previous)
                }
                Err(e) => Err(e),
            };

            match applied {
                Ok(previous) => rollback.push(Inverse {
                    state_type,
                    key,
                    previous,
                }),
                Err(source) => {
                    tracing::warn!(
                        index,
                        %state_type,
                        key = %key,
                        error = %source,
                        "transaction operation failed; rolling back"
                    );
                    self.roll_back(rollback).await;
                    return Err(StateError::System {
                        index,
                        state_type,
                        key,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(())
    }

    async fn roll_back(&self, stack: Vec<Inverse>) {
        for inverse in stack.into_iter().rev() {
            let result = match inverse.previous {
                Some(value) => {
                    self.engine
                        .restore_state(inverse.state_type, &inverse.key, value)
                        .await
                }
                None => {
                    self.engine
                        .delete_state(inverse.state_type, &inverse.key)
                        .await
                }
            };
            // Not retried; the key may be left in its post-write state.
            if let Err(e) = result {
                tracing::error!(
                    state_type = %inverse.state_type,
                    key = %inverse.key,
                    error = %e,
                    "rollback step failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;
    use crate::error::ValidationError;
    use crate::state::provider::MemoryStateProvider;
    use serde_json::json;

    struct RejectAll;

    impl StateValidator for RejectAll {
        fn validate(&self, _state: &Value) -> Result<(), ValidationError> {
            Err(ValidationError::new("REJECTED", "value", "always rejected"))
        }
    }

    fn engine() -> StateEngine {
        StateEngine::builder(StateConfig::default())
            .register_state_provider(
                StateType::Tool,
                Arc::new(MemoryStateProvider::new(StateType::Tool)),
            )
            .build()
    }

    #[tokio::test]
    async fn validation_failure_applies_nothing() {
        let engine = engine();
        let mut tx = engine.create_state_transaction(CancellationToken::new());
        tx.set(StateType::Tool, "a", json!(1))
            .set_with_validation(StateType::Tool, "b", json!(2), Arc::new(RejectAll));

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(engine.get_state(StateType::Tool, "a").await.is_err());
        assert!(engine.event_store().is_empty().await);
        assert!(matches!(tx.commit().await, Err(StateError::AlreadyCommitted)));
    }

    #[tokio::test]
    async fn missing_provider_fails_at_its_index() {
        let engine = engine();
        let mut tx = engine.create_state_transaction(CancellationToken::new());
        tx.set(StateType::Tool, "a", json!(1))
            .set(StateType::Conversation, "c", json!(2));

        match tx.commit().await.unwrap_err() {
            StateError::System {
                index, state_type, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(state_type, StateType::Conversation);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.get_state(StateType::Tool, "a").await.is_err());
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_writes() {
        let engine = engine();
        let cancel = CancellationToken::new();
        let mut tx = engine.create_state_transaction(cancel.clone());
        tx.set(StateType::Tool, "a", json!(1));
        cancel.cancel();

        assert!(matches!(tx.commit().await, Err(StateError::Cancelled)));
        assert!(engine.get_state(StateType::Tool, "a").await.is_err());
    }
}
