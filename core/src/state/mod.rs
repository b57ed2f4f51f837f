//! 统一状态引擎
//!
//! 提供按类别注册的 provider / validator / observer、事件存储，以及带回滚的多键事务。

mod dispatch;
pub mod engine;
pub mod event_store;
pub mod observer;
pub mod provider;
pub mod replication;
pub mod transaction;
pub mod types;
pub mod validator;

pub use engine::{StateEngine, StateEngineBuilder};
pub use event_store::EventStore;
pub use observer::StateObserver;
pub use provider::{MemoryStateProvider, StateProvider};
pub use replication::{NoopReplication, ReplicationHook};
pub use transaction::{StateOperation, StateTransaction};
pub use types::{StateEvent, StateEventKind, StateHistoryEntry, StateType, ValidationRule};
pub use validator::StateValidator;
