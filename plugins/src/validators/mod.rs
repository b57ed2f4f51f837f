pub mod composite;
pub mod conversation;
pub mod session;
pub mod simple;

pub use composite::CompositeValidator;
pub use conversation::{ConversationStateValidator, CONVERSATION_STAGES};
pub use session::SessionStateValidator;
pub use simple::{FieldCheck, GlobalStateValidator, ToolStateValidator, WorkflowStateValidator};
