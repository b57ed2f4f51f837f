//! 会话生命周期管理

pub mod manager;
pub mod state;

pub use manager::{SessionEntry, SessionManager, SessionStats};
pub use state::{
    DockerfileState, JobStatus, SecurityScanResult, SessionState, ToolExecution,
    VulnerabilitySummary,
};
