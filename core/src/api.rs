//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `ckstate_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from_path, AppConfig, ContextConfig, LoggingConfig, ObserversConfig,
    SessionConfig, StateConfig,
};
pub use crate::context::{
    AnalysisInsights, Analyzer, Anomaly, ComprehensiveContext, ContextAggregator,
    ContextAwareAnalyzer, ContextData, ContextDiagnostics, ContextEnricher, ContextIntegration,
    ContextProvider, ContextProviderCapabilities, ContextRelationship, ContextRequest,
    ContextSummary, ContextType, ErrorAnalysis, Event, Pattern, PredictedIssue, Recommendation,
    ToolContext, ToolRecommendation,
};
pub use crate::error::{CliError, ContextError, SessionError, StateError, ValidationError};
pub use crate::session::{
    DockerfileState, JobStatus, SecurityScanResult, SessionManager, SessionState, SessionStats,
    ToolExecution, VulnerabilitySummary,
};
pub use crate::state::{
    EventStore, MemoryStateProvider, NoopReplication, ReplicationHook, StateEngine,
    StateEngineBuilder, StateEvent, StateEventKind, StateHistoryEntry, StateObserver,
    StateOperation, StateProvider, StateTransaction, StateType, StateValidator, ValidationRule,
};
