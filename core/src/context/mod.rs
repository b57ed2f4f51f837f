pub mod aggregator;
pub mod analyzer;
pub mod integration;
pub mod traits;
pub mod types;

pub use aggregator::ContextAggregator;
pub use analyzer::{ContextAwareAnalyzer, ErrorAnalysis};
pub use integration::{ContextIntegration, ContextSummary, ToolRecommendation};
pub use traits::{Analyzer, ContextEnricher, ContextProvider};
pub use types::{
    AnalysisInsights, Anomaly, ComprehensiveContext, ContextData, ContextDiagnostics,
    ContextProviderCapabilities, ContextRelationship, ContextRequest, ContextType, Event,
    Pattern, PredictedIssue, Recommendation, ToolContext,
};
