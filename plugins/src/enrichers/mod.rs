pub mod insight;
pub mod performance;
pub mod relationship;
pub mod security;

pub use insight::InsightEnricher;
pub use performance::{Bottleneck, PerformanceEnricher};
pub use relationship::RelationshipEnricher;
pub use security::{risk_level, RiskAssessment, SecurityEnricher, SecurityRisk};
