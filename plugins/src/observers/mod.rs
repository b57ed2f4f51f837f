pub mod alerting;
pub mod audit;
pub mod composite;
pub mod logging;
pub mod metrics;

pub use alerting::{AlertHandler, AlertingObserver};
pub use audit::{diff_summary, AuditEntry, AuditObserver};
pub use composite::CompositeObserver;
pub use logging::LoggingObserver;
pub use metrics::{MetricsObserver, StateTypeMetrics};
