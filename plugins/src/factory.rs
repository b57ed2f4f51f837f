use std::sync::Arc;
use std::time::Duration;

use ckstate_core::api::{
    AppConfig, ContextAggregator, ContextIntegration, MemoryStateProvider, SessionManager,
    StateEngine, StateObserver, StateType,
};

use crate::enrichers::{InsightEnricher, PerformanceEnricher, RelationshipEnricher, SecurityEnricher};
use crate::observers::{AlertingObserver, AuditObserver, LoggingObserver, MetricsObserver};
use crate::providers::{
    BuildContextProvider, DeploymentContextProvider, PerformanceContextProvider,
    SecurityContextProvider, StateContextProvider,
};
use crate::validators::{
    ConversationStateValidator, GlobalStateValidator, SessionStateValidator, ToolStateValidator,
    WorkflowStateValidator,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Observers enabled by `[observers]`, kept typed so callers can read them back.
#[derive(Default, Clone)]
pub struct Observers {
    pub logging: Option<Arc<LoggingObserver>>,
    pub metrics: Option<Arc<MetricsObserver>>,
    pub audit: Option<Arc<AuditObserver>>,
    pub alerting: Option<Arc<AlertingObserver>>,
}

impl Observers {
    pub fn all(&self) -> Vec<Arc<dyn StateObserver>> {
        let mut out: Vec<Arc<dyn StateObserver>> = Vec::new();
        if let Some(o) = &self.logging {
            out.push(o.clone());
        }
        if let Some(o) = &self.metrics {
            out.push(o.clone());
        }
        if let Some(o) = &self.audit {
            out.push(o.clone());
        }
        if let Some(o) = &self.alerting {
            out.push(o.clone());
        }
        out
    }
}

pub fn build_observers(cfg: &AppConfig) -> Observers {
    let o = &cfg.observers;
    Observers {
        logging: o.logging.then(|| Arc::new(LoggingObserver::new())),
        metrics: o
            .metrics
            .then(|| Arc::new(MetricsObserver::new(o.metrics_window()))),
        audit: o
            .audit
            .then(|| Arc::new(AuditObserver::new(o.audit_max_entries))),
        alerting: o.alerting.then(|| Arc::new(AlertingObserver::new())),
    }
}

/// In-memory providers for every state type, the stock validators, and the
/// given observers. Starts the observer dispatcher, so it needs a runtime.
pub fn build_state_engine(cfg: &AppConfig, observers: &Observers) -> StateEngine {
    let mut builder = StateEngine::builder(cfg.state.clone());
    for state_type in StateType::ALL {
        builder =
            builder.register_state_provider(state_type, Arc::new(MemoryStateProvider::new(state_type)));
    }
    builder = builder
        .register_validator(StateType::Session, Arc::new(SessionStateValidator))
        .register_validator(StateType::Conversation, Arc::new(ConversationStateValidator::new()))
        .register_validator(StateType::Workflow, Arc::new(WorkflowStateValidator))
        .register_validator(StateType::Tool, Arc::new(ToolStateValidator::new()))
        .register_validator(StateType::Global, Arc::new(GlobalStateValidator));
    for observer in observers.all() {
        builder = builder.register_observer(observer);
    }
    builder.build()
}

pub fn build_session_manager(cfg: &AppConfig) -> SessionManager {
    SessionManager::new(&cfg.session)
}

/// Registers the five domain providers and the four enrichers, in that order.
pub fn build_context_aggregator(
    cfg: &AppConfig,
    sessions: &SessionManager,
    engine: &StateEngine,
    observers: &Observers,
) -> (ContextAggregator, Arc<PerformanceContextProvider>) {
    let performance = Arc::new(PerformanceContextProvider::new(sessions.clone()));

    let mut aggregator = ContextAggregator::new(&cfg.context);
    aggregator.register_context_provider(
        None,
        Arc::new(BuildContextProvider::new(sessions.clone(), engine.clone())),
    );
    aggregator.register_context_provider(
        None,
        Arc::new(DeploymentContextProvider::new(sessions.clone(), engine.clone())),
    );
    aggregator.register_context_provider(
        None,
        Arc::new(SecurityContextProvider::new(sessions.clone())),
    );
    aggregator.register_context_provider(None, performance.clone());
    aggregator.register_context_provider(
        None,
        Arc::new(StateContextProvider::new(
            engine.clone(),
            observers.metrics.clone(),
        )),
    );

    aggregator.register_context_enricher(Arc::new(RelationshipEnricher));
    aggregator.register_context_enricher(Arc::new(InsightEnricher));
    aggregator.register_context_enricher(Arc::new(SecurityEnricher));
    aggregator.register_context_enricher(Arc::new(PerformanceEnricher));

    (aggregator, performance)
}

/// Everything wired together from one config.
#[derive(Clone)]
pub struct Stack {
    pub engine: StateEngine,
    pub sessions: SessionManager,
    pub aggregator: Arc<ContextAggregator>,
    pub integration: ContextIntegration,
    pub performance: Arc<PerformanceContextProvider>,
    pub observers: Observers,
}

impl Stack {
    /// Session sweeper and event retention cleanup.
    pub async fn start_background(&self) {
        self.sessions.start_sweeper().await;
        self.engine.start_event_cleanup().await;
    }

    pub async fn shutdown(&self) {
        self.sessions.stop(SHUTDOWN_TIMEOUT).await;
        self.engine.shutdown().await;
    }
}

pub fn build_stack(cfg: &AppConfig) -> Stack {
    let observers = build_observers(cfg);
    let engine = build_state_engine(cfg, &observers);
    let sessions = build_session_manager(cfg);
    let (aggregator, performance) =
        build_context_aggregator(cfg, &sessions, &engine, &observers);
    let aggregator = Arc::new(aggregator);

    tracing::debug!(
        providers = ?aggregator.provider_names(),
        enrichers = ?aggregator.enricher_names(),
        observers = observers.all().len(),
        "stack assembled"
    );

    Stack {
        integration: ContextIntegration::new(aggregator.clone()),
        engine,
        sessions,
        aggregator,
        performance,
        observers,
    }
}
