mod common;

use std::sync::Arc;
use std::time::Duration;

use ckstate_core::api::{SessionState, StateError, StateEventKind, StateObserver, StateType};
use ckstate_plugins::factory::{build_state_engine, Observers};
use ckstate_plugins::observers::{AuditObserver, CompositeObserver, MetricsObserver};
use common::quiet_config;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn observers() -> Observers {
    Observers {
        metrics: Some(Arc::new(MetricsObserver::new(Duration::from_secs(300)))),
        audit: Some(Arc::new(AuditObserver::new(100))),
        ..Default::default()
    }
}

#[tokio::test]
async fn writes_reach_metrics_and_audit() {
    let obs = observers();
    let engine = build_state_engine(&quiet_config(), &obs);

    let session = serde_json::to_value(SessionState::new("s1")).unwrap();
    engine
        .set_state(StateType::Session, "s1", session.clone())
        .await
        .unwrap();
    let mut renamed = session.clone();
    renamed["repo_url"] = json!("https://example.invalid/app.git");
    engine
        .set_state(StateType::Session, "s1", renamed)
        .await
        .unwrap();
    engine.delete_state(StateType::Session, "s1").await.unwrap();
    engine.flush_observers().await;

    let metrics = obs.metrics.as_ref().unwrap();
    let m = metrics.metrics_for(StateType::Session).await.unwrap();
    assert_eq!((m.update_count, m.delete_count, m.total_changes), (2, 1, 3));

    let entries = obs.audit.as_ref().unwrap().entries().await;
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].changes.as_deref(), Some("changed: repo_url"));
    assert_eq!(entries[2].kind, StateEventKind::Deleted);

    engine.shutdown().await;
}

#[tokio::test]
async fn rejected_writes_emit_nothing() {
    let obs = observers();
    let engine = build_state_engine(&quiet_config(), &obs);

    let err = engine
        .set_state(StateType::Session, "s1", json!({"session_id": ""}))
        .await
        .unwrap_err();
    match err {
        StateError::Validation(v) => assert_eq!(v.field, "session_id"),
        other => panic!("unexpected error: {other}"),
    }

    let mut tx = engine.create_state_transaction(CancellationToken::new());
    tx.set(StateType::Workflow, "w1", json!({"stage": "build"}))
        .set(StateType::Conversation, "c1", json!({"conversation_id": "c1"}));
    assert!(matches!(tx.commit().await, Err(StateError::Validation(_))));

    engine.flush_observers().await;
    assert!(obs.audit.as_ref().unwrap().is_empty().await);
    assert!(engine
        .get_state(StateType::Workflow, "w1")
        .await
        .unwrap_err()
        .is_not_found());
    engine.shutdown().await;
}

#[tokio::test]
async fn failing_composite_does_not_fail_the_writer() {
    struct Broken;

    #[async_trait::async_trait]
    impl StateObserver for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        async fn on_state_change(
            &self,
            _event: &ckstate_core::api::StateEvent,
        ) -> anyhow::Result<()> {
            anyhow::bail!("downstream unavailable")
        }
    }

    let tail = Arc::new(AuditObserver::new(10));
    let members: Vec<Arc<dyn StateObserver>> = vec![Arc::new(Broken), tail.clone()];
    let engine = ckstate_core::api::StateEngine::builder(quiet_config().state)
        .register_state_provider(
            StateType::Global,
            Arc::new(ckstate_core::api::MemoryStateProvider::new(StateType::Global)),
        )
        .register_observer(Arc::new(CompositeObserver::new("chain", members)))
        .build();

    engine
        .set_state(StateType::Global, "flag", json!(true))
        .await
        .unwrap();
    engine.flush_observers().await;

    assert_eq!(engine.get_state(StateType::Global, "flag").await.unwrap(), json!(true));
    assert!(tail.is_empty().await);
    engine.shutdown().await;
}
