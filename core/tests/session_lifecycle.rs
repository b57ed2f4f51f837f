use std::time::Duration;

use ckstate_core::api::{SessionError, SessionManager};

#[tokio::test]
async fn session_expires_after_ttl_on_access() {
    let mgr = SessionManager::with_limits(Duration::from_millis(100), 10);
    mgr.get_or_create("a").await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(mgr.get("a").await.is_ok());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let err = mgr.get("a").await.unwrap_err();
    assert_eq!(err, SessionError::Expired("a".into()));
    assert_eq!(mgr.stats().await.total, 0);
}

#[tokio::test]
async fn sweeper_removes_expired_without_access() {
    let mgr = SessionManager::with_limits(Duration::from_millis(100), 10);
    mgr.start_sweeper().await;
    mgr.get_or_create("a").await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(mgr.stats().await.total, 0);
    mgr.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn list_skips_but_keeps_expired_entries() {
    let mgr = SessionManager::with_limits(Duration::from_millis(50), 10);
    mgr.get_or_create("a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(mgr.list().await.is_empty());
    let stats = mgr.stats().await;
    assert_eq!(stats.expired_pending, 1);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn capacity_evicts_least_recently_accessed() {
    let mgr = SessionManager::with_limits(Duration::from_secs(60), 2);
    mgr.get_or_create("a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    mgr.get_or_create("b").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    mgr.get("a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    mgr.get_or_create("c").await.unwrap();

    assert!(mgr.get("a").await.is_ok());
    assert!(mgr.get("c").await.is_ok());
    assert_eq!(mgr.get("b").await.unwrap_err(), SessionError::NotFound("b".into()));
}

#[tokio::test]
async fn concurrent_get_or_create_yields_one_session() {
    let mgr = SessionManager::with_limits(Duration::from_secs(60), 10);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let mgr = mgr.clone();
        handles.push(tokio::spawn(async move { mgr.get_or_create("shared").await }));
    }
    let mut created = Vec::new();
    for h in handles {
        created.push(h.await.unwrap().unwrap().created_at);
    }
    created.dedup();
    assert_eq!(created.len(), 1);
    assert_eq!(mgr.stats().await.total, 1);
}
