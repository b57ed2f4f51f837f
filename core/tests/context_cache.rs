mod common;

use std::sync::Arc;
use std::time::Duration;

use ckstate_core::api::{ContextAggregator, ContextType};
use common::CountingProvider;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cache_serves_within_ttl_and_rebuilds_after() {
    let provider = CountingProvider::new(ContextType::Build);
    let mut agg = ContextAggregator::with_cache(Duration::from_millis(150), 16);
    agg.register_context_provider(None, provider.clone());
    let cancel = CancellationToken::new();

    let first = agg.get_comprehensive_context("s1", &cancel).await.unwrap();
    let second = agg.get_comprehensive_context("s1", &cancel).await.unwrap();
    assert_eq!(provider.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let third = agg.get_comprehensive_context("s1", &cancel).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_ne!(first.request_id, third.request_id);
}

#[tokio::test]
async fn sessions_are_cached_independently() {
    let provider = CountingProvider::new(ContextType::State);
    let mut agg = ContextAggregator::with_cache(Duration::from_secs(60), 16);
    agg.register_context_provider(Some("state"), provider.clone());
    let cancel = CancellationToken::new();

    let a = agg.get_comprehensive_context("a", &cancel).await.unwrap();
    let b = agg.get_comprehensive_context("b", &cancel).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(a.tool_field("state", "session"), Some(&"a".into()));
    assert_eq!(b.tool_field("state", "session"), Some(&"b".into()));

    agg.invalidate("a").await;
    agg.get_comprehensive_context("a", &cancel).await.unwrap();
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn concurrent_reads_share_one_cached_view() {
    let provider = CountingProvider::new(ContextType::Build);
    let mut agg = ContextAggregator::with_cache(Duration::from_secs(60), 16);
    agg.register_context_provider(None, provider.clone());
    let agg = Arc::new(agg);
    let cancel = CancellationToken::new();

    agg.get_comprehensive_context("s", &cancel).await.unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let agg = agg.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            agg.get_comprehensive_context("s", &cancel).await.map(|c| c.request_id.clone())
        }));
    }
    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn cold_concurrent_requests_build_once() {
    let provider = CountingProvider::slow(ContextType::Build, Duration::from_millis(50));
    let mut agg = ContextAggregator::with_cache(Duration::from_secs(60), 16);
    agg.register_context_provider(None, provider.clone());
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        agg.get_comprehensive_context("s", &cancel),
        agg.get_comprehensive_context("s", &cancel)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(provider.calls(), 1);
    assert_eq!(a.request_id, b.request_id);
}

#[tokio::test]
async fn diagnostics_are_kept_per_session() {
    let provider = CountingProvider::failing_for(ContextType::Build, "bad");
    let mut agg = ContextAggregator::with_cache(Duration::from_secs(60), 16);
    agg.register_context_provider(None, provider);
    let cancel = CancellationToken::new();

    agg.get_comprehensive_context("bad", &cancel).await.unwrap();
    agg.get_comprehensive_context("good", &cancel).await.unwrap();

    assert_eq!(agg.last_diagnostics("bad").await.len(), 1);
    assert!(agg.last_diagnostics("good").await.is_empty());
}
