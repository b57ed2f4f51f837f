use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::traits::{ContextEnricher, ContextProvider};
use super::types::{ComprehensiveContext, ContextDiagnostics, ContextRequest};
use crate::config::ContextConfig;
use crate::error::ContextError;

/// Composes per-domain providers into one session view, runs enrichers over
/// it and caches the result for `cache_ttl`.
///
/// Registration takes `&mut self`, so it happens before the aggregator is
/// shared.
pub struct ContextAggregator {
    providers: Vec<(String, Arc<dyn ContextProvider>)>,
    enrichers: Vec<Arc<dyn ContextEnricher>>,
    cache: Mutex<LruCache<String, Arc<ComprehensiveContext>>>,
    ttl: Duration,
    building: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    diagnostics: Mutex<LruCache<String, ContextDiagnostics>>,
}

impl ContextAggregator {
    pub fn new(config: &ContextConfig) -> Self {
        Self::with_cache(config.cache_ttl(), config.cache_max_entries)
    }

    pub fn with_cache(ttl: Duration, max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            providers: Vec::new(),
            enrichers: Vec::new(),
            cache: Mutex::new(LruCache::new(cap)),
            ttl,
            building: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(LruCache::new(cap)),
        }
    }

    /// `name` defaults to the provider's own name.
    pub fn register_context_provider(
        &mut self,
        name: Option<&str>,
        provider: Arc<dyn ContextProvider>,
    ) {
        let name = name.unwrap_or_else(|| provider.name()).to_string();
        self.providers.push((name, provider));
    }

    pub fn register_context_enricher(&mut self, enricher: Arc<dyn ContextEnricher>) {
        self.enrichers.push(enricher);
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn enricher_names(&self) -> Vec<&str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    pub async fn get_comprehensive_context(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ComprehensiveContext>, ContextError> {
        if let Some(hit) = self.cached(session_id).await {
            tracing::debug!(session_id, "context cache hit");
            return Ok(hit);
        }

        // One build per session at a time; waiters re-check the cache.
        let guard = self.build_guard(session_id).await;
        let result = {
            let _building = guard.lock().await;
            match self.cached(session_id).await {
                Some(hit) => {
                    tracing::debug!(session_id, "context built by concurrent request");
                    Ok(hit)
                }
                None => self.build(session_id, cancel).await,
            }
        };
        self.release_guard(session_id, &guard).await;
        result
    }

    async fn build_guard(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.building
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    async fn release_guard(&self, session_id: &str, guard: &Arc<Mutex<()>>) {
        let mut building = self.building.lock().await;
        // map + caller
        if Arc::strong_count(guard) <= 2 {
            building.remove(session_id);
        }
    }

    async fn build(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ComprehensiveContext>, ContextError> {
        let mut context = ComprehensiveContext::new(session_id);
        let mut diagnostics = ContextDiagnostics::new(session_id);
        let request = ContextRequest::all(session_id, &context.request_id);

        for (name, provider) in &self.providers {
            if cancel.is_cancelled() {
                return Err(ContextError::Cancelled(session_id.to_string()));
            }
            match provider.get_context(&request, cancel).await {
                Ok(data) => context.merge(data),
                Err(e) => {
                    tracing::warn!(session_id, provider = %name, error = %e, "context provider failed");
                    diagnostics.record(name, &e);
                }
            }
        }

        for enricher in &self.enrichers {
            if cancel.is_cancelled() {
                return Err(ContextError::Cancelled(session_id.to_string()));
            }
            if let Err(e) = enricher.enrich(&mut context, cancel).await {
                tracing::warn!(session_id, enricher = enricher.name(), error = %e, "context enricher failed");
                diagnostics.record(enricher.name(), &e);
            }
        }

        let now = Utc::now();
        context.timestamp = now;
        context.updated_at = now;
        let context = Arc::new(context);

        self.cache
            .lock()
            .await
            .put(session_id.to_string(), context.clone());
        if !diagnostics.is_empty() {
            tracing::info!(session_id, failures = diagnostics.len(), "context built with failures");
        }
        self.diagnostics
            .lock()
            .await
            .put(session_id.to_string(), diagnostics);

        Ok(context)
    }

    async fn cached(&self, session_id: &str) -> Option<Arc<ComprehensiveContext>> {
        let mut cache = self.cache.lock().await;
        let fresh = {
            let entry = cache.get(session_id)?;
            let age = Utc::now().signed_duration_since(entry.updated_at);
            age.to_std().map(|age| age < self.ttl).unwrap_or(true)
        };
        if fresh {
            cache.get(session_id).cloned()
        } else {
            cache.pop(session_id);
            None
        }
    }

    pub async fn invalidate(&self, session_id: &str) -> bool {
        self.cache.lock().await.pop(session_id).is_some()
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Failures swallowed during the most recent build for `session_id`.
    pub async fn last_diagnostics(&self, session_id: &str) -> ContextDiagnostics {
        self.diagnostics
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| ContextDiagnostics::new(session_id))
    }
}
