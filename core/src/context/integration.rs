use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::aggregator::ContextAggregator;
use super::types::ComprehensiveContext;
use crate::error::ContextError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub tools_active: usize,
    pub event_count: usize,
    pub recommendation_count: usize,
    pub overall_health: f64,
    pub key_insights: Vec<String>,
    pub action_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRecommendation {
    pub tool: String,
    pub priority: String,
    pub reason: String,
    pub description: String,
    pub actions: Vec<String>,
}

/// Read-side helpers over the aggregator for callers that want a digest
/// rather than the full context.
#[derive(Clone)]
pub struct ContextIntegration {
    aggregator: Arc<ContextAggregator>,
}

impl ContextIntegration {
    pub fn new(aggregator: Arc<ContextAggregator>) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &Arc<ContextAggregator> {
        &self.aggregator
    }

    pub async fn context_summary(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ContextSummary, ContextError> {
        let context = self
            .aggregator
            .get_comprehensive_context(session_id, cancel)
            .await?;
        Ok(summarize(&context))
    }

    pub async fn tool_recommendations(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolRecommendation>, ContextError> {
        let context = self
            .aggregator
            .get_comprehensive_context(session_id, cancel)
            .await?;
        Ok(recommend_tools(&context, Utc::now()))
    }
}

pub fn summarize(context: &ComprehensiveContext) -> ContextSummary {
    ContextSummary {
        session_id: context.session_id.clone(),
        timestamp: context.timestamp,
        tools_active: context.tool_contexts.len(),
        event_count: context.recent_events.len(),
        recommendation_count: context.recommendations.len(),
        overall_health: overall_health(context),
        key_insights: key_insights(context),
        action_items: action_items(context),
    }
}

/// 1.0 minus 0.2 per critical and 0.1 per high recommendation, minus 0.15 per
/// predicted issue above 0.8 probability; floored at 0.
pub fn overall_health(context: &ComprehensiveContext) -> f64 {
    let mut health = 1.0;
    for rec in &context.recommendations {
        match rec.priority {
            1 => health -= 0.2,
            2 => health -= 0.1,
            _ => {}
        }
    }
    if let Some(insights) = &context.analysis_insights {
        health -= 0.15
            * insights
                .predicted_issues
                .iter()
                .filter(|i| i.probability > 0.8)
                .count() as f64;
    }
    f64::max(health, 0.0)
}

pub fn key_insights(context: &ComprehensiveContext) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(insights) = &context.analysis_insights {
        out.extend(
            insights
                .patterns
                .iter()
                .filter(|p| p.confidence > 0.8)
                .map(|p| p.description.clone()),
        );
    }
    out.extend(
        context
            .relationships
            .iter()
            .filter(|r| r.strength > 0.8)
            .map(|r| r.description.clone()),
    );
    out
}

/// Actions of critical/high recommendations plus mitigations of likely
/// predicted issues, de-duplicated in first-seen order.
pub fn action_items(context: &ComprehensiveContext) -> Vec<String> {
    let mut candidates: Vec<&String> = context
        .recommendations
        .iter()
        .filter(|r| r.priority <= 2)
        .flat_map(|r| r.actions.iter())
        .collect();
    if let Some(insights) = &context.analysis_insights {
        candidates.extend(
            insights
                .predicted_issues
                .iter()
                .filter(|i| i.probability > 0.7)
                .flat_map(|i| i.mitigations.iter()),
        );
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|a| seen.insert(a.as_str()))
        .cloned()
        .collect()
}

fn images_built(context: &ComprehensiveContext) -> u64 {
    context
        .tool_field("build", "docker_build")
        .and_then(|b| b.get("images_built"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

fn deployed(context: &ComprehensiveContext) -> bool {
    context
        .tool_field("deployment", "kubernetes")
        .and_then(|k| k.get("manifests_count"))
        .and_then(|v| v.as_u64())
        .is_some_and(|n| n > 0)
}

fn last_scan(context: &ComprehensiveContext) -> Option<DateTime<Utc>> {
    let scanned_at = context
        .tool_field("security", "security_scans")?
        .get("scanned_at")?
        .as_str()?;
    DateTime::parse_from_rfc3339(scanned_at)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn recommend_tools(context: &ComprehensiveContext, now: DateTime<Utc>) -> Vec<ToolRecommendation> {
    let mut out = Vec::new();

    if images_built(context) > 0 && !deployed(context) {
        out.push(ToolRecommendation {
            tool: "k8s_deploy".into(),
            priority: "high".into(),
            reason: "Images built but not deployed".into(),
            description: "Deploy the built images to Kubernetes".into(),
            actions: vec![
                "Review deployment manifests".into(),
                "Configure deployment parameters".into(),
                "Execute deployment".into(),
            ],
        });
    }

    let stale = last_scan(context).map_or(true, |t| t < now - chrono::Duration::hours(24));
    if stale {
        out.push(ToolRecommendation {
            tool: "security_scan".into(),
            priority: "medium".into(),
            reason: "Security scan outdated or missing".into(),
            description: "Run security scan on images".into(),
            actions: vec![
                "Scan for vulnerabilities".into(),
                "Review security policies".into(),
                "Update base images if needed".into(),
            ],
        });
    }

    let measured = context
        .tool_field("performance", "performance_metrics")
        .is_some();
    if !measured && deployed(context) {
        out.push(ToolRecommendation {
            tool: "performance_test".into(),
            priority: "low".into(),
            reason: "No performance testing done".into(),
            description: "Run performance tests on deployed application".into(),
            actions: vec![
                "Define performance criteria".into(),
                "Execute load tests".into(),
                "Analyze results".into(),
            ],
        });
    }

    out
}
