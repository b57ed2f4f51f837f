use async_trait::async_trait;
use chrono::Utc;
use ckstate_core::api::{ComprehensiveContext, ContextEnricher, Recommendation};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::providers::ensure_live;

const CPU_THRESHOLD: f64 = 80.0;
const MEMORY_THRESHOLD: f64 = 85.0;
const ERROR_RATE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct Bottleneck {
    pub kind: &'static str,
    pub title: &'static str,
    pub description: String,
    pub severity: &'static str,
    pub impact: f64,
    pub confidence: f64,
    pub actions: [&'static str; 3],
}

fn priority(severity: &str) -> u8 {
    match severity {
        "critical" => 1,
        "high" => 2,
        "medium" => 3,
        "low" => 4,
        _ => 5,
    }
}

/// Flags CPU, memory and error-rate bottlenecks from the performance tool
/// context and copies the raw figures into the context metrics.
pub struct PerformanceEnricher;

impl PerformanceEnricher {
    fn figure(context: &ComprehensiveContext, field: &str) -> Option<f64> {
        context
            .tool_field("performance", "performance_metrics")?
            .get(field)
            .and_then(Value::as_f64)
    }

    pub fn bottlenecks(context: &ComprehensiveContext) -> Vec<Bottleneck> {
        let mut out = Vec::new();
        if let Some(cpu) = Self::figure(context, "cpu_usage").filter(|v| *v > CPU_THRESHOLD) {
            out.push(Bottleneck {
                kind: "cpu",
                title: "High CPU Usage",
                description: format!("CPU usage at {cpu:.1}% exceeds threshold"),
                severity: "high",
                impact: 0.8,
                confidence: 0.9,
                actions: [
                    "Profile CPU usage to identify hot spots",
                    "Optimize compute-intensive operations",
                    "Consider horizontal scaling",
                ],
            });
        }
        if let Some(mem) = Self::figure(context, "memory_usage").filter(|v| *v > MEMORY_THRESHOLD) {
            out.push(Bottleneck {
                kind: "memory",
                title: "High Memory Usage",
                description: format!("Memory usage at {mem:.1}% indicates pressure"),
                severity: "high",
                impact: 0.7,
                confidence: 0.9,
                actions: [
                    "Analyze memory allocation patterns",
                    "Check for memory leaks",
                    "Optimize data structures",
                ],
            });
        }
        if let Some(rate) =
            Self::figure(context, "error_rate").filter(|v| *v > ERROR_RATE_THRESHOLD)
        {
            out.push(Bottleneck {
                kind: "reliability",
                title: "High Error Rate",
                description: format!("Error rate at {:.1}%", rate * 100.0),
                severity: "critical",
                impact: 0.9,
                confidence: 0.95,
                actions: [
                    "Investigate error patterns",
                    "Implement better error handling",
                    "Add retry mechanisms",
                ],
            });
        }
        out
    }
}

#[async_trait]
impl ContextEnricher for PerformanceEnricher {
    fn name(&self) -> &str {
        "performance_enricher"
    }

    async fn enrich(
        &self,
        context: &mut ComprehensiveContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        ensure_live(cancel, "performance enrichment")?;
        let now = Utc::now();

        for b in Self::bottlenecks(context) {
            context.recommendations.push(Recommendation {
                id: format!("perf-{}-{}", b.kind, uuid::Uuid::new_v4().simple()),
                title: b.title.to_string(),
                description: b.description,
                priority: priority(b.severity),
                category: "performance".into(),
                actions: b.actions.iter().map(|a| a.to_string()).collect(),
                confidence: b.confidence,
                created_at: now,
            });
        }

        for (field, metric) in [
            ("cpu_usage", "cpu_usage_percent"),
            ("memory_usage", "memory_usage_percent"),
            ("error_rate", "error_rate"),
            ("response_time_ms", "response_time_ms"),
        ] {
            if let Some(v) = Self::figure(context, field) {
                context.metrics.insert(metric.to_string(), v);
            }
        }
        if let (Some(cpu), Some(mem)) = (
            context.metrics.get("cpu_usage_percent").copied(),
            context.metrics.get("memory_usage_percent").copied(),
        ) {
            context
                .metrics
                .insert("resource_utilization".into(), (cpu + mem) / 2.0);
        }
        Ok(())
    }
}
