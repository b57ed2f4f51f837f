use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use ckstate_core::api::{
    AnalysisInsights, Anomaly, ComprehensiveContext, ContextEnricher, Event, Pattern,
    PredictedIssue, Recommendation,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::providers::ensure_live;

const MIN_EVENTS_FOR_PATTERNS: usize = 5;
const MIN_PATTERN_OCCURRENCES: usize = 3;
const DISK_PRESSURE_RATIO: f64 = 0.8;

fn new_id(prefix: &str, kind: &str) -> String {
    format!("{prefix}-{kind}-{}", uuid::Uuid::new_v4().simple())
}

pub fn categorize_pattern(pattern_type: &str) -> &'static str {
    match pattern_type {
        "repeated_failure" => "reliability_issue",
        "performance_degradation" => "performance_issue",
        "resource_spike" => "resource_issue",
        _ => "general_pattern",
    }
}

pub fn anomaly_severity(anomaly_type: &str) -> &'static str {
    match anomaly_type {
        "security_breach" | "data_loss" => "critical",
        "performance_degradation" | "service_disruption" => "high",
        "resource_anomaly" | "config_drift" => "medium",
        _ => "low",
    }
}

pub fn mitigations(issue_type: &str) -> Vec<String> {
    let list: &[&str] = match issue_type {
        "resource_exhaustion" => &[
            "Increase resource quotas",
            "Implement resource cleanup policies",
            "Enable auto-scaling",
            "Optimize resource usage",
        ],
        "build_failure" => &[
            "Review build configuration",
            "Check dependency versions",
            "Enable incremental builds",
            "Implement build caching",
        ],
        "deployment_failure" => &[
            "Validate manifests",
            "Check cluster connectivity",
            "Review resource requirements",
            "Implement rollback strategy",
        ],
        _ => &["Review logs", "Contact support", "Check documentation"],
    };
    list.iter().map(|s| s.to_string()).collect()
}

fn severity_priority(severity: &str) -> u8 {
    match severity {
        "critical" => 1,
        "high" => 2,
        "medium" => 3,
        _ => 4,
    }
}

/// Patterns, anomalies and predictions over the event timeline, and the
/// recommendations that follow from them.
///
/// Insights already on the context are refined in place rather than
/// regenerated.
pub struct InsightEnricher;

impl InsightEnricher {
    fn detect_patterns(events: &[Event]) -> Vec<Pattern> {
        if events.len() <= MIN_EVENTS_FOR_PATTERNS {
            return Vec::new();
        }
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for e in events {
            *counts.entry(e.event_type.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > MIN_PATTERN_OCCURRENCES)
            .map(|(kind, n)| Pattern {
                id: new_id("pattern", kind),
                pattern_type: kind.to_string(),
                category: categorize_pattern(kind).to_string(),
                description: format!("Repeated {kind} events detected"),
                confidence: n as f64 / events.len() as f64,
                occurrences: n,
            })
            .collect()
    }

    fn detect_anomalies(events: &[Event]) -> Vec<Anomaly> {
        events
            .iter()
            .filter(|e| e.severity == "critical")
            .map(|e| Anomaly {
                id: new_id("anomaly", &e.event_type),
                anomaly_type: e.event_type.clone(),
                severity: e.severity.clone(),
                description: if e.message.is_empty() {
                    format!("Critical {} event from {}", e.event_type, e.source)
                } else {
                    e.message.clone()
                },
                timestamp: e.timestamp,
            })
            .collect()
    }

    fn predict_issues(context: &ComprehensiveContext) -> Vec<PredictedIssue> {
        let ratio = context
            .tool_field("performance", "usage_percentages")
            .and_then(|u| u.get("disk_usage"))
            .and_then(Value::as_f64);
        match ratio {
            Some(r) if r > DISK_PRESSURE_RATIO => vec![PredictedIssue {
                id: new_id("predict", "resource_exhaustion"),
                issue_type: "resource_exhaustion".into(),
                title: "Workspace disk nearly full".into(),
                description: format!("Disk usage at {:.0}% of quota", r * 100.0),
                probability: r.min(1.0),
                impact: "high".into(),
                mitigations: mitigations("resource_exhaustion"),
                predicted_at: Utc::now(),
            }],
            _ => Vec::new(),
        }
    }

    fn generate(context: &ComprehensiveContext) -> AnalysisInsights {
        AnalysisInsights {
            patterns: Self::detect_patterns(&context.recent_events),
            anomalies: Self::detect_anomalies(&context.recent_events),
            predicted_issues: Self::predict_issues(context),
        }
    }

    /// Re-categorises patterns (escalating confidence past 10 occurrences),
    /// re-grades anomalies and refreshes prediction mitigations.
    pub fn refine(insights: &mut AnalysisInsights) {
        for p in &mut insights.patterns {
            p.category = categorize_pattern(&p.pattern_type).to_string();
            if p.occurrences > 10 {
                p.confidence = (p.confidence * 1.2).min(1.0);
            }
        }
        for a in &mut insights.anomalies {
            a.severity = anomaly_severity(&a.anomaly_type).to_string();
        }
        for i in &mut insights.predicted_issues {
            i.mitigations = mitigations(&i.issue_type);
        }
    }

    fn recommendations(insights: &AnalysisInsights) -> Vec<Recommendation> {
        let now = Utc::now();
        let mut out = Vec::new();

        for p in insights.patterns.iter().filter(|p| p.confidence > 0.7) {
            out.push(Recommendation {
                id: new_id("pattern", &p.pattern_type),
                title: format!("Pattern Detected: {}", p.pattern_type),
                description: p.description.clone(),
                priority: match p.occurrences {
                    n if n > 10 => 1,
                    n if n > 5 => 2,
                    _ => 3,
                },
                category: "pattern".into(),
                actions: vec![
                    "Review pattern occurrences".into(),
                    "Monitor for escalation".into(),
                    "Consider automation".into(),
                ],
                confidence: p.confidence,
                created_at: now,
            });
        }

        for a in insights
            .anomalies
            .iter()
            .filter(|a| a.severity == "high" || a.severity == "critical")
        {
            out.push(Recommendation {
                id: new_id("anomaly", &a.anomaly_type),
                title: format!("Anomaly: {}", a.anomaly_type),
                description: a.description.clone(),
                priority: severity_priority(&a.severity),
                category: "anomaly".into(),
                actions: vec![
                    "Investigate anomaly".into(),
                    "Review system logs".into(),
                    "Check for security issues".into(),
                ],
                confidence: 0.85,
                created_at: now,
            });
        }

        for i in insights.predicted_issues.iter().filter(|i| i.probability > 0.6) {
            out.push(Recommendation {
                id: new_id("predict", &i.issue_type),
                title: format!("Potential Issue: {}", i.issue_type),
                description: i.description.clone(),
                priority: if i.probability > 0.8 { 1 } else { 2 },
                category: "prediction".into(),
                actions: i.mitigations.clone(),
                confidence: i.probability,
                created_at: now,
            });
        }
        out
    }

    fn cross_tool_insights(context: &ComprehensiveContext) -> Vec<Value> {
        let images = context
            .tool_field("build", "docker_build")
            .and_then(|b| b.get("images_built"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let manifests = context
            .tool_field("deployment", "kubernetes")
            .and_then(|k| k.get("manifests_count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if images > 0 && manifests == 0 {
            vec![json!({
                "type": "build_deploy_gap",
                "description": "Images built but not deployed",
                "severity": "medium",
                "action": "Consider deploying built images",
            })]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl ContextEnricher for InsightEnricher {
    fn name(&self) -> &str {
        "insight_enricher"
    }

    async fn enrich(
        &self,
        context: &mut ComprehensiveContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        ensure_live(cancel, "insight enrichment")?;

        if context.analysis_insights.is_some() {
            Self::refine(context.insights_mut());
        } else {
            context.analysis_insights = Some(Self::generate(context));
        }

        let recommendations = context
            .analysis_insights
            .as_ref()
            .map(Self::recommendations)
            .unwrap_or_default();
        let added = recommendations.len();
        context.recommendations.extend(recommendations);

        let cross_tool = Self::cross_tool_insights(context);
        if !cross_tool.is_empty() {
            context
                .metadata
                .insert("cross_tool_insights".into(), Value::Array(cross_tool));
        }

        tracing::debug!(session_id = %context.session_id, recommendations = added, "insights generated");
        Ok(())
    }
}
