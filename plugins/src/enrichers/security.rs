use async_trait::async_trait;
use chrono::Utc;
use ckstate_core::api::{ComprehensiveContext, ContextEnricher, Recommendation};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::providers::ensure_live;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityRisk {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub mitigations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// 0.0 ..= 1.0
    pub score: f64,
    pub level: &'static str,
    pub factors: Vec<String>,
    pub risks: Vec<SecurityRisk>,
}

pub fn risk_level(score: f64) -> &'static str {
    if score >= 1.0 {
        "critical"
    } else if score >= 0.7 {
        "high"
    } else if score >= 0.4 {
        "medium"
    } else {
        "low"
    }
}

fn count(scan: Option<&Value>, field: &str) -> u64 {
    scan.and_then(|s| s.get(field))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Scores the security tool context and turns each qualifying risk into a
/// priority-1 recommendation.
pub struct SecurityEnricher;

impl SecurityEnricher {
    pub fn assess(context: &ComprehensiveContext) -> RiskAssessment {
        let scan = context.tool_field("security", "security_scans");
        let critical = count(scan, "critical_issues");
        let high = count(scan, "high_issues");

        // Tenths: 3 per critical finding, 1 per high, 5 per breach anomaly.
        let mut tenths = critical * 3 + high;
        let mut factors = Vec::new();
        let mut risks = Vec::new();

        if critical > 0 {
            factors.push(format!("{critical} critical vulnerabilities"));
            risks.push(SecurityRisk {
                id: format!("vuln-critical-{}", uuid::Uuid::new_v4().simple()),
                title: "Critical Vulnerabilities Detected".into(),
                description: format!("Found {critical} critical security vulnerabilities"),
                severity: "critical".into(),
                mitigations: vec![
                    "Update vulnerable dependencies".into(),
                    "Apply security patches".into(),
                    "Review security configuration".into(),
                ],
            });
        }
        if high > 0 {
            factors.push(format!("{high} high severity issues"));
            risks.push(SecurityRisk {
                id: format!("vuln-high-{}", uuid::Uuid::new_v4().simple()),
                title: "High Severity Issues Found".into(),
                description: format!("Found {high} high severity security issues"),
                severity: "high".into(),
                mitigations: vec![
                    "Review security findings".into(),
                    "Implement security best practices".into(),
                    "Enable security monitoring".into(),
                ],
            });
        }

        if let Some(insights) = &context.analysis_insights {
            for anomaly in insights.anomalies.iter().filter(|a| {
                a.anomaly_type == "security_breach" || a.anomaly_type == "unauthorized_access"
            }) {
                tenths += 5;
                factors.push(anomaly.description.clone());
            }
        }

        let score = (tenths as f64 / 10.0).min(1.0);
        RiskAssessment {
            score,
            level: risk_level(score),
            factors,
            risks,
        }
    }
}

#[async_trait]
impl ContextEnricher for SecurityEnricher {
    fn name(&self) -> &str {
        "security_enricher"
    }

    async fn enrich(
        &self,
        context: &mut ComprehensiveContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        ensure_live(cancel, "security enrichment")?;
        let assessment = Self::assess(context);
        let now = Utc::now();

        for risk in &assessment.risks {
            context.recommendations.push(Recommendation {
                id: format!("sec-{}", risk.id),
                title: format!("Security: {}", risk.title),
                description: risk.description.clone(),
                priority: 1,
                category: "security".into(),
                actions: risk.mitigations.clone(),
                confidence: 0.9,
                created_at: now,
            });
        }

        context
            .metadata
            .insert("security_score".into(), json!(assessment.score));
        context
            .metadata
            .insert("security_level".into(), json!(assessment.level));
        context
            .metadata
            .insert("security_risks".into(), json!(assessment.risks.len()));

        if !assessment.factors.is_empty() {
            tracing::info!(
                session_id = %context.session_id,
                score = assessment.score,
                level = assessment.level,
                factors = ?assessment.factors,
                "security risks assessed"
            );
        }
        Ok(())
    }
}
