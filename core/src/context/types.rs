use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Build,
    Deployment,
    Security,
    Performance,
    State,
    Analysis,
    All,
}

impl ContextType {
    /// Key under which this type lands in `tool_contexts`. Analysis and All
    /// contribute relationships and events only.
    pub fn domain_key(&self) -> Option<&'static str> {
        match self {
            ContextType::Build => Some("build"),
            ContextType::Deployment => Some("deployment"),
            ContextType::Security => Some("security"),
            ContextType::Performance => Some("performance"),
            ContextType::State => Some("state"),
            ContextType::Analysis | ContextType::All => None,
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextType::Build => "build",
            ContextType::Deployment => "deployment",
            ContextType::Security => "security",
            ContextType::Performance => "performance",
            ContextType::State => "state",
            ContextType::Analysis => "analysis",
            ContextType::All => "all",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub session_id: String,
    pub request_id: String,
    pub context_type: ContextType,
    pub include_history: bool,
}

impl ContextRequest {
    pub fn all(session_id: &str, request_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            context_type: ContextType::All,
            include_history: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextProviderCapabilities {
    pub supported_types: Vec<ContextType>,
    pub supports_history: bool,
    pub max_history_days: u32,
    pub real_time_updates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            data: Map::new(),
            severity: String::new(),
            message: String::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: String,
    /// Coarse grouping (reliability, performance, resource, general).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    pub description: String,
    pub confidence: f64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub severity: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedIssue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub title: String,
    pub description: String,
    pub probability: f64,
    pub impact: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigations: Vec<String>,
    pub predicted_at: DateTime<Utc>,
}

/// Mutated in place by enrichers; never replaced once present on a context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInsights {
    pub patterns: Vec<Pattern>,
    pub anomalies: Vec<Anomaly>,
    pub predicted_issues: Vec<PredictedIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub description: String,
    /// 1 = critical .. 4 = low.
    pub priority: u8,
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    pub tool_name: String,
    pub session_id: String,
    pub context_type: ContextType,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub relevance: f64,
    pub confidence: f64,
    pub data: Map<String, Value>,
}

/// One provider's contribution to a comprehensive context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextData {
    pub provider: String,
    pub context_type: ContextType,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
    pub relevance: f64,
    pub confidence: f64,
    #[serde(default)]
    pub relationships: Vec<ContextRelationship>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ContextData {
    pub fn new(
        provider: impl Into<String>,
        context_type: ContextType,
        relevance: f64,
        confidence: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            context_type,
            timestamp: Utc::now(),
            data: Map::new(),
            relevance: relevance.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            relationships: Vec::new(),
            events: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn set_relevance(&mut self, relevance: f64) {
        self.relevance = relevance.clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveContext {
    pub session_id: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_contexts: BTreeMap<String, ToolContext>,
    pub recent_events: Vec<Event>,
    pub relationships: Vec<ContextRelationship>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_insights: Option<AnalysisInsights>,
    pub metadata: Map<String, Value>,
    pub metrics: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComprehensiveContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: now,
            tool_contexts: BTreeMap::new(),
            recent_events: Vec::new(),
            relationships: Vec::new(),
            recommendations: Vec::new(),
            analysis_insights: None,
            metadata: Map::new(),
            metrics: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds a provider contribution in. The first contribution for a domain
    /// wins; relationships and events always append.
    pub fn merge(&mut self, data: ContextData) {
        if let Some(key) = data.context_type.domain_key() {
            if !self.tool_contexts.contains_key(key) {
                self.tool_contexts.insert(
                    key.to_string(),
                    ToolContext {
                        tool_name: key.to_string(),
                        session_id: self.session_id.clone(),
                        context_type: data.context_type,
                        status: "active".to_string(),
                        timestamp: data.timestamp,
                        relevance: data.relevance,
                        confidence: data.confidence,
                        data: data.data,
                    },
                );
            } else {
                tracing::debug!(
                    domain = key,
                    provider = %data.provider,
                    "domain already populated; keeping first contribution"
                );
            }
        }
        self.relationships.extend(data.relationships);
        self.recent_events.extend(data.events);
    }

    /// `data[field]` of a domain's tool context.
    pub fn tool_field(&self, domain: &str, field: &str) -> Option<&Value> {
        self.tool_contexts.get(domain)?.data.get(field)
    }

    pub fn insights_mut(&mut self) -> &mut AnalysisInsights {
        self.analysis_insights.get_or_insert_with(AnalysisInsights::default)
    }
}

/// Failures swallowed by a best-effort loop, kept for inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextDiagnostics {
    pub session_id: String,
    pub failures: Vec<(String, String)>,
}

impl ContextDiagnostics {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, name: &str, error: &anyhow::Error) {
        self.failures.push((name.to_string(), format!("{error:#}")));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_first_write_wins_per_domain() {
        let mut ctx = ComprehensiveContext::new("s1");

        let mut first = ContextData::new("build-a", ContextType::Build, 0.8, 0.9);
        first.data.insert("origin".into(), json!("a"));
        first.relationships.push(ContextRelationship {
            source: "x".into(),
            target: "y".into(),
            relation_type: "link".into(),
            strength: 0.5,
            description: String::new(),
        });
        let mut second = ContextData::new("build-b", ContextType::Build, 0.1, 0.1);
        second.data.insert("origin".into(), json!("b"));
        second.events.push(Event::new("docker_build", "build-b"));

        ctx.merge(first);
        ctx.merge(second);

        assert_eq!(ctx.tool_field("build", "origin"), Some(&json!("a")));
        assert_eq!(ctx.relationships.len(), 1);
        assert_eq!(ctx.recent_events.len(), 1);
    }

    #[test]
    fn analysis_contributions_do_not_create_domains() {
        let mut ctx = ComprehensiveContext::new("s1");
        ctx.merge(ContextData::new("kb", ContextType::Analysis, 0.5, 0.5));
        assert!(ctx.tool_contexts.is_empty());
    }

    #[test]
    fn scores_are_clamped() {
        let data = ContextData::new("p", ContextType::State, 1.7, -0.2);
        assert_eq!(data.relevance, 1.0);
        assert_eq!(data.confidence, 0.0);
    }
}
