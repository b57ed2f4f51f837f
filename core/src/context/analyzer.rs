use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::aggregator::ContextAggregator;
use super::traits::Analyzer;
use super::types::ComprehensiveContext;
use crate::state::{StateEngine, StateType};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorAnalysis {
    pub possible_causes: Vec<String>,
    pub recommendations: Vec<String>,
    pub additional_context: Map<String, Value>,
}

/// Wraps an `Analyzer` with session awareness: looks up the session's
/// comprehensive context and records each result under `StateType::Global`.
pub struct ContextAwareAnalyzer {
    base: Arc<dyn Analyzer>,
    aggregator: Arc<ContextAggregator>,
    engine: StateEngine,
}

impl ContextAwareAnalyzer {
    pub fn new(
        base: Arc<dyn Analyzer>,
        aggregator: Arc<ContextAggregator>,
        engine: StateEngine,
    ) -> Self {
        Self {
            base,
            aggregator,
            engine,
        }
    }

    /// Without a session this is a plain pass-through.
    pub async fn analyze(
        &self,
        session_id: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return self.base.analyze(prompt, cancel).await;
        };

        let context = match self
            .aggregator
            .get_comprehensive_context(session_id, cancel)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "context unavailable; analyzing without it");
                return self.base.analyze(prompt, cancel).await;
            }
        };

        let result = self.base.analyze(prompt, cancel).await?;
        self.store_result(session_id, prompt, &result, &context).await;
        Ok(result)
    }

    async fn store_result(
        &self,
        session_id: &str,
        prompt: &str,
        result: &str,
        context: &ComprehensiveContext,
    ) {
        let record = json!({
            "session_id": session_id,
            "timestamp": Utc::now(),
            "prompt": prompt,
            "result": result,
            "context_used": context.request_id,
            "metadata": {
                "tool_contexts_count": context.tool_contexts.len(),
                "recommendations": context.recommendations.len(),
                "events_count": context.recent_events.len(),
            },
        });
        let key = format!("analysis_{session_id}_{}", uuid::Uuid::new_v4());
        if let Err(e) = self.engine.set_state(StateType::Global, &key, record).await {
            tracing::error!(session_id, error = %e, "failed to store analysis result");
        }
    }

    pub async fn analyze_error(
        &self,
        session_id: Option<&str>,
        error: &str,
        cancel: &CancellationToken,
    ) -> ErrorAnalysis {
        let mut analysis = ErrorAnalysis {
            possible_causes: vec![error.to_string()],
            ..Default::default()
        };
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return analysis;
        };
        match self
            .aggregator
            .get_comprehensive_context(session_id, cancel)
            .await
        {
            Ok(context) => explain_error(&mut analysis, &context),
            Err(e) => tracing::debug!(session_id, error = %e, "no context for error analysis"),
        }
        analysis
    }
}

fn explain_error(analysis: &mut ErrorAnalysis, context: &ComprehensiveContext) {
    analysis.recommendations.extend(
        context
            .recommendations
            .iter()
            .filter(|r| r.priority <= 2)
            .map(|r| r.description.clone()),
    );

    let Some(insights) = &context.analysis_insights else {
        return;
    };
    for pattern in &insights.patterns {
        if pattern.pattern_type == "repeated_failure" {
            analysis.possible_causes.push(format!(
                "Pattern detected: {} (occurrences: {})",
                pattern.description, pattern.occurrences
            ));
        }
    }
    for issue in insights.predicted_issues.iter().filter(|i| i.probability > 0.7) {
        analysis
            .additional_context
            .insert("predicted_issue".into(), json!(issue.description));
        analysis
            .recommendations
            .push(format!("Prevent predicted issue: {}", issue.description));
    }
}
