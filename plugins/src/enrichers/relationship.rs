use std::collections::BTreeSet;

use async_trait::async_trait;
use ckstate_core::api::{ComprehensiveContext, ContextEnricher, ContextRelationship, ContextType};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::providers::ensure_live;

const TEMPORAL_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Links consecutive events that happened close together, and the build
/// context to a later deployment context.
pub struct RelationshipEnricher;

impl RelationshipEnricher {
    fn temporal(context: &ComprehensiveContext) -> Vec<ContextRelationship> {
        context
            .recent_events
            .windows(2)
            .filter_map(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                let gap_ms = (b.timestamp - a.timestamp).num_milliseconds();
                if !(0..TEMPORAL_WINDOW_MS).contains(&gap_ms) {
                    return None;
                }
                Some(ContextRelationship {
                    source: a.id.clone(),
                    target: b.id.clone(),
                    relation_type: "temporal_sequence".into(),
                    strength: 1.0 - gap_ms as f64 / TEMPORAL_WINDOW_MS as f64,
                    description: format!("{} followed by {}", a.event_type, b.event_type),
                })
            })
            .collect()
    }

    fn causal(context: &ComprehensiveContext) -> Option<ContextRelationship> {
        let build = context
            .tool_contexts
            .get("build")
            .filter(|c| c.context_type == ContextType::Build)?;
        let deployment = context.tool_contexts.get("deployment")?;
        (deployment.timestamp > build.timestamp).then(|| ContextRelationship {
            source: "build".into(),
            target: "deployment".into(),
            relation_type: "causal".into(),
            strength: 0.9,
            description: "Build triggers deployment".into(),
        })
    }
}

#[async_trait]
impl ContextEnricher for RelationshipEnricher {
    fn name(&self) -> &str {
        "relationship_enricher"
    }

    async fn enrich(
        &self,
        context: &mut ComprehensiveContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        ensure_live(cancel, "relationship enrichment")?;

        context.recent_events.sort_by_key(|e| e.timestamp);
        let temporal = Self::temporal(context);
        context.relationships.extend(temporal);
        if let Some(causal) = Self::causal(context) {
            context.relationships.push(causal);
        }

        let types: BTreeSet<&str> = context
            .relationships
            .iter()
            .map(|r| r.relation_type.as_str())
            .collect();
        let types = json!(types);
        context
            .metadata
            .insert("relationship_count".into(), json!(context.relationships.len()));
        context.metadata.insert("relationship_types".into(), types);

        tracing::debug!(
            session_id = %context.session_id,
            count = context.relationships.len(),
            "relationships added"
        );
        Ok(())
    }
}
