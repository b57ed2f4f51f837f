mod common;

use std::time::Duration;

use ckstate_core::api::{AnalysisInsights, ComprehensiveContext, ContextEnricher, Pattern, StateType};
use ckstate_plugins::enrichers::{InsightEnricher, SecurityEnricher};
use ckstate_plugins::factory::build_stack;
use common::{quiet_config, stack_with_session};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn full_pipeline_for_built_but_undeployed_session() {
    let stack = stack_with_session("s1").await;
    stack
        .engine
        .set_state(
            StateType::Tool,
            "docker_build",
            json!({"tool_name": "docker_build", "success": true}),
        )
        .await
        .unwrap();

    let ctx = stack
        .aggregator
        .get_comprehensive_context("s1", &CancellationToken::new())
        .await
        .unwrap();

    let domains: Vec<&str> = ctx.tool_contexts.keys().map(String::as_str).collect();
    assert_eq!(
        domains,
        vec!["build", "deployment", "performance", "security", "state"]
    );
    assert_eq!(ctx.tool_contexts["security"].relevance, 1.0);
    assert_eq!(ctx.tool_contexts["performance"].relevance, 0.95);
    assert_eq!(
        ctx.tool_field("build", "recent_builds").map(|b| b.as_array().map(Vec::len)),
        Some(Some(1))
    );

    assert_eq!(ctx.metadata["security_score"], json!(0.7));
    assert_eq!(ctx.metadata["security_level"], json!("high"));
    assert_eq!(ctx.metadata["security_risks"], json!(2));
    assert_eq!(
        ctx.metadata["cross_tool_insights"][0]["type"],
        json!("build_deploy_gap")
    );

    let categories: Vec<&str> = ctx
        .recommendations
        .iter()
        .map(|r| r.category.as_str())
        .collect();
    assert_eq!(categories, vec!["prediction", "security", "security"]);
    assert_eq!(ctx.recommendations[0].priority, 1);
    assert!(stack.aggregator.last_diagnostics("s1").await.is_empty());

    let tools = stack
        .integration
        .tool_recommendations("s1", &CancellationToken::new())
        .await
        .unwrap();
    assert!(tools.iter().any(|t| t.tool == "k8s_deploy"));
}

#[tokio::test]
async fn unknown_session_degrades_to_state_only() {
    let stack = stack_with_session("s1").await;
    let ctx = stack
        .aggregator
        .get_comprehensive_context("ghost", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ctx.tool_contexts.len(), 1);
    assert!(ctx.tool_contexts.contains_key("state"));
    let diagnostics = stack.aggregator.last_diagnostics("ghost").await;
    assert_eq!(diagnostics.len(), 4);
}

#[tokio::test]
async fn security_score_boundary() {
    let stack = stack_with_session("s1").await;
    let ctx = stack
        .aggregator
        .get_comprehensive_context("s1", &CancellationToken::new())
        .await
        .unwrap();

    let assessment = SecurityEnricher::assess(&ctx);
    assert_eq!(assessment.score, 0.7);
    assert_eq!(assessment.level, "high");
    assert_eq!(assessment.risks.len(), 2);
}

#[tokio::test]
async fn existing_insights_are_refined_not_replaced() {
    let mut ctx = ComprehensiveContext::new("s");
    ctx.analysis_insights = Some(AnalysisInsights {
        patterns: vec![Pattern {
            id: "p1".into(),
            pattern_type: "repeated_failure".into(),
            category: String::new(),
            description: "Repeated build failures".into(),
            confidence: 0.5,
            occurrences: 11,
        }],
        ..Default::default()
    });

    InsightEnricher
        .enrich(&mut ctx, &CancellationToken::new())
        .await
        .unwrap();

    let pattern = &ctx.analysis_insights.as_ref().unwrap().patterns[0];
    assert_eq!(pattern.id, "p1");
    assert_eq!(pattern.confidence, 0.6);
    assert_eq!(pattern.category, "reliability_issue");
    assert!(ctx.recommendations.is_empty());
}

#[tokio::test]
async fn cancelled_build_is_not_cached() {
    let stack = stack_with_session("s1").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(stack
        .aggregator
        .get_comprehensive_context("s1", &cancel)
        .await
        .is_err());
    assert_eq!(stack.aggregator.cache_len().await, 0);
}

#[tokio::test]
async fn building_context_does_not_refresh_session_recency() {
    let mut cfg = quiet_config();
    cfg.session.max_sessions = 2;
    let stack = build_stack(&cfg);
    let pause = || tokio::time::sleep(Duration::from_millis(5));

    stack.sessions.get_or_create("a").await.unwrap();
    pause().await;
    stack.sessions.get_or_create("b").await.unwrap();
    pause().await;
    stack
        .aggregator
        .get_comprehensive_context("a", &CancellationToken::new())
        .await
        .unwrap();
    pause().await;
    stack.sessions.get_or_create("c").await.unwrap();

    assert!(stack.sessions.peek("a").await.is_none());
    assert!(stack.sessions.peek("b").await.is_some());
    stack.shutdown().await;
}
