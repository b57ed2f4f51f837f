use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use ckstate_core::api::{
    CliError, DockerfileState, SecurityScanResult, SessionState, StateType, VulnerabilitySummary,
};
use ckstate_plugins::factory::Stack;
use ckstate_plugins::providers::PerformanceMetrics;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::cli::{OutputFormat, SimulateArgs};

const QUOTA_BYTES: i64 = 10 * 1024 * 1024 * 1024;

/// Runs build, scan and (optionally) deploy against `stack` and returns the
/// document that `ckstate simulate` prints.
pub async fn simulate(
    stack: &Stack,
    args: &SimulateArgs,
    cancel: &CancellationToken,
) -> Result<Value, CliError> {
    let sid = args.session_id.as_str();
    stack.sessions.get_or_create(sid).await?;

    let build = stack.sessions.track_tool_execution(sid, "docker_build").await?;
    let built = !args.fail_build;
    stack
        .sessions
        .update(sid, |s| apply_build(s, args, built))
        .await?;
    let build_error = (!built).then(|| "docker build exited with status 1".to_string());
    stack
        .sessions
        .complete_tool_execution(sid, &build, built, build_error)
        .await?;

    let mut tx = stack.engine.create_state_transaction(cancel.clone());
    tx.set(
        StateType::Tool,
        "docker_build",
        json!({
            "tool_name": "docker_build",
            "session_id": sid,
            "success": built,
            "image_ref": args.image,
        }),
    );

    if args.deploy && built {
        let deploy = stack.sessions.track_tool_execution(sid, "k8s_deploy").await?;
        let image = args.image.clone();
        stack
            .sessions
            .update(sid, move |s| {
                s.k8s_manifests
                    .insert("deployment.yaml".to_string(), deployment_manifest(&image));
                s.current_stage = "deploying".to_string();
            })
            .await?;
        stack
            .sessions
            .complete_tool_execution(sid, &deploy, true, None)
            .await?;
        tx.set(
            StateType::Tool,
            "k8s_deploy",
            json!({
                "tool_name": "k8s_deploy",
                "session_id": sid,
                "success": true,
                "namespace": "default",
            }),
        );
    }

    let snapshot = serde_json::to_value(stack.sessions.get(sid).await?)?;
    tx.set(StateType::Session, sid, snapshot);
    tx.commit().await?;

    if let Some(metrics) = sampled_metrics(args) {
        stack.performance.record_metrics(sid, metrics).await;
    }
    stack.engine.flush_observers().await;

    let context = stack
        .aggregator
        .get_comprehensive_context(sid, cancel)
        .await?;
    let diagnostics = stack.aggregator.last_diagnostics(sid).await;
    if !diagnostics.is_empty() {
        tracing::warn!(
            session_id = sid,
            failures = diagnostics.len(),
            "context assembled with failures"
        );
    }

    let out = match args.output {
        OutputFormat::Context => serde_json::to_value(&*context)?,
        OutputFormat::Summary => {
            let summary = stack.integration.context_summary(sid, cancel).await?;
            let tools = stack.integration.tool_recommendations(sid, cancel).await?;
            json!({ "summary": summary, "tool_recommendations": tools })
        }
    };
    Ok(out)
}

fn apply_build(state: &mut SessionState, args: &SimulateArgs, built: bool) {
    state.dockerfile = DockerfileState {
        path: "Dockerfile".to_string(),
        content: "FROM debian:stable-slim\nCOPY app /usr/local/bin/app\n".to_string(),
        built,
    };
    if built {
        state.image_ref = args.image.clone();
    }
    state.current_stage = "building".to_string();
    state.max_disk_usage = QUOTA_BYTES;
    state.disk_usage = (QUOTA_BYTES as f64 * args.disk_ratio.clamp(0.0, 1.0)) as i64;

    let total = args.critical + args.high;
    if built && total > 0 {
        state.security_scan = Some(SecurityScanResult {
            success: true,
            scanner: "trivy".to_string(),
            scanned_at: Utc::now(),
            summary: VulnerabilitySummary {
                critical: args.critical,
                high: args.high,
                medium: 0,
                low: 0,
                total,
            },
            fixable: args.critical,
        });
    }
}

fn deployment_manifest(image: &str) -> String {
    format!(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\nspec:\n  template:\n    spec:\n      containers:\n        - name: app\n          image: {image}\n"
    )
}

fn sampled_metrics(args: &SimulateArgs) -> Option<PerformanceMetrics> {
    if args.cpu.is_none() && args.memory.is_none() && args.error_rate.is_none() {
        return None;
    }
    Some(PerformanceMetrics {
        cpu: args.cpu.unwrap_or_default(),
        memory: args.memory.unwrap_or_default(),
        disk: args.disk_ratio * 100.0,
        network: 0.0,
        latency: Duration::from_millis(120),
        throughput: 0.0,
        error_rate: args.error_rate.unwrap_or_default(),
        last_updated: Utc::now(),
    })
}

/// Tool runs recorded so far, keyed by tool name; used by the summary line.
pub fn tool_outcomes(state: &SessionState) -> BTreeMap<String, Option<bool>> {
    state
        .tool_executions
        .iter()
        .map(|e| (e.tool.clone(), e.success))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckstate_core::api::AppConfig;
    use ckstate_plugins::factory::build_stack;

    fn args() -> SimulateArgs {
        SimulateArgs {
            session_id: "t1".to_string(),
            image: "registry.local/t1:1".to_string(),
            critical: 0,
            high: 0,
            deploy: false,
            fail_build: false,
            disk_ratio: 0.4,
            cpu: None,
            memory: None,
            error_rate: None,
            output: OutputFormat::Context,
        }
    }

    fn quiet() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.logging.enabled = false;
        cfg.observers.logging = false;
        cfg
    }

    #[tokio::test]
    async fn build_only_run_reports_gap() {
        let stack = build_stack(&quiet());
        let out = simulate(&stack, &args(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out["session_id"], json!("t1"));
        assert_eq!(
            out["metadata"]["cross_tool_insights"][0]["type"],
            json!("build_deploy_gap")
        );
        let state = stack.sessions.get("t1").await.unwrap();
        assert_eq!(
            tool_outcomes(&state).get("docker_build"),
            Some(&Some(true))
        );
        stack.shutdown().await;
    }

    #[tokio::test]
    async fn deploy_and_findings_show_up() {
        let stack = build_stack(&quiet());
        let mut a = args();
        a.deploy = true;
        a.critical = 1;
        let out = simulate(&stack, &a, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out["tool_contexts"]["deployment"].is_object());
        assert_eq!(out["tool_contexts"]["security"]["relevance"], json!(1.0));
        assert!(out["metadata"].get("cross_tool_insights").is_none());
        assert!(stack
            .engine
            .get_state(StateType::Tool, "k8s_deploy")
            .await
            .is_ok());
        stack.shutdown().await;
    }

    #[tokio::test]
    async fn failed_build_is_recorded() {
        let stack = build_stack(&quiet());
        let mut a = args();
        a.fail_build = true;
        a.output = OutputFormat::Summary;
        let out = simulate(&stack, &a, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out["summary"]["overall_health"].is_number());
        let state = stack.sessions.get("t1").await.unwrap();
        assert_eq!(state.errors.len(), 1);
        assert_eq!(
            tool_outcomes(&state).get("docker_build"),
            Some(&Some(false))
        );
        stack.shutdown().await;
    }
}
