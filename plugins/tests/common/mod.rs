#![allow(dead_code)]

use chrono::Utc;
use ckstate_core::api::{
    AppConfig, DockerfileState, SecurityScanResult, SessionState, VulnerabilitySummary,
};
use ckstate_plugins::factory::{build_stack, Stack};

pub fn quiet_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.logging.enabled = false;
    cfg.observers.logging = false;
    cfg
}

pub fn scan(critical: u32, high: u32) -> SecurityScanResult {
    SecurityScanResult {
        success: true,
        scanner: "trivy".into(),
        scanned_at: Utc::now(),
        summary: VulnerabilitySummary {
            critical,
            high,
            medium: 0,
            low: 0,
            total: critical + high,
        },
        fixable: critical,
    }
}

/// Built image, a 2-critical/1-high scan and 90% disk usage; nothing deployed.
pub fn built_not_deployed(state: &mut SessionState) {
    state.dockerfile = DockerfileState {
        path: "Dockerfile".into(),
        content: "FROM rust:1-slim".into(),
        built: true,
    };
    state.image_ref = "registry.local/app:1".into();
    state.security_scan = Some(scan(2, 1));
    state.disk_usage = 90;
    state.max_disk_usage = 100;
}

pub async fn stack_with_session(session_id: &str) -> Stack {
    let stack = build_stack(&quiet_config());
    stack.sessions.get_or_create(session_id).await.unwrap();
    stack
        .sessions
        .update(session_id, built_not_deployed)
        .await
        .unwrap();
    stack
}
