//! Shared boot path: config validation, building AppState, and spawning
//! the background session-sweep task. Used by `serve` and `doctor`.

use std::time::Duration;

use anyhow::Context;
use voice_domain::config::{Config, ConfigSeverity};

use crate::state::AppState;

/// Validate `config`, bailing on hard errors, then build the full
/// [`AppState`] (STT/LLM/TTS/RAG adapters, turn store, session registry).
pub fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state = AppState::build(config).context("building application state")?;
    tracing::info!(
        rag_enabled = state.rag.is_some(),
        "turn controller dependencies ready"
    );

    Ok(state)
}

/// Sweep sessions idle past `session.inactivity_timeout_secs` every 30s
/// (spec §3 Session, §5 heartbeat/timeouts).
pub fn spawn_session_sweeper(state: &AppState) {
    let sessions = state.sessions.clone();
    let timeout = Duration::from_secs(state.config.session.inactivity_timeout_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let expired = sessions.sweep_expired(timeout);
            if !expired.is_empty() {
                tracing::info!(count = expired.len(), "swept expired sessions");
            }
        }
    });
}

