use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub triggers: TriggersConfig,
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PAYWALL_PROFILE` env var. When set (e.g. `STAGING`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PAYWALL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            triggers: TriggersConfig::from_env_profiled(p),
            evaluation: EvaluationConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  triggers:    dir={}, watch={}",
            self.triggers.dir.display(),
            self.triggers.watch
        );
        tracing::info!(
            "  evaluation:  expression_timeout_ms={}",
            self.evaluation.expression_timeout_ms
        );
    }

    /// Return a view safe for API responses and diagnostics.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "triggers": { "dir": self.triggers.dir, "watch": self.triggers.watch },
            "evaluation": { "expression_timeout_ms": self.evaluation.expression_timeout_ms },
        })
    }
}

// ── Triggers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggersConfig {
    /// Directory scanned for trigger documents.
    pub dir: PathBuf,
    /// Hot-reload trigger documents on change.
    pub watch: bool,
}

impl TriggersConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "TRIGGERS_DIR", "data/triggers")),
            watch: profiled_env_bool(p, "TRIGGERS_WATCH", false),
        }
    }
}

// ── Evaluation ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Per-rule expression timeout; 0 disables it.
    pub expression_timeout_ms: u64,
}

impl EvaluationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            expression_timeout_ms: profiled_env_u64(p, "EXPRESSION_TIMEOUT_MS", 250),
        }
    }

    pub fn expression_timeout(&self) -> Option<Duration> {
        if self.expression_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.expression_timeout_ms))
        }
    }
}
