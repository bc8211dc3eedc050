//! rules-eval — evaluate events against a trigger directory.
//!
//! With `--event`, evaluates that single event and prints the outcome as
//! pretty JSON. Without it, reads newline-delimited JSON events
//! (`{"name": "...", "params": {...}}`) from stdin and prints one outcome per
//! line, hot-reloading the trigger directory when watching is enabled.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use paywall_core::config::load_dotenv;
use paywall_core::{Config, EventData};
use paywall_rules::assignment::{Assignments, InMemoryAssignmentStore, UnconfirmedAssignments};
use paywall_rules::expression::{NativeEvaluator, RuleAttributes, StaticAttributes};
use paywall_rules::loader::{LoadStatus, TriggerLoader};
use paywall_rules::logic::{RuleEvaluationOutcome, RuleLogic};
use paywall_rules::occurrence::InMemoryOccurrenceStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Evaluate paywall trigger rules for one event or a stream of events.
#[derive(Parser, Debug)]
#[command(name = "rules-eval", version, about)]
struct Cli {
    /// Directory of trigger documents (overrides TRIGGERS_DIR from config).
    #[arg(long)]
    triggers_dir: Option<PathBuf>,

    /// Event name to evaluate. Reads events from stdin when omitted.
    #[arg(long)]
    event: Option<String>,

    /// Event parameters as a JSON object.
    #[arg(long)]
    params: Option<String>,

    /// JSON file of confirmed assignments (experiment id → variant).
    #[arg(long)]
    confirmed: Option<PathBuf>,

    /// JSON file of unconfirmed assignments (experiment id → variant).
    #[arg(long)]
    unconfirmed: Option<PathBuf>,

    /// User attributes as a JSON object.
    #[arg(long)]
    user: Option<String>,

    /// Device attributes as a JSON object.
    #[arg(long)]
    device: Option<String>,

    /// Apply the confirmable assignment and occurrence after evaluating.
    #[arg(long, env = "RULES_EVAL_COMMIT")]
    commit: bool,

    /// Hot-reload the trigger directory while streaming (overrides TRIGGERS_WATCH).
    #[arg(long)]
    watch: Option<bool>,
}

/// One line of the stdin event stream.
#[derive(Debug, Deserialize)]
struct StreamedEvent {
    name: String,
    #[serde(default)]
    params: Map<String, Value>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_object(raw: Option<&str>, what: &str) -> anyhow::Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => {
            let value = serde_json::from_str::<Value>(raw)
                .with_context(|| format!("invalid {} JSON", what))?;
            match value {
                Value::Object(map) => Ok(map),
                other => anyhow::bail!("{} must be a JSON object, got {}", what, other),
            }
        }
    }
}

fn read_assignments(path: Option<&Path>) -> anyhow::Result<Assignments> {
    match path {
        None => Ok(Assignments::new()),
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse assignments in {}", path.display()))
        }
    }
}

async fn evaluate_and_commit(
    logic: &RuleLogic,
    loader: &TriggerLoader,
    unconfirmed: &UnconfirmedAssignments,
    event: EventData,
    commit: bool,
) -> anyhow::Result<(RuleEvaluationOutcome, Option<Value>)> {
    let outcome = logic
        .evaluate_rules(&event, &loader.snapshot(), &unconfirmed.snapshot())
        .await;

    if !commit {
        return Ok((outcome, None));
    }

    let postback = logic.confirm_assignment(&outcome, unconfirmed).await?;
    let committed = logic.commit_occurrence(&outcome, event.created_at).await?;
    info!(event = %event.name, occurrence_committed = committed, "applied commits");
    Ok((outcome, Some(serde_json::to_value(postback)?)))
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let triggers_dir = cli.triggers_dir.clone().unwrap_or_else(|| config.triggers.dir.clone());
    let mut loader = TriggerLoader::new(triggers_dir);
    let results = loader.load_all()?;
    for result in &results {
        if let LoadStatus::Failed { error } = &result.status {
            warn!(path = %result.path.display(), error = %error, "skipped trigger document");
        }
    }
    info!(
        path = %loader.triggers_dir().display(),
        documents = loader.document_count(),
        triggers = loader.snapshot().len(),
        "triggers loaded"
    );

    let attributes = RuleAttributes {
        user: parse_object(cli.user.as_deref(), "--user")?,
        device: parse_object(cli.device.as_deref(), "--device")?,
    };
    let confirmed = read_assignments(cli.confirmed.as_deref())?;
    let unconfirmed = UnconfirmedAssignments::new(read_assignments(cli.unconfirmed.as_deref())?);

    let mut logic = RuleLogic::new(
        Arc::new(NativeEvaluator::new()),
        Arc::new(StaticAttributes(attributes)),
        Arc::new(InMemoryAssignmentStore::with_assignments(confirmed)),
        Arc::new(InMemoryOccurrenceStore::new()),
    );
    if let Some(timeout) = config.evaluation.expression_timeout() {
        logic = logic.with_expression_timeout(timeout);
    }

    if let Some(name) = cli.event.as_deref() {
        let event = EventData::new(name, parse_object(cli.params.as_deref(), "--params")?);
        let (outcome, postback) =
            evaluate_and_commit(&logic, &loader, &unconfirmed, event, cli.commit).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if let Some(postback) = postback {
            println!("{}", serde_json::to_string_pretty(&postback)?);
        }
        return Ok(());
    }

    if cli.watch.unwrap_or(config.triggers.watch) {
        loader.watch()?;
    }

    info!("reading events from stdin");
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let streamed: StreamedEvent = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "ignoring malformed event line");
                continue;
            }
        };
        let event = EventData::new(streamed.name, streamed.params);
        let (outcome, postback) =
            evaluate_and_commit(&logic, &loader, &unconfirmed, event, cli.commit).await?;
        let line = match postback {
            Some(postback) => serde_json::json!({ "outcome": outcome, "postback": postback }),
            None => serde_json::to_value(&outcome)?,
        };
        println!("{}", line);
    }

    info!("rules-eval exited cleanly");
    Ok(())
}
