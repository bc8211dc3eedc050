//! Targeting-expression evaluation.
//!
//! Expression evaluation is an injected capability: the matcher only depends
//! on the [`ExpressionEvaluator`] trait, so a native interpreter, an embedded
//! script sandbox, or a test double can be swapped in without touching the
//! matching logic. [`NativeEvaluator`] is the built-in implementation.
//!
//! Every expression is evaluated against one JSON context:
//!
//! ```text
//! { "user": {..}, "device": {..}, "params": {..event parameters..} }
//! ```

mod adapter;
mod native;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use paywall_core::EventData;

pub use adapter::ExpressionEvaluatorAdapter;
pub use native::NativeEvaluator;

// ── Evaluator capability ────────────────────────────────────────────

/// Evaluates a boolean targeting expression against a context object.
#[async_trait::async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError>;
}

/// Errors from expression evaluation. Never escape the matcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("expression evaluation failed: {0}")]
    Evaluation(String),

    #[error("expression timed out after {0}ms")]
    Timeout(u64),

    #[error("expression evaluator crashed: {0}")]
    Crashed(String),
}

// ── Rule attributes ─────────────────────────────────────────────────

/// User and device attributes merged into every evaluation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAttributes {
    #[serde(default)]
    pub user: Map<String, Value>,
    #[serde(default)]
    pub device: Map<String, Value>,
}

/// Supplies the current rule attributes (identity, device, locale, ...).
///
/// May wait on identity data becoming available.
#[async_trait::async_trait]
pub trait RuleAttributesProvider: Send + Sync {
    async fn rule_attributes(&self) -> RuleAttributes;
}

/// Provider returning a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticAttributes(pub RuleAttributes);

#[async_trait::async_trait]
impl RuleAttributesProvider for StaticAttributes {
    async fn rule_attributes(&self) -> RuleAttributes {
        self.0.clone()
    }
}

/// Build the evaluation context for one event.
pub fn evaluation_context(attributes: &RuleAttributes, event: &EventData) -> Value {
    serde_json::json!({
        "user": attributes.user,
        "device": attributes.device,
        "params": event.parameters,
    })
}
