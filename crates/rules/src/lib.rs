//! Paywall trigger rule engine.
//!
//! This crate provides:
//! - YAML/JSON trigger documents with serde deserialization
//! - Filesystem loader with hot-reload via `notify` watcher
//! - Ordered first-match-wins rule matching with frequency caps
//! - A native targeting-expression language behind a pluggable evaluator trait
//! - Experiment assignment resolution (confirmed, then unconfirmed)
//! - The [`logic::RuleLogic`] facade that turns an event into a `TriggerResult`

pub mod assignment;
pub mod expression;
pub mod loader;
pub mod logic;
pub mod matcher;
pub mod occurrence;
pub mod schema;
