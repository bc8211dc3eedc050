//! Configuration schema types with serde deserialization.
//!
//! Defines the type hierarchy for trigger configuration:
//! - `TriggerDocument`: file-level container (apiVersion, kind, metadata, triggers)
//! - `Trigger` / `TriggerRule`: ordered targeting rules per event name
//! - `VariantOption` / `Variant` / `Experiment`: experiment arms before and after resolution
//! - `TriggerRuleOccurrence`: frequency caps
//! - `ConfirmableAssignment` / `Assignment`: confirmation records

mod assignment;
mod document;
mod metadata;
mod occurrence;
mod trigger;
mod variant;

pub use assignment::*;
pub use document::*;
pub use metadata::*;
pub use occurrence::*;
pub use trigger::*;
pub use variant::*;
