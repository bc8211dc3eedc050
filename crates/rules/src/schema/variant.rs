//! Experiment variants: authored options, assigned variants, resolved experiments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arm type of an experiment variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    /// Suppress the paywall for this user.
    Holdout,
    /// Show the variant's paywall.
    Treatment,
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantType::Holdout => write!(f, "HOLDOUT"),
            VariantType::Treatment => write!(f, "TREATMENT"),
        }
    }
}

/// A candidate variant as authored on a trigger rule.
///
/// The percentage is the authored traffic split; it is used when the
/// assignment is created upstream and plays no part in resolution here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantOption {
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    pub id: String,
    pub percentage: u8,
    #[serde(default)]
    pub paywall_id: Option<String>,
}

impl VariantOption {
    /// Strip the authoring-only fields, leaving the assignable variant.
    pub fn to_variant(&self) -> Variant {
        Variant {
            id: self.id.clone(),
            variant_type: self.variant_type,
            paywall_id: self.paywall_id.clone(),
        }
    }
}

/// A variant as stored in confirmed and unconfirmed assignment maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    #[serde(default)]
    pub paywall_id: Option<String>,
}

impl Variant {
    pub fn holdout(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            variant_type: VariantType::Holdout,
            paywall_id: None,
        }
    }

    pub fn treatment(id: impl Into<String>, paywall_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            variant_type: VariantType::Treatment,
            paywall_id,
        }
    }
}

/// An experiment paired with the one variant this identity is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub group_id: String,
    pub variant: Variant,
}

/// The experiment a rule points at, before any variant is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExperiment {
    pub id: String,
    pub group_id: String,
    pub variants: Vec<VariantOption>,
}
