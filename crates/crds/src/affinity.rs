//! Hardware affinity types
//!
//! Affinity terms are label selectors evaluated against `Hardware` labels.
//! Required terms are OR-combined eligibility filters; preferred terms carry
//! a weight used to rank eligible hardware.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label selector in the shape of the Kubernetes `LabelSelector` API type.
///
/// `matchLabels` and `matchExpressions` are AND-combined. An empty selector
/// matches everything.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareLabelSelector {
    /// Exact key/value pairs a label set must contain
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based selector requirement.
///
/// `operator` is one of `In`, `NotIn`, `Exists` or `DoesNotExist`; it is kept
/// as a string so that malformed selectors surface as selector errors at
/// reconcile time rather than as decode failures.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// Relationship between the key and the values
    pub operator: String,

    /// Values for `In` / `NotIn`; must be empty for `Exists` / `DoesNotExist`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareAffinity {
    /// Terms of which at least one must match (OR-combined)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<HardwareAffinityTerm>,

    /// Weighted soft preferences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred: Vec<WeightedHardwareAffinityTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareAffinityTerm {
    /// Selector over hardware labels
    #[serde(default)]
    pub label_selector: HardwareLabelSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedHardwareAffinityTerm {
    /// Score given to hardware matching the term (1-100)
    pub weight: i32,

    /// The preference itself
    pub hardware_affinity_term: HardwareAffinityTerm,
}
