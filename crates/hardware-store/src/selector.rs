//! Label selector compilation and matching
//!
//! Turns the API-level [`HardwareLabelSelector`] into a validated
//! [`Selector`] that can both be evaluated against a label map (affinity
//! scoring, the mock store) and rendered to the Kubernetes label-selector
//! query syntax (`key=value,key in (a,b),!key`).
//!
//! Validation follows the Kubernetes rules for qualified label keys and
//! label values. A malformed selector is an error, never "match everything".

use crds::{HardwareLabelSelector, LabelSelectorRequirement};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("label name pattern is valid")
});

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS subdomain pattern is valid")
});

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Errors produced while compiling a label selector
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },

    #[error("invalid operator {operator:?} for key {key:?}")]
    InvalidOperator { key: String, operator: String },

    #[error("operator {operator} for key {key:?} requires at least one value")]
    MissingValues { key: String, operator: Operator },

    #[error("operator {operator} for key {key:?} does not take values")]
    UnexpectedValues { key: String, operator: Operator },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    fn parse(key: &str, operator: &str) -> Result<Self, SelectorError> {
        match operator {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            other => Err(SelectorError::InvalidOperator {
                key: key.to_string(),
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "=",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        };
        f.write_str(s)
    }
}

/// One validated requirement; values are kept sorted and deduplicated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// Builds and validates a requirement
    pub fn new(key: &str, operator: Operator, values: &[String]) -> Result<Self, SelectorError> {
        validate_key(key)?;

        match operator {
            Operator::Equals | Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(SelectorError::MissingValues { key: key.to_string(), operator });
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(SelectorError::UnexpectedValues { key: key.to_string(), operator });
                }
            }
        }

        for value in values {
            validate_value(key, value)?;
        }

        let mut values = values.to_vec();
        values.sort();
        values.dedup();

        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    /// Requirement that `key` is absent
    pub fn does_not_exist(key: &str) -> Result<Self, SelectorError> {
        Self::new(key, Operator::DoesNotExist, &[])
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.values.join(",")),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// AND-combination of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector matching every label set
    pub fn everything() -> Self {
        Self::default()
    }

    /// Compiles an API label selector
    pub fn from_label_selector(selector: &HardwareLabelSelector) -> Result<Self, SelectorError> {
        let mut compiled = Self::default();

        for (key, value) in &selector.match_labels {
            compiled.push(Requirement::new(key, Operator::Equals, std::slice::from_ref(value))?);
        }

        for expression in &selector.match_expressions {
            compiled.push(compile_expression(expression)?);
        }

        Ok(compiled)
    }

    /// Selector requiring every given label to be present with the given value
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut compiled = Self::default();
        for (key, value) in labels {
            compiled.push(Requirement::new(key, Operator::Equals, &[value.to_string()])?);
        }
        Ok(compiled)
    }

    /// Adds a requirement, keeping requirements ordered by key
    pub fn push(&mut self, requirement: Requirement) {
        let pos = self
            .requirements
            .partition_point(|r| r.key <= requirement.key);
        self.requirements.insert(pos, requirement);
    }

    #[must_use]
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.push(requirement);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether the label set satisfies every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

fn compile_expression(expression: &LabelSelectorRequirement) -> Result<Requirement, SelectorError> {
    let operator = Operator::parse(&expression.key, &expression.operator)?;
    Requirement::new(&expression.key, operator, &expression.values)
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: &str| SelectorError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !DNS_SUBDOMAIN.is_match(prefix) {
            return Err(invalid("prefix must be a DNS subdomain of at most 253 characters"));
        }
    }

    if name.is_empty() || name.len() > MAX_NAME_LEN || !LABEL_NAME.is_match(name) {
        return Err(invalid(
            "name must be 1-63 alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric",
        ));
    }

    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }

    if value.len() > MAX_NAME_LEN || !LABEL_NAME.is_match(value) {
        return Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be at most 63 alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn expr(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = Selector::from_label_selector(&HardwareLabelSelector::default()).unwrap();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("rack", "a")])));
        assert_eq!(selector.to_string(), "");
    }

    #[test]
    fn test_match_labels_and_expressions_are_anded() {
        let api = HardwareLabelSelector {
            match_labels: [("rack".to_string(), "a".to_string())].into(),
            match_expressions: vec![expr("type", "In", &["cp", "worker"])],
        };
        let selector = Selector::from_label_selector(&api).unwrap();

        assert!(selector.matches(&labels(&[("rack", "a"), ("type", "cp")])));
        assert!(!selector.matches(&labels(&[("rack", "a"), ("type", "storage")])));
        assert!(!selector.matches(&labels(&[("rack", "b"), ("type", "cp")])));
        assert!(!selector.matches(&labels(&[("type", "worker")])));
    }

    #[test]
    fn test_not_in_matches_absent_key() {
        let api = HardwareLabelSelector {
            match_expressions: vec![expr("zone", "NotIn", &["east"])],
            ..Default::default()
        };
        let selector = Selector::from_label_selector(&api).unwrap();

        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("zone", "west")])));
        assert!(!selector.matches(&labels(&[("zone", "east")])));
    }

    #[test]
    fn test_exists_and_does_not_exist() {
        let selector = Selector::everything()
            .with(Requirement::new("gpu", Operator::Exists, &[]).unwrap())
            .with(Requirement::does_not_exist("v1alpha1.tinkerbell.org/ownerName").unwrap());

        assert!(selector.matches(&labels(&[("gpu", "")])));
        assert!(!selector.matches(&labels(&[])));
        assert!(!selector.matches(&labels(&[("gpu", "a100"), ("v1alpha1.tinkerbell.org/ownerName", "m1")])));
    }

    #[test]
    fn test_render_query_string_sorted_by_key() {
        let api = HardwareLabelSelector {
            match_labels: [("rack".to_string(), "a".to_string())].into(),
            match_expressions: vec![
                expr("zone", "NotIn", &["west", "east"]),
                expr("arch", "In", &["arm64"]),
                expr("gpu", "Exists", &[]),
            ],
        };
        let selector = Selector::from_label_selector(&api)
            .unwrap()
            .with(Requirement::does_not_exist("owner").unwrap());

        assert_eq!(
            selector.to_string(),
            "arch in (arm64),gpu,!owner,rack=a,zone notin (east,west)"
        );
    }

    #[test]
    fn test_rejects_unknown_operator() {
        let api = HardwareLabelSelector {
            match_expressions: vec![expr("rack", "Like", &["a"])],
            ..Default::default()
        };
        let err = Selector::from_label_selector(&api).unwrap_err();
        assert!(matches!(err, SelectorError::InvalidOperator { ref operator, .. } if operator == "Like"));
    }

    #[test]
    fn test_rejects_value_count_mismatch() {
        let missing = HardwareLabelSelector {
            match_expressions: vec![expr("rack", "In", &[])],
            ..Default::default()
        };
        assert!(matches!(
            Selector::from_label_selector(&missing),
            Err(SelectorError::MissingValues { .. })
        ));

        let unexpected = HardwareLabelSelector {
            match_expressions: vec![expr("rack", "Exists", &["a"])],
            ..Default::default()
        };
        assert!(matches!(
            Selector::from_label_selector(&unexpected),
            Err(SelectorError::UnexpectedValues { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_keys_and_values() {
        for key in ["", "-rack", "rack-", "Bad_Prefix/rack", "/rack", "a/b/c"] {
            let api = HardwareLabelSelector {
                match_expressions: vec![expr(key, "Exists", &[])],
                ..Default::default()
            };
            assert!(
                matches!(Selector::from_label_selector(&api), Err(SelectorError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }

        let api = HardwareLabelSelector {
            match_labels: [("rack".to_string(), "has space".to_string())].into(),
            ..Default::default()
        };
        assert!(matches!(
            Selector::from_label_selector(&api),
            Err(SelectorError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_accepts_prefixed_keys_and_empty_values() {
        let api = HardwareLabelSelector {
            match_labels: [("tinkerbell.org/role".to_string(), String::new())].into(),
            ..Default::default()
        };
        let selector = Selector::from_label_selector(&api).unwrap();
        assert!(selector.matches(&labels(&[("tinkerbell.org/role", "")])));
    }
}
