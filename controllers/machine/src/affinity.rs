//! Hardware affinity matching.
//!
//! Pure evaluation of affinity terms against hardware labels: building the
//! candidate queries for required terms, scoring candidates against
//! preferred terms, and ranking them. No I/O happens here.

use crate::error::ControllerError;
use crds::{HARDWARE_OWNER_NAME_LABEL, Hardware, HardwareAffinity, HardwareLabelSelector, WeightedHardwareAffinityTerm};
use hardware_store::selector::Requirement;
use hardware_store::Selector;
use std::collections::BTreeMap;

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

/// A candidate and the weight of the preferred term it matched
#[derive(Debug, Clone)]
pub struct ScoredHardware {
    pub hardware: Hardware,
    pub score: i32,
}

/// A compiled preferred term
#[derive(Debug, Clone)]
pub struct Preference {
    selector: Selector,
    weight: i32,
}

/// Labels of a hardware object, empty when unset
pub fn hardware_labels(hardware: &Hardware) -> &BTreeMap<String, String> {
    hardware.metadata.labels.as_ref().unwrap_or(&NO_LABELS)
}

/// Compiles an API label selector, keeping the offending selector in the error
pub fn compile(selector: &HardwareLabelSelector) -> Result<Selector, ControllerError> {
    Selector::from_label_selector(selector).map_err(|source| ControllerError::Selector {
        selector: serde_json::to_string(selector).unwrap_or_else(|_| format!("{selector:?}")),
        source,
    })
}

/// Selectors for gathering candidates, one per required term.
///
/// Each selector is the term's own constraint plus "owner label absent". A
/// machine without required terms gets a single unconstrained term, so the
/// result always selects from unclaimed hardware only.
pub fn candidate_selectors(affinity: Option<&HardwareAffinity>) -> Result<Vec<Selector>, ControllerError> {
    let unclaimed = Requirement::does_not_exist(HARDWARE_OWNER_NAME_LABEL).map_err(|source| {
        ControllerError::Selector {
            selector: format!("!{HARDWARE_OWNER_NAME_LABEL}"),
            source,
        }
    })?;

    let required = affinity.map(|a| a.required.as_slice()).unwrap_or_default();
    if required.is_empty() {
        return Ok(vec![Selector::everything().with(unclaimed)]);
    }

    required
        .iter()
        .map(|term| -> Result<Selector, ControllerError> { Ok(compile(&term.label_selector)?.with(unclaimed.clone())) })
        .collect()
}

/// Compiles every preferred term up front so a malformed one fails the allocation
pub fn compile_preferences(preferred: &[WeightedHardwareAffinityTerm]) -> Result<Vec<Preference>, ControllerError> {
    preferred
        .iter()
        .map(|term| -> Result<Preference, ControllerError> {
            Ok(Preference {
                selector: compile(&term.hardware_affinity_term.label_selector)?,
                weight: term.weight,
            })
        })
        .collect()
}

/// Score of one candidate: the weight of the *last* matching preferred term,
/// or 0 when none match. Weights are not summed.
pub fn score(hardware: &Hardware, preferences: &[Preference]) -> i32 {
    let labels = hardware_labels(hardware);
    preferences
        .iter()
        .rev()
        .find(|p| p.selector.matches(labels))
        .map_or(0, |p| p.weight)
}

/// Scores candidates and orders them best first.
///
/// Ties on score are broken by namespace, then name, so the pick is stable
/// for an unchanged candidate set.
pub fn rank(candidates: Vec<Hardware>, preferences: &[Preference]) -> Vec<ScoredHardware> {
    let mut scored: Vec<ScoredHardware> = candidates
        .into_iter()
        .map(|hardware| ScoredHardware {
            score: score(&hardware, preferences),
            hardware,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.hardware.metadata.namespace.cmp(&b.hardware.metadata.namespace))
            .then_with(|| a.hardware.metadata.name.cmp(&b.hardware.metadata.name))
    });

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::{HardwareAffinityTerm, LabelSelectorRequirement};

    fn names(ranked: &[ScoredHardware]) -> Vec<&str> {
        ranked
            .iter()
            .map(|s| s.hardware.metadata.name.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_last_matching_preference_wins() {
        let hw = create_test_hardware("hw-a", &[("rack", "a"), ("gpu", "yes")]);
        let t1 = preferred(1, &[("rack", "a")]);
        let t2 = preferred(10, &[("gpu", "yes")]);

        let forward = compile_preferences(&[t1.clone(), t2.clone()]).unwrap();
        assert_eq!(score(&hw, &forward), 10);

        let reversed = compile_preferences(&[t2, t1]).unwrap();
        assert_eq!(score(&hw, &reversed), 1);
    }

    #[test]
    fn test_unmatched_hardware_scores_zero() {
        let hw = create_test_hardware("hw-a", &[("rack", "b")]);
        let prefs = compile_preferences(&[preferred(5, &[("rack", "a")])]).unwrap();
        assert_eq!(score(&hw, &prefs), 0);
    }

    #[test]
    fn test_rank_orders_by_score_then_identity() {
        let candidates = vec![
            create_test_hardware("hw-c", &[("rack", "a")]),
            create_test_hardware("hw-b", &[]),
            create_test_hardware("hw-a", &[]),
            create_test_hardware("hw-d", &[("rack", "a")]),
        ];
        let prefs = compile_preferences(&[preferred(5, &[("rack", "a")])]).unwrap();

        let ranked = rank(candidates, &prefs);
        assert_eq!(names(&ranked), vec!["hw-c", "hw-d", "hw-a", "hw-b"]);
        assert_eq!(ranked[0].score, 5);
        assert_eq!(ranked[3].score, 0);
    }

    #[test]
    fn test_equal_scores_pick_lexicographically_smallest_name() {
        let prefs = compile_preferences(&[preferred(5, &[])]).unwrap();
        let a = create_test_hardware("alpha", &[]);
        let b = create_test_hardware("beta", &[]);

        let first = rank(vec![b.clone(), a.clone()], &prefs);
        let second = rank(vec![a, b], &prefs);
        assert_eq!(names(&first)[0], "alpha");
        assert_eq!(names(&second)[0], "alpha");
    }

    #[test]
    fn test_namespace_breaks_ties_before_name() {
        let mut other_ns = create_test_hardware("aaa", &[]);
        other_ns.metadata.namespace = Some("zeta".to_string());
        let default_ns = create_test_hardware("zzz", &[]);

        let ranked = rank(vec![other_ns, default_ns], &[]);
        assert_eq!(names(&ranked), vec!["zzz", "aaa"]);
    }

    #[test]
    fn test_no_required_terms_selects_any_unclaimed() {
        let selectors = candidate_selectors(None).unwrap();
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].to_string(), "!v1alpha1.tinkerbell.org/ownerName");

        let empty = HardwareAffinity::default();
        assert_eq!(candidate_selectors(Some(&empty)).unwrap().len(), 1);
    }

    #[test]
    fn test_each_required_term_excludes_claimed_hardware() {
        let affinity = HardwareAffinity {
            required: vec![term(&[("rack", "a")]), term(&[("rack", "b")])],
            preferred: Vec::new(),
        };
        let selectors = candidate_selectors(Some(&affinity)).unwrap();

        assert_eq!(selectors.len(), 2);
        let claimed = create_claimed_hardware("hw-a", "m1");
        for selector in &selectors {
            assert!(!selector.matches(hardware_labels(&claimed)));
            assert!(selector.to_string().contains("!v1alpha1.tinkerbell.org/ownerName"));
        }
    }

    #[test]
    fn test_malformed_term_is_a_selector_error() {
        let affinity = HardwareAffinity {
            required: vec![HardwareAffinityTerm {
                label_selector: HardwareLabelSelector {
                    match_expressions: vec![LabelSelectorRequirement {
                        key: "rack".to_string(),
                        operator: "Maybe".to_string(),
                        values: Vec::new(),
                    }],
                    ..Default::default()
                },
            }],
            preferred: Vec::new(),
        };

        let err = candidate_selectors(Some(&affinity)).unwrap_err();
        assert!(matches!(err, ControllerError::Selector { ref selector, .. } if selector.contains("Maybe")));
    }
}
