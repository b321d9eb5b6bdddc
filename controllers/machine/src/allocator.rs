//! Hardware allocation for TinkerbellMachines.

use crate::affinity::{candidate_selectors, compile_preferences, rank};
use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, machine_key};
use crds::{HARDWARE_OWNER_NAME_LABEL, HARDWARE_OWNER_NAMESPACE_LABEL, Hardware, TinkerbellMachine};
use hardware_store::Selector;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Chooses the hardware a machine should run on.
    ///
    /// Hardware already labelled as owned by the machine is returned as is,
    /// so a machine that claimed hardware in an earlier pass never
    /// re-allocates. Otherwise every unclaimed unit matching at least one
    /// required term is ranked against the preferred terms and the best one
    /// is returned.
    pub async fn allocate_hardware(&self, machine: &TinkerbellMachine) -> Result<Hardware, ControllerError> {
        let mut owned = self.owned_hardware(machine).await?;
        if !owned.is_empty() {
            if owned.len() > 1 {
                warn!(
                    "TinkerbellMachine {} owns {} Hardware objects, using {}",
                    machine_key(machine),
                    owned.len(),
                    owned[0].key()
                );
            }
            let hardware = owned.swap_remove(0);
            debug!("TinkerbellMachine {} already owns Hardware {}", machine_key(machine), hardware.key());
            return Ok(hardware);
        }

        let affinity = machine.spec.hardware_affinity.as_ref();
        let selectors = candidate_selectors(affinity)?;
        let preferences = compile_preferences(affinity.map(|a| a.preferred.as_slice()).unwrap_or_default())?;

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for selector in &selectors {
            let matched = self
                .store
                .list_hardware(selector)
                .await
                .map_err(|e| ControllerError::store(format!("listing Hardware matching {selector}"), e))?;

            for hardware in matched {
                if seen.insert(hardware.key()) {
                    candidates.push(hardware);
                }
            }
        }

        debug!(
            "Found {} candidate Hardware for TinkerbellMachine {}",
            candidates.len(),
            machine_key(machine)
        );

        let best = rank(candidates, &preferences)
            .into_iter()
            .next()
            .ok_or_else(|| ControllerError::NoHardwareAvailable {
                machine: machine_key(machine),
            })?;

        info!(
            "Allocated Hardware {} (score {}) to TinkerbellMachine {}",
            best.hardware.key(),
            best.score,
            machine_key(machine)
        );

        Ok(best.hardware)
    }

    /// Hardware carrying the machine's owner labels, ordered by namespace and name
    pub(crate) async fn owned_hardware(&self, machine: &TinkerbellMachine) -> Result<Vec<Hardware>, ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        let selector = Selector::from_labels([
            (HARDWARE_OWNER_NAME_LABEL, name),
            (HARDWARE_OWNER_NAMESPACE_LABEL, namespace),
        ])
        .map_err(|source| ControllerError::Selector {
            selector: format!("{HARDWARE_OWNER_NAME_LABEL}={name},{HARDWARE_OWNER_NAMESPACE_LABEL}={namespace}"),
            source,
        })?;

        let mut owned = self
            .store
            .list_hardware(&selector)
            .await
            .map_err(|e| ControllerError::store(format!("listing Hardware owned by TinkerbellMachine {namespace}/{name}"), e))?;

        owned.sort_by(|a, b| {
            a.metadata
                .namespace
                .cmp(&b.metadata.namespace)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });

        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::{HardwareAffinity, HardwareAffinityTerm, HardwareLabelSelector, LabelSelectorRequirement};
    use hardware_store::MockStore;

    fn with_affinity(name: &str, affinity: HardwareAffinity) -> TinkerbellMachine {
        let mut machine = create_test_machine(name);
        machine.spec.hardware_affinity = Some(affinity);
        machine
    }

    fn allocated_name(hardware: &Hardware) -> &str {
        hardware.metadata.name.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_owned_hardware_short_circuits_selection() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-a", &[("rack", "a")]));
        store.add_hardware(create_claimed_hardware("hw-z", "m1"));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: vec![term(&[("rack", "a")])],
                preferred: Vec::new(),
            },
        );

        let hardware = reconciler.allocate_hardware(&machine).await.unwrap();
        assert_eq!(allocated_name(&hardware), "hw-z");
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_hardware_is_never_a_candidate() {
        let store = MockStore::new();
        store.add_hardware(create_claimed_hardware("hw-a", "other"));
        store.add_hardware(create_test_hardware("hw-b", &[]));
        let reconciler = create_test_reconciler(&store);

        let hardware = reconciler.allocate_hardware(&create_test_machine("m1")).await.unwrap();
        assert_eq!(allocated_name(&hardware), "hw-b");
    }

    #[tokio::test]
    async fn test_required_terms_are_or_combined() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-a", &[("rack", "a")]));
        store.add_hardware(create_test_hardware("hw-b", &[("rack", "b")]));
        store.add_hardware(create_test_hardware("hw-c", &[("rack", "c")]));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: vec![term(&[("rack", "c")]), term(&[("rack", "b")])],
                preferred: vec![preferred(50, &[("rack", "c")])],
            },
        );

        let hardware = reconciler.allocate_hardware(&machine).await.unwrap();
        assert_eq!(allocated_name(&hardware), "hw-c");
    }

    #[tokio::test]
    async fn test_unit_matching_several_terms_is_considered_once() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-a", &[("rack", "a"), ("gpu", "yes")]));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: vec![term(&[("rack", "a")]), term(&[("gpu", "yes")])],
                preferred: Vec::new(),
            },
        );

        let hardware = reconciler.allocate_hardware(&machine).await.unwrap();
        assert_eq!(allocated_name(&hardware), "hw-a");
    }

    #[tokio::test]
    async fn test_preferences_and_tie_break() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-b", &[("disk", "ssd")]));
        store.add_hardware(create_test_hardware("hw-a", &[("disk", "ssd")]));
        store.add_hardware(create_test_hardware("hw-0", &[("disk", "hdd")]));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: Vec::new(),
                preferred: vec![preferred(5, &[("disk", "ssd")])],
            },
        );

        for _ in 0..3 {
            let hardware = reconciler.allocate_hardware(&machine).await.unwrap();
            assert_eq!(allocated_name(&hardware), "hw-a");
        }
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-a", &[("rack", "a")]));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: vec![term(&[("rack", "z")])],
                preferred: Vec::new(),
            },
        );

        let err = reconciler.allocate_hardware(&machine).await.unwrap_err();
        assert!(matches!(err, ControllerError::NoHardwareAvailable { ref machine } if machine == "default/m1"));
    }

    #[tokio::test]
    async fn test_malformed_preference_fails_allocation() {
        let store = MockStore::new();
        store.add_hardware(create_test_hardware("hw-a", &[]));
        let reconciler = create_test_reconciler(&store);

        let machine = with_affinity(
            "m1",
            HardwareAffinity {
                required: Vec::new(),
                preferred: vec![crds::WeightedHardwareAffinityTerm {
                    weight: 10,
                    hardware_affinity_term: HardwareAffinityTerm {
                        label_selector: HardwareLabelSelector {
                            match_expressions: vec![LabelSelectorRequirement {
                                key: "rack".to_string(),
                                operator: "In".to_string(),
                                values: Vec::new(),
                            }],
                            ..Default::default()
                        },
                    },
                }],
            },
        );

        let err = reconciler.allocate_hardware(&machine).await.unwrap_err();
        assert!(matches!(err, ControllerError::Selector { .. }));
    }
}
