//! Corrupted EARE chain validation.

use crate::scenario::{Corruption, CorruptionKind, EareScenario};
use foxwhisper_core::{ErrorSet, SimulationResult};
use foxwhisper_types::ErrorCategory;
use serde::Serialize;
use tracing::debug;

/// Corrupted-chain metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EareMetrics {
    pub chain_length: usize,
    pub hash_chain_breaks: u64,
    /// Declared corruptions, whether or not any record matched them.
    pub corruptions_applied: usize,
    pub accepted_nodes: u64,
    pub rejected_nodes: u64,
}

struct ChainValidator<'a> {
    scenario: &'a EareScenario,
    errors: ErrorSet,
    notes: Vec<String>,
    hash_chain_breaks: u64,
    accepted_nodes: u64,
    rejected_nodes: u64,
}

impl<'a> ChainValidator<'a> {
    fn new(scenario: &'a EareScenario) -> Self {
        let notes = scenario
            .corruptions
            .iter()
            .filter(|corruption| !corruption.kind.is_canonical())
            .map(|corruption| format!("unknown corruption type {}", corruption.name))
            .collect();
        Self {
            scenario,
            errors: ErrorSet::new(),
            notes,
            hash_chain_breaks: 0,
            accepted_nodes: 0,
            rejected_nodes: 0,
        }
    }

    fn raise(&mut self, category: ErrorCategory) {
        if self.errors.insert(category) {
            debug!(
                scenario = %self.scenario.header.scenario_id,
                category = %category,
                "Record chain error raised"
            );
        }
    }

    fn apply(&mut self, corruption: &Corruption) {
        match &corruption.kind {
            CorruptionKind::HashChainBreak => self.hash_chain_breaks += 1,
            CorruptionKind::TruncatedEare => self.rejected_nodes += 1,
            CorruptionKind::Unknown(name) => {
                self.notes.push(format!("unhandled corruption {name}"));
            }
            _ => {}
        }
        if let Some(category) = corruption.kind.category() {
            self.raise(category);
        }
    }

    fn run(&mut self) {
        let scenario = self.scenario;
        let mut last_hash: Option<&str> = None;

        for node in &scenario.nodes {
            match last_hash {
                Some(last) if node.previous_epoch_hash != last => {
                    debug!(
                        scenario = %scenario.header.scenario_id,
                        node = %node.node_id,
                        expected = last,
                        found = %node.previous_epoch_hash,
                        "Record chain break"
                    );
                    self.raise(ErrorCategory::HashChainBreak);
                    self.hash_chain_breaks += 1;
                    self.rejected_nodes += 1;
                }
                _ => self.accepted_nodes += 1,
            }
            last_hash = Some(node.eare_hash.as_str());

            let targeted = scenario
                .corruptions
                .iter()
                .filter(|corruption| corruption.targets_node(&node.node_id));
            let wildcard = scenario
                .corruptions
                .iter()
                .filter(|corruption| corruption.targets_all());
            for corruption in targeted.chain(wildcard) {
                self.apply(corruption);
            }
        }
    }
}

/// Validate a corrupted-chain scenario.
pub fn simulate(scenario: &EareScenario) -> SimulationResult<EareMetrics> {
    let mut validator = ChainValidator::new(scenario);
    validator.run();

    let detection = !validator.errors.is_empty();
    let metrics = EareMetrics {
        chain_length: scenario.nodes.len(),
        hash_chain_breaks: validator.hash_chain_breaks,
        corruptions_applied: scenario.corruptions.len(),
        accepted_nodes: validator.accepted_nodes,
        rejected_nodes: validator.rejected_nodes,
    };

    debug!(
        scenario = %scenario.header.scenario_id,
        detection,
        accepted = metrics.accepted_nodes,
        rejected = metrics.rejected_nodes,
        "Record chain validated"
    );

    SimulationResult {
        detection,
        detection_ms: detection.then_some(0),
        recovery_ms: None,
        errors: validator.errors,
        notes: validator.notes,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CorruptedEareSimulator;
    use foxwhisper_core::parse_scenario;
    use foxwhisper_test_helpers::eare;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::Value;
    use tracing_test::traced_test;

    fn run(value: Value) -> SimulationResult<EareMetrics> {
        let scenario = parse_scenario::<CorruptedEareSimulator>(0, &value).unwrap();
        simulate(&scenario)
    }

    #[traced_test]
    #[test]
    fn test_clean_chain_accepted() {
        let result = run(eare::scenario("eare-clean", eare::chain(4), vec![]));
        assert!(!result.detection);
        assert_eq!(result.detection_ms, None);
        assert_eq!(result.metrics.accepted_nodes, 4);
        assert_eq!(result.metrics.rejected_nodes, 0);
        assert_eq!(result.metrics.chain_length, 4);
    }

    #[traced_test]
    #[test]
    fn test_link_mismatch_breaks_chain() {
        let mut nodes = eare::chain(3);
        nodes[2]["previous_epoch_hash"] = "forged".into();
        let result = run(eare::scenario("eare-break", nodes, vec![]));
        assert!(result.detection);
        assert_eq!(result.detection_ms, Some(0));
        assert_eq!(result.errors.as_slice(), &[ErrorCategory::HashChainBreak]);
        assert_eq!(result.metrics.hash_chain_breaks, 1);
        assert_eq!(result.metrics.accepted_nodes, 2);
        assert_eq!(result.metrics.rejected_nodes, 1);
    }

    #[test]
    fn test_targeted_before_wildcard() {
        let result = run(eare::scenario(
            "eare-order",
            eare::chain(2),
            vec![
                eare::corruption("EXTRA_FIELDS", None),
                eare::corruption("invalid_signature", Some("n0")),
            ],
        ));
        assert_eq!(
            result.errors.as_slice(),
            &[ErrorCategory::InvalidSignature, ErrorCategory::ExtraFields]
        );
        assert_eq!(result.metrics.corruptions_applied, 2);
    }

    #[test]
    fn test_wildcard_truncation_rejects_every_record() {
        let result = run(eare::scenario(
            "eare-truncate",
            eare::chain(3),
            vec![eare::corruption("TRUNCATED_EARE", Some("*"))],
        ));
        assert_eq!(result.metrics.rejected_nodes, 3);
        assert_eq!(result.metrics.accepted_nodes, 3);
        assert_eq!(result.errors.as_slice(), &[ErrorCategory::TruncatedEare]);
    }

    #[test]
    fn test_declared_chain_break_counts() {
        let result = run(eare::scenario(
            "eare-declared-break",
            eare::chain(2),
            vec![eare::corruption("hash_chain_break", Some("n1"))],
        ));
        assert_eq!(result.metrics.hash_chain_breaks, 1);
        assert_eq!(result.metrics.rejected_nodes, 0);
    }

    #[traced_test]
    #[test]
    fn test_alias_and_unknown_notes() {
        let result = run(eare::scenario(
            "eare-notes",
            eare::chain(2),
            vec![
                eare::corruption("tamper_payload", Some("n1")),
                eare::corruption("Bit_Flip", Some("n0")),
            ],
        ));
        assert_eq!(result.errors.as_slice(), &[ErrorCategory::PayloadTampered]);
        assert_eq!(
            result.notes,
            vec![
                "unknown corruption type tamper_payload".to_owned(),
                "unknown corruption type Bit_Flip".to_owned(),
                "unhandled corruption Bit_Flip".to_owned(),
            ]
        );
    }

    #[test]
    fn test_deterministic_under_corruption_shuffle() {
        // Distinct targets keep application order independent of declaration order.
        let mut corruptions = vec![
            eare::corruption("INVALID_POP", Some("n0")),
            eare::corruption("STALE_EPOCH_REF", Some("n1")),
            eare::corruption("PAYLOAD_TAMPERED", Some("n2")),
        ];
        let baseline = run(eare::scenario("eare-shuffle", eare::chain(3), corruptions.clone()));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..8 {
            corruptions.shuffle(&mut rng);
            assert_eq!(
                run(eare::scenario("eare-shuffle", eare::chain(3), corruptions.clone())),
                baseline
            );
        }
    }
}
