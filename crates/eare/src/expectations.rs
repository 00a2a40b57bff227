//! Corrupted-chain expectation checks.

use crate::scenario::EareScenario;
use crate::simulator::EareMetrics;
use foxwhisper_core::{Checks, SimulationResult, Verdict};
use foxwhisper_types::FailureReason;

/// Compare a corrupted-chain result against the scenario's expectations.
pub fn evaluate_expectations(
    scenario: &EareScenario,
    result: &SimulationResult<EareMetrics>,
) -> Verdict {
    let exp = &scenario.expectations;
    let metrics = &result.metrics;
    let mut checks = Checks::default();

    checks
        .detection(
            exp.should_detect,
            exp.max_detection_ms,
            result.detection,
            result.detection_ms,
        )
        .categories(
            &exp.expected_errors,
            &result.errors,
            FailureReason::MissingExpectedErrors,
        )
        .fail_if(
            !exp.allow_partial_accept && metrics.rejected_nodes > 0,
            FailureReason::PartialAcceptNotAllowed,
        )
        .fail_if(
            !exp.residual_divergence_allowed && metrics.hash_chain_breaks > 0,
            FailureReason::ResidualDivergence,
        );

    checks.into_verdict()
}
