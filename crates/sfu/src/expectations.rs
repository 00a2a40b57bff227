//! SFU-abuse expectation checks.

use crate::scenario::SfuScenario;
use crate::simulator::SfuMetrics;
use foxwhisper_core::{Checks, SimulationResult, Verdict};
use foxwhisper_types::FailureReason;

/// Compare an SFU-abuse result against the scenario's expectations.
pub fn evaluate_expectations(
    scenario: &SfuScenario,
    result: &SimulationResult<SfuMetrics>,
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
        .upper_bound(
            metrics.hijacked_tracks,
            exp.max_hijacked_tracks,
            FailureReason::HijackedTracksExceeded,
        )
        .upper_bound(
            metrics.unauthorized_tracks,
            exp.max_unauthorized_tracks,
            FailureReason::UnauthorizedTracksExceeded,
        )
        .upper_bound(
            metrics.key_leak_attempts,
            exp.max_key_leak_attempts,
            FailureReason::KeyLeakExceeded,
        )
        .upper_bound(
            metrics.max_extra_latency_ms,
            exp.max_extra_latency_ms,
            FailureReason::LatencyExceeded,
        )
        .upper_bound(
            metrics.false_positive_blocks,
            exp.max_false_positive_blocks,
            FailureReason::FalsePositiveBlocksExceeded,
        )
        .upper_bound(
            metrics.false_negative_leaks,
            exp.max_false_negative_leaks,
            FailureReason::FalseNegativeLeaksExceeded,
        )
        .fail_if(
            !exp.residual_routing_allowed && metrics.duplicate_routes > 0,
            FailureReason::ResidualRouting,
        );

    checks.into_verdict()
}
