//! Device-desync expectation checks.

use crate::scenario::DesyncScenario;
use crate::simulator::DesyncMetrics;
use foxwhisper_core::{Checks, SimulationResult, Verdict};
use foxwhisper_types::FailureReason;

/// Compare a desync result against the scenario's expectations.
pub fn evaluate_expectations(
    scenario: &DesyncScenario,
    result: &SimulationResult<DesyncMetrics>,
) -> Verdict {
    let exp = &scenario.expectations;
    let metrics = &result.metrics;
    let mut checks = Checks::default();

    checks.detection(
        exp.detected,
        exp.max_detection_ms,
        result.detection,
        result.detection_ms,
    );

    if exp.healing_required {
        checks.sla(
            result.recovery_ms,
            exp.max_recovery_ms,
            FailureReason::MissingRecoveryMs,
            FailureReason::RecoverySla,
        );
        checks.fail_if(
            metrics.residual_divergence && !exp.residual_divergence_allowed,
            FailureReason::ResidualDivergence,
        );
    }

    checks
        .upper_bound(
            metrics.max_dr_version_delta,
            exp.max_dr_version_delta,
            FailureReason::DrDeltaExceeded,
        )
        .upper_bound(
            metrics.max_clock_skew_ms,
            exp.max_clock_skew_ms,
            FailureReason::ClockSkewExceeded,
        )
        .upper_bound(
            metrics.message_loss_rate,
            exp.allow_message_loss_rate,
            FailureReason::MessageLossRate,
        )
        .upper_bound(
            metrics.out_of_order_rate,
            exp.allow_out_of_order_rate,
            FailureReason::OutOfOrderRate,
        )
        .upper_bound(
            metrics.max_rollback_events,
            exp.max_rollback_events,
            FailureReason::RollbackExceeded,
        )
        .categories(
            &exp.expected_error_categories,
            &result.errors,
            FailureReason::MissingErrorCategories,
        );

    checks.into_verdict()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceDesyncSimulator;
    use foxwhisper_core::{parse_scenario, Simulator, Status};
    use foxwhisper_test_helpers::desync;
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    fn failures(value: Value) -> Vec<FailureReason> {
        let scenario = parse_scenario::<DeviceDesyncSimulator>(0, &value).unwrap();
        DeviceDesyncSimulator::run(&scenario).1.failures
    }

    fn rollback() -> Value {
        desync::scenario(
            "desync-eval",
            vec![desync::device("a", 5), desync::device("b", 5)],
            vec![json!({"t": 0, "event": "backup_restore", "device": "b", "dr_version": 3})],
        )
    }

    #[traced_test]
    #[test]
    fn test_sanity_scenario_passes() {
        let scenario = crate::sanity_scenario().unwrap();
        let (result, verdict) = DeviceDesyncSimulator::run(&scenario);
        assert_eq!(verdict.status, Status::Pass, "{:?}", verdict.failures);
        assert_eq!(result.detection_ms, Some(0));
        assert_eq!(result.recovery_ms, Some(10));
    }

    #[test]
    fn test_unhealed_rollback() {
        let value = desync::expect(
            rollback(),
            json!({
                "detected": true,
                "healing_required": true,
                "residual_divergence_allowed": false,
                "max_dr_version_delta": 1,
                "max_rollback_events": 1,
                "expected_error_categories": ["ROLLBACK_APPLIED", "REPLAY_INJECTED"],
            }),
        );
        assert_eq!(
            failures(value),
            vec![
                FailureReason::MissingRecoveryMs,
                FailureReason::ResidualDivergence,
                FailureReason::DrDeltaExceeded,
                FailureReason::RollbackExceeded,
                FailureReason::MissingErrorCategories,
            ]
        );
    }

    #[test]
    fn test_residual_only_checked_when_healing_required() {
        let value = desync::expect(
            rollback(),
            json!({"detected": true, "residual_divergence_allowed": false}),
        );
        assert!(failures(value).is_empty());
    }

    #[test]
    fn test_rates_and_skew_bounds() {
        let value = desync::expect(
            desync::scenario(
                "desync-rates",
                vec![desync::device("a", 1), desync::device("b", 1)],
                vec![
                    json!({"t": 0, "event": "send", "msg_id": "m1", "from": "a", "to": ["b"]}),
                    json!({"t": 5, "event": "clock_skew", "device": "b", "delta_ms": 500}),
                ],
            ),
            json!({
                "detected": true,
                "max_clock_skew_ms": 100,
                "allow_message_loss_rate": 0.25,
            }),
        );
        assert_eq!(
            failures(value),
            vec![FailureReason::ClockSkewExceeded, FailureReason::MessageLossRate]
        );
    }
}
