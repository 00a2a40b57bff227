//! Epoch-fork expectation checks.

use crate::scenario::EpochScenario;
use crate::simulator::EpochMetrics;
use foxwhisper_core::{Checks, SimulationResult, Verdict};
use foxwhisper_types::{EpochId, FailureReason};

/// Compare an epoch-fork result against the scenario's expectations.
pub fn evaluate_expectations(
    scenario: &EpochScenario,
    result: &SimulationResult<EpochMetrics>,
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

    // Winner identity is only compared when both sides name one. An empty
    // hash or the genesis epoch counts as unnamed.
    let named_hash = |hash: &Option<String>| hash.clone().filter(|hash| !hash.is_empty());
    let named_epoch = |epoch: Option<EpochId>| epoch.filter(|epoch| *epoch != EpochId::GENESIS);
    if let (Some(expected), Some(actual)) = (
        named_hash(&exp.reconciled_epoch.eare_hash),
        named_hash(&metrics.winning_hash),
    ) {
        checks.fail_if(expected != actual, FailureReason::WinningHashMismatch);
    }
    if let (Some(expected), Some(actual)) = (
        named_epoch(exp.reconciled_epoch.epoch_id),
        named_epoch(metrics.winning_epoch_id),
    ) {
        checks.fail_if(expected != actual, FailureReason::WinningEpochMismatch);
    }

    if exp.healing_required {
        checks.sla(
            result.recovery_ms,
            exp.max_reconciliation_ms,
            FailureReason::MissingReconciliation,
            FailureReason::ReconciliationSla,
        );
    }

    let max_messages = exp.allow_replay_gap.max_messages;
    checks.fail_if(
        max_messages != 0 && metrics.messages_dropped > max_messages,
        FailureReason::ReplayGapMessages,
    );

    checks.categories(
        &exp.expected_error_categories,
        &result.errors,
        FailureReason::MissingErrorCategories,
    );

    checks.into_verdict()
}
