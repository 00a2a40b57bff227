//! Expectation failure reasons.

use serde::{Serialize, Serializer};
use std::fmt;

/// Why a scenario failed its declared expectations.
///
/// A failure is a normal outcome of running an adversarial corpus and is
/// reported, never thrown. Each domain uses a subset of these reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    // ═══════════════════════════════════════════════════════════════════════
    // Detection (all event-driven domains)
    // ═══════════════════════════════════════════════════════════════════════
    /// Detection flag differs from the declared expectation.
    DetectionMismatch,
    /// Detection expected but no latency was produced.
    MissingDetectionMs,
    /// Detection latency above the declared SLA.
    DetectionSla,
    /// Detection not expected but a nonzero latency was produced.
    UnexpectedDetectionMs,
    /// A declared category was not raised (epoch and desync naming).
    MissingErrorCategories,
    /// A declared category was not raised (EARE and SFU naming).
    MissingExpectedErrors,

    // ═══════════════════════════════════════════════════════════════════════
    // Epoch fork
    // ═══════════════════════════════════════════════════════════════════════
    /// Reconciled to a different hash than declared.
    WinningHashMismatch,
    /// Reconciled to a different epoch than declared.
    WinningEpochMismatch,
    /// Healing required but no merge happened.
    MissingReconciliation,
    /// Merge happened later than the declared SLA.
    ReconciliationSla,
    /// More replayed messages dropped than tolerated.
    ReplayGapMessages,

    // ═══════════════════════════════════════════════════════════════════════
    // Device desync
    // ═══════════════════════════════════════════════════════════════════════
    /// Healing required but divergence never closed.
    MissingRecoveryMs,
    /// Divergence closed later than the declared SLA.
    RecoverySla,
    /// Divergence remained at the end of the timeline.
    ResidualDivergence,
    /// DR version delta above its bound.
    DrDeltaExceeded,
    /// Clock skew above its bound.
    ClockSkewExceeded,
    /// Message loss rate above its bound.
    MessageLossRate,
    /// Out-of-order rate above its bound.
    OutOfOrderRate,
    /// Rollback magnitude above its bound.
    RollbackExceeded,

    // ═══════════════════════════════════════════════════════════════════════
    // Corrupted record chain
    // ═══════════════════════════════════════════════════════════════════════
    /// Some records were rejected while partial acceptance is forbidden.
    PartialAcceptNotAllowed,

    // ═══════════════════════════════════════════════════════════════════════
    // SFU abuse
    // ═══════════════════════════════════════════════════════════════════════
    /// Hijacked track count above its bound.
    HijackedTracksExceeded,
    /// Unauthorized track count above its bound.
    UnauthorizedTracksExceeded,
    /// Key-leak attempts above their bound.
    KeyLeakExceeded,
    /// Extra latency above its bound.
    LatencyExceeded,
    /// False-positive blocks above their bound.
    FalsePositiveBlocksExceeded,
    /// False-negative leaks above their bound.
    FalseNegativeLeaksExceeded,
    /// Duplicate routes remained while residual routing is forbidden.
    ResidualRouting,

    // ═══════════════════════════════════════════════════════════════════════
    // Replay storm
    // ═══════════════════════════════════════════════════════════════════════
    /// Drop ratio outside the tolerance band around the expected ratio.
    DropRatioTolerance,
    /// Alert state differs from the declared expectation.
    AlertMismatch,

    // ═══════════════════════════════════════════════════════════════════════
    // Reporter
    // ═══════════════════════════════════════════════════════════════════════
    /// The scenario could not be parsed.
    CorpusError,
}

impl FailureReason {
    /// Get the wire name of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::DetectionMismatch => "detection_mismatch",
            FailureReason::MissingDetectionMs => "missing_detection_ms",
            FailureReason::DetectionSla => "detection_sla",
            FailureReason::UnexpectedDetectionMs => "unexpected_detection_ms",
            FailureReason::MissingErrorCategories => "missing_error_categories",
            FailureReason::MissingExpectedErrors => "missing_expected_errors",
            FailureReason::WinningHashMismatch => "winning_hash_mismatch",
            FailureReason::WinningEpochMismatch => "winning_epoch_mismatch",
            FailureReason::MissingReconciliation => "missing_reconciliation",
            FailureReason::ReconciliationSla => "reconciliation_sla",
            FailureReason::ReplayGapMessages => "replay_gap_messages",
            FailureReason::MissingRecoveryMs => "missing_recovery_ms",
            FailureReason::RecoverySla => "recovery_sla",
            FailureReason::ResidualDivergence => "residual_divergence",
            FailureReason::DrDeltaExceeded => "dr_delta_exceeded",
            FailureReason::ClockSkewExceeded => "clock_skew_exceeded",
            FailureReason::MessageLossRate => "message_loss_rate",
            FailureReason::OutOfOrderRate => "out_of_order_rate",
            FailureReason::RollbackExceeded => "rollback_exceeded",
            FailureReason::PartialAcceptNotAllowed => "partial_accept_not_allowed",
            FailureReason::HijackedTracksExceeded => "hijacked_tracks_exceeded",
            FailureReason::UnauthorizedTracksExceeded => "unauthorized_tracks_exceeded",
            FailureReason::KeyLeakExceeded => "key_leak_exceeded",
            FailureReason::LatencyExceeded => "latency_exceeded",
            FailureReason::FalsePositiveBlocksExceeded => "false_positive_blocks_exceeded",
            FailureReason::FalseNegativeLeaksExceeded => "false_negative_leaks_exceeded",
            FailureReason::ResidualRouting => "residual_routing",
            FailureReason::DropRatioTolerance => "drop_ratio_tolerance",
            FailureReason::AlertMismatch => "alert_mismatch",
            FailureReason::CorpusError => "corpus_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
