//! Expectation verdicts and the checks shared by every domain evaluator.

use crate::ErrorSet;
use foxwhisper_types::{ErrorCategory, FailureReason};
use serde::Serialize;
use std::fmt;

/// Pass/fail status of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every expectation held.
    Pass,
    /// At least one expectation failed.
    Fail,
}

impl Status {
    /// Get the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing a simulation against its declared expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// `Pass` iff `failures` is empty.
    pub status: Status,
    /// Failure reasons in check order.
    pub failures: Vec<FailureReason>,
}

impl Verdict {
    /// Build a verdict from a failure list.
    pub fn from_failures(failures: Vec<FailureReason>) -> Self {
        let status = if failures.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        };
        Self { status, failures }
    }

    /// Whether the scenario passed.
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }
}

/// Accumulates failure reasons in the order checks are run.
///
/// A bound of `0` on an SLA check means "no SLA declared"; plain upper
/// bounds are always enforced.
#[derive(Debug, Default)]
pub struct Checks {
    failures: Vec<FailureReason>,
}

impl Checks {
    /// Detection flag and latency checks shared by every event domain.
    pub fn detection(
        &mut self,
        expected: bool,
        max_detection_ms: u64,
        detection: bool,
        detection_ms: Option<u64>,
    ) -> &mut Self {
        self.fail_if(detection != expected, FailureReason::DetectionMismatch);
        if expected {
            self.sla(
                detection_ms,
                max_detection_ms,
                FailureReason::MissingDetectionMs,
                FailureReason::DetectionSla,
            );
        } else {
            self.fail_if(
                detection_ms.is_some_and(|ms| ms != 0),
                FailureReason::UnexpectedDetectionMs,
            );
        }
        self
    }

    /// A latency that must exist and, when `bound` is nonzero, stay within it.
    pub fn sla(
        &mut self,
        actual: Option<u64>,
        bound: u64,
        missing: FailureReason,
        exceeded: FailureReason,
    ) -> &mut Self {
        match actual {
            None => self.fail(missing),
            Some(ms) if bound != 0 && ms > bound => self.fail(exceeded),
            Some(_) => self,
        }
    }

    /// `actual > bound` fails.
    pub fn upper_bound<T: PartialOrd>(
        &mut self,
        actual: T,
        bound: T,
        reason: FailureReason,
    ) -> &mut Self {
        self.fail_if(actual > bound, reason)
    }

    /// Every declared category must have been raised.
    pub fn categories(
        &mut self,
        expected: &[ErrorCategory],
        raised: &ErrorSet,
        reason: FailureReason,
    ) -> &mut Self {
        self.fail_if(raised.missing_from(expected).next().is_some(), reason)
    }

    /// Record `reason` when `condition` holds.
    pub fn fail_if(&mut self, condition: bool, reason: FailureReason) -> &mut Self {
        if condition {
            self.fail(reason);
        }
        self
    }

    /// Record a failure unconditionally.
    pub fn fail(&mut self, reason: FailureReason) -> &mut Self {
        self.failures.push(reason);
        self
    }

    /// Finish checking.
    pub fn into_verdict(self) -> Verdict {
        Verdict::from_failures(self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(expected: bool, max: u64, detection: bool, ms: Option<u64>) -> Vec<FailureReason> {
        let mut checks = Checks::default();
        checks.detection(expected, max, detection, ms);
        checks.into_verdict().failures
    }

    #[test]
    fn test_unexpected_detection_latency_fails() {
        assert_eq!(
            detection(false, 0, false, Some(15)),
            vec![FailureReason::UnexpectedDetectionMs]
        );
        assert!(detection(false, 0, false, Some(0)).is_empty());
        assert!(detection(false, 0, false, None).is_empty());
    }

    #[test]
    fn test_detection_sla() {
        assert!(detection(true, 50, true, Some(50)).is_empty());
        assert_eq!(detection(true, 50, true, Some(51)), vec![FailureReason::DetectionSla]);
        assert!(detection(true, 0, true, Some(10_000)).is_empty());
        assert_eq!(
            detection(true, 50, false, None),
            vec![FailureReason::DetectionMismatch, FailureReason::MissingDetectionMs]
        );
    }

    #[test]
    fn test_status_follows_failures() {
        let verdict = Checks::default().into_verdict();
        assert!(verdict.is_pass());
        assert_eq!(serde_json::to_string(&verdict.status).unwrap(), "\"pass\"");

        let mut checks = Checks::default();
        checks.upper_bound(0.25, 0.1, FailureReason::MessageLossRate);
        let verdict = checks.into_verdict();
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            serde_json::json!({"status": "fail", "failures": ["message_loss_rate"]})
        );
    }

    #[test]
    fn test_categories_subset() {
        let raised: ErrorSet = [ErrorCategory::HashChainBreak].into_iter().collect();
        let mut checks = Checks::default();
        checks.categories(
            &[ErrorCategory::HashChainBreak, ErrorCategory::InvalidPop],
            &raised,
            FailureReason::MissingExpectedErrors,
        );
        assert_eq!(
            checks.into_verdict().failures,
            vec![FailureReason::MissingExpectedErrors]
        );
    }
}
