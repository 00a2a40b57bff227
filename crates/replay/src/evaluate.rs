//! Drop-ratio tolerance checks and the profile-set summary.

use crate::profile::{ProfileSet, ReplayProfile};
use crate::simulator::{ReplayOutcome, ReplayStormConfig, ReplayStormSimulator};
use foxwhisper_core::{Checks, Status, Verdict};
use foxwhisper_types::FailureReason;
use serde::Serialize;
use tracing::info;

/// Compare a profile's outcome against its expectations.
pub fn evaluate_profile(
    profile: &ReplayProfile,
    outcome: &ReplayOutcome,
    tolerance: f64,
) -> Verdict {
    let mut checks = Checks::default();
    checks
        .fail_if(
            (outcome.drop_ratio - profile.expected_drop_ratio).abs() > tolerance,
            FailureReason::DropRatioTolerance,
        )
        .fail_if(
            outcome.alert_triggered != profile.expected_alert,
            FailureReason::AlertMismatch,
        );
    checks.into_verdict()
}

/// Per-profile line of a [`ReplayStormSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    #[serde(flatten)]
    pub outcome: ReplayOutcome,
    pub expected_drop_ratio: f64,
    pub drop_ratio_delta: f64,
    pub expected_alert: bool,
    pub notes: String,
    pub status: Status,
    pub failures: Vec<FailureReason>,
}

/// Result of running a whole profile set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStormSummary {
    pub window_size: u64,
    pub capacity_per_ms: f64,
    pub queue_limit: f64,
    pub tolerance: f64,
    pub profiles: Vec<ProfileReport>,
    pub passed: usize,
    pub failed: usize,
    /// `success` when every profile passed, `failed` otherwise.
    pub status: &'static str,
}

impl ReplayStormSummary {
    /// Whether every profile passed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Simulate and evaluate every profile of a set, in declaration order.
pub fn run_profile_set(set: &ProfileSet) -> ReplayStormSummary {
    let simulator = ReplayStormSimulator::new(ReplayStormConfig::from_profile_set(set));

    let profiles: Vec<ProfileReport> = set
        .profiles
        .iter()
        .map(|profile| {
            let outcome = simulator.simulate(profile);
            let verdict = evaluate_profile(profile, &outcome, set.tolerance);
            info!(
                profile = %profile.profile_id,
                drop_ratio = outcome.drop_ratio,
                target = profile.expected_drop_ratio,
                alert = outcome.alert_triggered,
                status = %verdict.status,
                "Replay storm profile"
            );
            ProfileReport {
                drop_ratio_delta: (outcome.drop_ratio - profile.expected_drop_ratio).abs(),
                expected_drop_ratio: profile.expected_drop_ratio,
                expected_alert: profile.expected_alert,
                notes: profile.notes.clone().unwrap_or_default(),
                status: verdict.status,
                failures: verdict.failures,
                outcome,
            }
        })
        .collect();

    let passed = profiles
        .iter()
        .filter(|report| report.status == Status::Pass)
        .count();
    let failed = profiles.len() - passed;
    let config = simulator.config();

    ReplayStormSummary {
        window_size: config.window_size,
        capacity_per_ms: config.capacity_per_ms,
        queue_limit: config.queue_limit,
        tolerance: set.tolerance,
        profiles,
        passed,
        failed,
        status: if failed == 0 { "success" } else { "failed" },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foxwhisper_test_helpers::{merge, replay};
    use serde_json::json;
    use tracing_test::traced_test;

    fn set(profiles: Vec<serde_json::Value>) -> ProfileSet {
        ProfileSet::from_value(replay::profile_set(1, 1.0, profiles)).unwrap()
    }

    #[traced_test]
    #[test]
    fn test_matched_capacity_profile_passes() {
        let summary = run_profile_set(&set(vec![merge(
            replay::profile("steady", 1.0, 1000),
            json!({"expected_alert": false}),
        )]));
        assert!(summary.is_success());
        assert_eq!(summary.status, "success");
        assert_eq!(summary.profiles[0].outcome.drop_ratio, 0.0);
        assert!(!summary.profiles[0].outcome.alert_triggered);
        assert_eq!(summary.queue_limit, 8.0);
    }

    #[test]
    fn test_tolerance_and_alert_failures() {
        // Actual drop ratio for this flood is 0.55.
        let summary = run_profile_set(&set(vec![
            merge(replay::profile("close", 4.0, 10), json!({"expected_drop_ratio": 0.52})),
            merge(
                replay::profile("far", 4.0, 10),
                json!({"expected_drop_ratio": 0.2, "expected_alert": false}),
            ),
        ]));
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status, "failed");
        assert_eq!(
            summary.profiles[1].failures,
            vec![FailureReason::DropRatioTolerance, FailureReason::AlertMismatch]
        );
    }

    #[test]
    fn test_summary_serializes_flat_profiles() {
        let summary = run_profile_set(&set(vec![replay::profile("p", 1.0, 5)]));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["profiles"][0]["profile_id"], "p");
        assert_eq!(value["profiles"][0]["status"], "fail");
        assert_eq!(value["profiles"][0]["failures"], json!(["alert_mismatch"]));
    }
}
