//! Multi-device desync simulator.
//!
//! Models a user's devices, each with a double-ratchet version counter and a
//! logical clock, exchanging messages under loss, replay, restore and skew.
//!
//! ```text
//! send / replay ──► envelope (targets, send time, replay count)
//! recv ──► unknown? UNKNOWN_MESSAGE ; seen? DUPLICATE_DELIVERY ; apply DR version
//! backup_restore ──► version regression? ROLLBACK_APPLIED
//! clock_skew ──► skew > bound? CLOCK_SKEW_VIOLATION
//! after every event ──► max − min DR version > 0? DIVERGENCE_DETECTED
//! ```

mod expectations;
mod scenario;
mod simulator;

pub use expectations::evaluate_expectations;
pub use scenario::{Device, DesyncEvent, DesyncExpectations, DesyncScenario};
pub use simulator::{simulate, DesyncMetrics};

use foxwhisper_core::{
    parse_scenario, CorpusError, FieldReader, ScenarioHeader, SimulationResult, Simulator, Verdict,
};
use serde_json::json;

/// [`Simulator`] implementation for the device-desync domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDesyncSimulator;

impl Simulator for DeviceDesyncSimulator {
    const DOMAIN: &'static str = "desync";
    type Scenario = DesyncScenario;
    type Metrics = DesyncMetrics;

    fn parse_scenario(
        header: ScenarioHeader,
        reader: &FieldReader<'_>,
    ) -> Result<Self::Scenario, CorpusError> {
        DesyncScenario::parse(header, reader)
    }

    fn simulate(scenario: &Self::Scenario) -> SimulationResult<Self::Metrics> {
        simulate(scenario)
    }

    fn evaluate_expectations(
        scenario: &Self::Scenario,
        result: &SimulationResult<Self::Metrics>,
    ) -> Verdict {
        evaluate_expectations(scenario, result)
    }
}

/// Built-in two-device scenario used by `self-test`: one version bump that is
/// delivered 10 ms later, so it must pass with detection 0 and recovery 10.
pub fn sanity_scenario() -> Result<DesyncScenario, CorpusError> {
    let value = json!({
        "scenario_id": "desync-sanity-inline",
        "tags": ["sanity"],
        "devices": [
            {"device_id": "device-a", "dr_version": 1, "clock_ms": 0},
            {"device_id": "device-b", "dr_version": 1, "clock_ms": 0},
        ],
        "timeline": [
            {"t": 0, "event": "send", "msg_id": "m-inline", "from": "device-a",
             "to": ["device-b"], "dr_version": 2},
            {"t": 10, "event": "recv", "msg_id": "m-inline", "device": "device-b",
             "apply_dr_version": 2},
        ],
        "expectations": {
            "detected": true,
            "max_detection_ms": 10,
            "max_recovery_ms": 50,
            "healing_required": true,
            "residual_divergence_allowed": false,
            "max_dr_version_delta": 1,
            "max_clock_skew_ms": 100,
            "allow_message_loss_rate": 0.0,
            "allow_out_of_order_rate": 0.0,
            "expected_error_categories": ["DIVERGENCE_DETECTED"],
            "max_rollback_events": 0,
        },
    });
    parse_scenario::<DeviceDesyncSimulator>(0, &value)
}
