//! SFU abuse simulator.
//!
//! Replays join, publish and subscribe traffic against a selective
//! forwarding unit together with the attacks a hostile participant can
//! mount on it: forged tokens, ghost subscriptions, track replay and
//! duplication, simulcast layer spoofing, bitrate abuse and key misuse.
//!
//! ```text
//! join ──► undeclared? UNAUTHORIZED_SUBSCRIBE ; token mismatch? IMPERSONATION
//! publish / subscribe ──► unauthenticated or unrouted? UNAUTHORIZED_SUBSCRIBE
//! replay_track / dup_track on a routed track ──► REPLAY_TRACK / DUPLICATE_ROUTE
//! simulcast_spoof ──► unpublished layer requested? SIMULCAST_SPOOF
//! ```

mod expectations;
mod scenario;
mod simulator;

pub use expectations::evaluate_expectations;
pub use scenario::{Participant, SfuContext, SfuEvent, SfuExpectations, SfuScenario};
pub use simulator::{simulate, SfuMetrics};

use foxwhisper_core::{
    CorpusError, FieldReader, ScenarioHeader, SimulationResult, Simulator, Verdict,
};

/// [`Simulator`] implementation for the SFU-abuse domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct SfuAbuseSimulator;

impl Simulator for SfuAbuseSimulator {
    const DOMAIN: &'static str = "sfu";
    type Scenario = SfuScenario;
    type Metrics = SfuMetrics;

    fn parse_scenario(
        header: ScenarioHeader,
        reader: &FieldReader<'_>,
    ) -> Result<Self::Scenario, CorpusError> {
        SfuScenario::parse(header, reader)
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
