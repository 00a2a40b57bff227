//! Epoch-fork simulator.
//!
//! Replays an `event_stream` of epoch record issuances against a validator
//! that indexes records by epoch and by parent, flags the first conflicting
//! record as a fork, checks `previous_epoch_hash` linkage, and selects the
//! winning record by depth, then epoch, then earliest timestamp, then hash.
//!
//! ```text
//! epoch_issue ──► drop_next_eare? ──► conflict at epoch / under parent? ──► EPOCH_FORK_DETECTED
//!                                  └► previous_epoch_hash ≠ parent hash? ─► HASH_CHAIN_BREAK
//! replay_attempt ──► messages_dropped += count
//! merge ──► reconciliation latency (first merge − detection)
//! ```

mod expectations;
mod scenario;
mod simulator;

pub use expectations::evaluate_expectations;
pub use scenario::{
    DetectionReference, EpochAction, EpochEdge, EpochEvent, EpochExpectations, EpochNode,
    EpochScenario, Fault, ReconciledEpoch, ReplayGap,
};
pub use simulator::{simulate, EpochMetrics, FalsePositives};

use foxwhisper_core::{
    CorpusError, FieldReader, ScenarioHeader, SimulationResult, Simulator, Verdict,
};

/// [`Simulator`] implementation for the epoch-fork domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochForkSimulator;

impl Simulator for EpochForkSimulator {
    const DOMAIN: &'static str = "epoch";
    type Scenario = EpochScenario;
    type Metrics = EpochMetrics;

    fn parse_scenario(
        header: ScenarioHeader,
        reader: &FieldReader<'_>,
    ) -> Result<Self::Scenario, CorpusError> {
        EpochScenario::parse(header, reader)
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
