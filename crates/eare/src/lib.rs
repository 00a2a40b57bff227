//! Corrupted EARE record-chain simulator.
//!
//! Walks a group's EARE records in epoch order, checks that each record's
//! `previous_epoch_hash` links to its predecessor, and applies the declared
//! corruptions to the records they target.
//!
//! ```text
//! record ──► previous_epoch_hash ≠ last hash? ──► HASH_CHAIN_BREAK, rejected
//!        └─► targeted corruptions, then "*" corruptions ──► category per type
//! ```

mod expectations;
mod scenario;
mod simulator;

pub use expectations::evaluate_expectations;
pub use scenario::{
    Corruption, CorruptionKind, CorruptionTarget, EareExpectations, EareNode, EareScenario,
    GroupContext,
};
pub use simulator::{simulate, EareMetrics};

use foxwhisper_core::{
    CorpusError, FieldReader, ScenarioHeader, SimulationResult, Simulator, Verdict,
};

/// [`Simulator`] implementation for the corrupted-chain domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorruptedEareSimulator;

impl Simulator for CorruptedEareSimulator {
    const DOMAIN: &'static str = "eare";
    type Scenario = EareScenario;
    type Metrics = EareMetrics;

    fn parse_scenario(
        header: ScenarioHeader,
        reader: &FieldReader<'_>,
    ) -> Result<Self::Scenario, CorpusError> {
        EareScenario::parse(header, reader)
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
