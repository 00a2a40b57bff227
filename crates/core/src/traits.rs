//! Core trait for scenario simulators.

use crate::{CorpusError, CorpusScenario, FieldReader, ScenarioHeader, SimulationResult, Verdict};
use serde::Serialize;
use std::fmt::Debug;

/// A deterministic adversarial-scenario simulator for one domain.
///
/// Every domain crate implements this trait on a unit struct. The three
/// operations form the whole calling contract consumed by the runner:
///
/// - **Parse**: loosely-typed JSON → strictly validated scenario, or a
///   [`CorpusError`] naming the scenario and field
/// - **Simulate**: replay the scenario against a minimal protocol-state
///   model, producing a [`SimulationResult`]
/// - **Evaluate**: compare the result against the scenario's declared
///   expectations, producing a [`Verdict`]
///
/// # Guarantees
///
/// - **Synchronous**: `simulate` never blocks or awaits
/// - **Deterministic**: the same scenario always yields the same result,
///   byte-for-byte once serialized
/// - **No I/O**: all state is local to one `simulate` call
///
/// # Example
///
/// ```ignore
/// let scenarios = load_corpus::<EpochForkSimulator>("epoch_fork.json")?;
/// for scenario in &scenarios {
///     let result = EpochForkSimulator::simulate(scenario);
///     let verdict = EpochForkSimulator::evaluate_expectations(scenario, &result);
///     println!("{} {}", scenario.scenario_id(), verdict.status);
/// }
/// ```
pub trait Simulator {
    /// Domain name used in logs and reports.
    const DOMAIN: &'static str;

    /// The validated scenario type.
    type Scenario: CorpusScenario + Debug + Send + Sync;

    /// Domain metrics, serialized as a JSON object.
    type Metrics: Serialize + Clone + Debug + PartialEq + Send;

    /// Parse the domain body of a scenario whose header is already validated.
    fn parse_scenario(
        header: ScenarioHeader,
        reader: &FieldReader<'_>,
    ) -> Result<Self::Scenario, CorpusError>;

    /// Replay the scenario.
    fn simulate(scenario: &Self::Scenario) -> SimulationResult<Self::Metrics>;

    /// Compare a result against the scenario's expectations.
    fn evaluate_expectations(
        scenario: &Self::Scenario,
        result: &SimulationResult<Self::Metrics>,
    ) -> Verdict;

    /// Simulate then evaluate.
    fn run(scenario: &Self::Scenario) -> (SimulationResult<Self::Metrics>, Verdict) {
        let result = Self::simulate(scenario);
        let verdict = Self::evaluate_expectations(scenario, &result);
        (result, verdict)
    }
}
