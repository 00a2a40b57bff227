//! Shared scenario scaffold for the FoxWhisper adversarial simulators.
//!
//! This crate provides everything the domain simulators have in common:
//!
//! - **Corpus parsing**: [`load_corpus`], [`parse_corpus`] and the per-entry
//!   [`parse_corpus_entries`] built on the strict [`FieldReader`]
//! - **Timelines**: [`Timeline`] orders events by `(t, kind, declaration index)`
//! - **Results**: [`SimulationResult`] with an ordered, duplicate-free [`ErrorSet`]
//! - **Verdicts**: [`Verdict`] and the shared [`Checks`] used by every evaluator
//! - **The [`Simulator`] trait**: parse → simulate → evaluate
//!
//! # Architecture
//!
//! ```text
//! corpus JSON ──► ScenarioHeader::parse ──► Simulator::parse_scenario
//!                                                   │
//!                                                   ▼
//!                 Timeline ───────────────► Simulator::simulate
//!                                                   │
//!                                                   ▼
//!                                           SimulationResult<M>
//!                                                   │
//!                                                   ▼
//!                                    Simulator::evaluate_expectations ──► Verdict
//! ```
//!
//! Parse errors ([`CorpusError`]) and expectation failures ([`Verdict`]) are
//! disjoint: the former means the input was unusable, the latter is the normal
//! outcome of an adversarial scenario that did not behave as declared.

mod corpus;
mod error;
mod errors;
mod fields;
mod result;
mod timeline;
mod traits;
mod verdict;

pub use corpus::{
    load_corpus, parse_corpus, parse_corpus_entries, parse_scenario, read_corpus_entries,
    read_document, CorpusEntry, CorpusScenario, ScenarioHeader,
};
pub use error::CorpusError;
pub use errors::ErrorSet;
pub use fields::FieldReader;
pub use result::SimulationResult;
pub use timeline::{EventKind, TimedEvent, Timeline};
pub use traits::Simulator;
pub use verdict::{Checks, Status, Verdict};
