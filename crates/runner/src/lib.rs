//! Corpus runner and reporter for the FoxWhisper adversarial simulators.
//!
//! Loads a domain corpus, runs every selected scenario through its
//! [`Simulator`](foxwhisper_core::Simulator), and produces:
//!
//! - a [`RunSummary`] with one [`ScenarioRecord`] per scenario
//! - one [`Envelope`] per scenario per implementation, for cross-language
//!   parity against [`AlternateEvaluator`]s
//!
//! The `foxwhisper-adversarial` binary wraps this crate and the replay-storm
//! profile runner.

pub mod alternate;
pub mod config;
pub mod domain;
pub mod report;
pub mod runner;

pub use alternate::{AlternateEvaluator, ShimError, SubprocessShim};
pub use config::{ConfigError, RunConfig, RunnerFile, ShimSpec};
pub use domain::Domain;
pub use report::{
    Envelope, EnvelopeWriter, ReportError, RunSummary, ScenarioRecord, WallTimeStats, LANGUAGE,
};
pub use runner::{run_corpus, run_corpus_with, self_test, RunError, RunOutcome, STRESS_TAG};
