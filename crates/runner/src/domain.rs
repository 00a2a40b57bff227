//! The event-driven simulator domains selectable from the CLI.

use crate::config::RunConfig;
use crate::runner::{run_corpus, RunError, RunOutcome};
use foxwhisper_core::Simulator;
use foxwhisper_desync::DeviceDesyncSimulator;
use foxwhisper_eare::CorruptedEareSimulator;
use foxwhisper_epoch::EpochForkSimulator;
use foxwhisper_sfu::SfuAbuseSimulator;
use std::fmt;

/// A corpus-driven simulator domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Epoch,
    Desync,
    Eare,
    Sfu,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::Epoch, Domain::Desync, Domain::Eare, Domain::Sfu];

    /// Domain name used in summaries and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Epoch => EpochForkSimulator::DOMAIN,
            Domain::Desync => DeviceDesyncSimulator::DOMAIN,
            Domain::Eare => CorruptedEareSimulator::DOMAIN,
            Domain::Sfu => SfuAbuseSimulator::DOMAIN,
        }
    }

    /// Run a corpus of this domain.
    pub fn run(self, config: &RunConfig) -> Result<RunOutcome, RunError> {
        match self {
            Domain::Epoch => run_corpus::<EpochForkSimulator>(config),
            Domain::Desync => run_corpus::<DeviceDesyncSimulator>(config),
            Domain::Eare => run_corpus::<CorruptedEareSimulator>(config),
            Domain::Sfu => run_corpus::<SfuAbuseSimulator>(config),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
