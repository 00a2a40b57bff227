//! Alternate implementations of the same corpus, for cross-language parity.

use crate::config::ShimSpec;
use crate::report::Envelope;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors from an alternate implementation.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("{language} shim failed to start: {source}")]
    Spawn {
        language: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{language} shim exited with {status}: {stderr}")]
    Exit {
        language: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{language} shim printed no envelope")]
    NoOutput { language: String },

    #[error("{language} shim printed an invalid envelope: {source}")]
    Decode {
        language: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Another implementation that can evaluate a scenario of the loaded corpus.
pub trait AlternateEvaluator: Send + Sync {
    /// Language label used in logs and envelopes.
    fn language(&self) -> &str;

    /// Evaluate one scenario by id.
    fn run(&self, scenario_id: &str) -> Result<Envelope, ShimError>;
}

/// Runs `PROGRAM [ARGS..] --corpus <path> --scenario <id>` and reads the
/// first non-empty stdout line as an envelope.
#[derive(Debug, Clone)]
pub struct SubprocessShim {
    spec: ShimSpec,
    corpus: PathBuf,
}

impl SubprocessShim {
    pub fn new(spec: ShimSpec, corpus: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            corpus: corpus.into(),
        }
    }

    pub fn corpus(&self) -> &Path {
        &self.corpus
    }

    fn decode(&self, stdout: &str) -> Result<Envelope, ShimError> {
        let line = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| ShimError::NoOutput {
                language: self.spec.language.clone(),
            })?;
        let mut envelope: Envelope =
            serde_json::from_str(line).map_err(|source| ShimError::Decode {
                language: self.spec.language.clone(),
                source,
            })?;
        if envelope.language.is_empty() {
            envelope.language = self.spec.language.clone();
        }
        Ok(envelope)
    }
}

impl AlternateEvaluator for SubprocessShim {
    fn language(&self) -> &str {
        &self.spec.language
    }

    fn run(&self, scenario_id: &str) -> Result<Envelope, ShimError> {
        debug!(
            language = %self.spec.language,
            program = %self.spec.program,
            scenario = scenario_id,
            "Invoking shim"
        );
        let output = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg("--corpus")
            .arg(&self.corpus)
            .arg("--scenario")
            .arg(scenario_id)
            .output()
            .map_err(|source| ShimError::Spawn {
                language: self.spec.language.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ShimError::Exit {
                language: self.spec.language.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        self.decode(&String::from_utf8_lossy(&output.stdout))
    }
}
