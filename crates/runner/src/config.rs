//! Run configuration.
//!
//! A [`RunConfig`] is assembled from CLI flags on top of the defaults in an
//! optional `runner.toml` ([`RunnerFile`]).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors building a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid shim {spec:?}: expected LANG=PROGRAM [ARGS..]")]
    InvalidShim { spec: String },
}

/// An alternate implementation invoked as a subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShimSpec {
    /// Label written into the shim's envelopes when it omits one.
    pub language: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ShimSpec {
    /// Create a shim with no extra arguments.
    pub fn new(language: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument passed before `--corpus`.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl FromStr for ShimSpec {
    type Err = ConfigError;

    /// Parse `LANG=PROGRAM [ARGS..]`, arguments split on whitespace.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidShim {
            spec: spec.to_owned(),
        };
        let (language, command) = spec.split_once('=').ok_or_else(invalid)?;
        let language = language.trim();
        let mut words = command.split_whitespace();
        let program = words.next().ok_or_else(invalid)?;
        if language.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            language: language.to_owned(),
            program: program.to_owned(),
            args: words.map(str::to_owned).collect(),
        })
    }
}

/// Contents of `runner.toml`. Every key is optional.
///
/// ```toml
/// jobs = 4
/// summary_out = "out/summary.json"
/// envelope_out = "out/envelopes.jsonl"
///
/// [[shim]]
/// language = "go"
/// program = "go"
/// args = ["run", "./cmd/validate"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerFile {
    pub jobs: Option<usize>,
    pub summary_out: Option<PathBuf>,
    pub envelope_out: Option<PathBuf>,
    pub isolate_parse_errors: Option<bool>,
    #[serde(default, rename = "shim")]
    pub shims: Vec<ShimSpec>,
}

impl RunnerFile {
    /// Parse a config document.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration for one corpus run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Corpus file to load.
    pub corpus: PathBuf,
    /// Run only the scenario with this id.
    pub scenario: Option<String>,
    /// Include `stress`-tagged scenarios and record wall-time percentiles.
    pub stress: bool,
    /// Run sequentially and stop after the first failing scenario.
    pub fail_fast: bool,
    /// Worker threads; `None` uses one per core.
    pub jobs: Option<usize>,
    pub summary_out: Option<PathBuf>,
    /// JSONL file receiving one envelope per scenario per implementation.
    pub envelope_out: Option<PathBuf>,
    /// Print this implementation's envelopes to stdout.
    pub emit_envelope: bool,
    /// Report malformed entries as failed scenarios instead of aborting.
    pub isolate_parse_errors: bool,
    pub shims: Vec<ShimSpec>,
}

impl RunConfig {
    /// Create a configuration for a corpus with default settings.
    pub fn new(corpus: impl Into<PathBuf>) -> Self {
        Self {
            corpus: corpus.into(),
            scenario: None,
            stress: false,
            fail_fast: false,
            jobs: None,
            summary_out: None,
            envelope_out: None,
            emit_envelope: false,
            isolate_parse_errors: false,
            shims: Vec::new(),
        }
    }

    /// Restrict the run to one scenario.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_stress(mut self, stress: bool) -> Self {
        self.stress = stress;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the worker thread count. Zero means one per core.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = (jobs > 0).then_some(jobs);
        self
    }

    pub fn with_summary_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_out = Some(path.into());
        self
    }

    pub fn with_envelope_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.envelope_out = Some(path.into());
        self
    }

    pub fn with_emit_envelope(mut self, emit: bool) -> Self {
        self.emit_envelope = emit;
        self
    }

    pub fn with_isolate_parse_errors(mut self, isolate: bool) -> Self {
        self.isolate_parse_errors = isolate;
        self
    }

    /// Add an alternate implementation to compare against.
    pub fn with_shim(mut self, shim: ShimSpec) -> Self {
        self.shims.push(shim);
        self
    }

    /// Fill unset values from a config file. File shims run after CLI shims.
    pub fn with_file_defaults(mut self, file: &RunnerFile) -> Self {
        if self.jobs.is_none() {
            self.jobs = file.jobs.filter(|jobs| *jobs > 0);
        }
        if self.summary_out.is_none() {
            self.summary_out = file.summary_out.clone();
        }
        if self.envelope_out.is_none() {
            self.envelope_out = file.envelope_out.clone();
        }
        self.isolate_parse_errors |= file.isolate_parse_errors.unwrap_or(false);
        self.shims.extend(file.shims.iter().cloned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_shim_spec_parsing() {
        let shim: ShimSpec = "go=go run ./cmd/validate".parse().unwrap();
        assert_eq!(
            shim,
            ShimSpec::new("go", "go").with_arg("run").with_arg("./cmd/validate")
        );

        let bare: ShimSpec = "python=python3".parse().unwrap();
        assert!(bare.args.is_empty());

        for spec in ["go", "=go run", "go=", "go=   "] {
            let err = spec.parse::<ShimSpec>().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidShim { .. }), "{spec}");
        }
    }

    #[test]
    fn test_runner_file_parsing() {
        let file = RunnerFile::parse(
            r#"
            jobs = 4
            summary_out = "out/summary.json"

            [[shim]]
            language = "go"
            program = "go"
            args = ["run", "./cmd/validate"]
            "#,
        )
        .unwrap();
        assert_eq!(file.jobs, Some(4));
        assert_eq!(file.summary_out, Some(PathBuf::from("out/summary.json")));
        assert_eq!(file.envelope_out, None);
        assert_eq!(file.shims.len(), 1);
        assert_eq!(file.shims[0].args, vec!["run", "./cmd/validate"]);

        assert!(RunnerFile::parse("workers = 2").is_err());
    }

    #[test]
    fn test_cli_values_override_file() {
        let file = RunnerFile {
            jobs: Some(8),
            summary_out: Some("file-summary.json".into()),
            envelope_out: Some("file-envelopes.jsonl".into()),
            isolate_parse_errors: Some(true),
            shims: vec![ShimSpec::new("go", "validate-go")],
        };
        let config = RunConfig::new("corpus.json")
            .with_jobs(2)
            .with_summary_out("cli-summary.json")
            .with_shim(ShimSpec::new("python", "validate.py"))
            .with_file_defaults(&file);

        assert_eq!(config.jobs, Some(2));
        assert_eq!(config.summary_out, Some(PathBuf::from("cli-summary.json")));
        assert_eq!(config.envelope_out, Some(PathBuf::from("file-envelopes.jsonl")));
        assert!(config.isolate_parse_errors);
        let languages: Vec<_> = config.shims.iter().map(|shim| shim.language.as_str()).collect();
        assert_eq!(languages, vec!["python", "go"]);
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "jobs = \"many\"").unwrap();
        let err = RunnerFile::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = RunnerFile::load(Path::new("/nonexistent/runner.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
        assert_eq!(RunConfig::new("c.json").with_jobs(0).jobs, None);
    }
}
