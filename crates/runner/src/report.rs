//! Run summaries, cross-implementation envelopes and their writers.

use foxwhisper_core::{CorpusError, CorpusScenario, SimulationResult, Status, Verdict};
use foxwhisper_types::FailureReason;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Language label of envelopes produced by this binary.
pub const LANGUAGE: &str = "rust";

/// Errors writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write envelopes: {0}")]
    Envelope(#[from] std::io::Error),

    #[error("failed to build wall-time histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

impl ReportError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One scenario line of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRecord {
    pub scenario_id: String,
    pub status: Status,
    pub failures: Vec<FailureReason>,
    /// Raised error categories, or the parse error for a rejected entry.
    pub errors: Vec<String>,
    pub metrics: Value,
    pub notes: Vec<String>,
}

impl ScenarioRecord {
    /// Record an evaluated scenario.
    pub fn evaluated<M: Serialize>(
        scenario_id: &str,
        result: &SimulationResult<M>,
        verdict: &Verdict,
    ) -> Result<Self, ReportError> {
        Ok(Self {
            scenario_id: scenario_id.to_owned(),
            status: verdict.status,
            failures: verdict.failures.clone(),
            errors: category_names(result),
            metrics: serde_json::to_value(&result.metrics)?,
            notes: result.notes.clone(),
        })
    }

    /// Record a corpus entry that could not be parsed.
    pub fn rejected(label: &str, error: &CorpusError) -> Self {
        Self {
            scenario_id: label.to_owned(),
            status: Status::Fail,
            failures: vec![FailureReason::CorpusError],
            errors: vec![error.to_string()],
            metrics: Value::Object(Map::new()),
            notes: Vec::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }
}

fn category_names<M>(result: &SimulationResult<M>) -> Vec<String> {
    result
        .errors
        .iter()
        .map(|category| category.as_str().to_owned())
        .collect()
}

/// Stress-mode wall-time percentiles, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WallTimeStats {
    pub samples: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl WallTimeStats {
    /// Summarize per-scenario wall times. `None` when there are no samples.
    pub fn from_samples(samples_us: &[u64]) -> Result<Option<Self>, ReportError> {
        if samples_us.is_empty() {
            return Ok(None);
        }
        let mut histogram = Histogram::<u64>::new(3)?;
        for sample in samples_us {
            histogram.saturating_record(*sample);
        }
        Ok(Some(Self {
            samples: histogram.len(),
            p50_us: histogram.value_at_quantile(0.5),
            p99_us: histogram.value_at_quantile(0.99),
            max_us: histogram.max(),
        }))
    }
}

/// Summary of one corpus run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub domain: &'static str,
    pub corpus: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Alternate envelopes that disagreed with this implementation.
    pub parity_mismatches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_time: Option<WallTimeStats>,
    pub scenarios: Vec<ScenarioRecord>,
}

impl RunSummary {
    /// Build a summary from scenario records in corpus order.
    pub fn new(domain: &'static str, corpus: &Path, scenarios: Vec<ScenarioRecord>) -> Self {
        let passed = scenarios.iter().filter(|record| record.is_pass()).count();
        Self {
            domain,
            corpus: corpus.display().to_string(),
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            parity_mismatches: 0,
            wall_time: None,
            scenarios,
        }
    }

    /// Whether every scenario passed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Per-scenario record exchanged between implementations of the same corpus.
///
/// Status, failures and errors are plain strings so envelopes from other
/// implementations decode even when their vocabularies drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub scenario_id: String,
    #[serde(default)]
    pub language: String,
    pub status: String,
    #[serde(default)]
    pub detection: bool,
    #[serde(default)]
    pub detection_ms: Option<u64>,
    #[serde(default)]
    pub recovery_ms: Option<u64>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub failures: Vec<String>,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time_ms: Option<f64>,
}

impl Envelope {
    /// Envelope for a scenario evaluated by this implementation.
    pub fn evaluated<T: CorpusScenario, M: Serialize>(
        scenario: &T,
        result: &SimulationResult<M>,
        verdict: &Verdict,
    ) -> Result<Self, ReportError> {
        Ok(Self {
            scenario_id: scenario.scenario_id().to_string(),
            language: LANGUAGE.to_owned(),
            status: verdict.status.as_str().to_owned(),
            detection: result.detection,
            detection_ms: result.detection_ms,
            recovery_ms: result.recovery_ms,
            errors: category_names(result),
            notes: result.notes.clone(),
            failures: verdict
                .failures
                .iter()
                .map(|failure| failure.as_str().to_owned())
                .collect(),
            metrics: serde_json::to_value(&result.metrics)?,
            tags: scenario.tags().iter().cloned().collect(),
            wall_time_ms: None,
        })
    }

    /// Attach the measured wall time.
    pub fn with_wall_time_ms(mut self, wall_time_ms: f64) -> Self {
        self.wall_time_ms = Some(wall_time_ms);
        self
    }

    /// Fields compared across implementations that differ from `other`.
    pub fn parity_diff(&self, other: &Envelope) -> Vec<&'static str> {
        let mut diff = Vec::new();
        if self.status != other.status {
            diff.push("status");
        }
        if self.detection != other.detection {
            diff.push("detection");
        }
        if self.detection_ms != other.detection_ms {
            diff.push("detection_ms");
        }
        if self.errors != other.errors {
            diff.push("errors");
        }
        diff
    }
}

/// Writes envelopes as JSON lines.
pub struct EnvelopeWriter<W: Write> {
    out: W,
}

impl EnvelopeWriter<BufWriter<File>> {
    /// Create (or truncate) an envelope file, creating parent directories.
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        create_parent(path)?;
        let file = File::create(path).map_err(ReportError::io(path))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> EnvelopeWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one envelope line.
    pub fn write(&mut self, envelope: &Envelope) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.out, envelope)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered lines and return the underlying writer.
    pub fn finish(mut self) -> Result<W, ReportError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Write a value as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    create_parent(path)?;
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    std::fs::write(path, text).map_err(ReportError::io(path))
}

fn create_parent(path: &Path) -> Result<(), ReportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(ReportError::io(parent))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foxwhisper_core::{ErrorSet, ScenarioHeader};
    use foxwhisper_types::ErrorCategory;
    use serde_json::json;

    struct Fixture(ScenarioHeader);

    impl CorpusScenario for Fixture {
        fn header(&self) -> &ScenarioHeader {
            &self.0
        }
    }

    fn detected_result() -> SimulationResult<Value> {
        let mut errors = ErrorSet::new();
        errors.insert(ErrorCategory::DivergenceDetected);
        SimulationResult {
            detection: true,
            detection_ms: Some(0),
            recovery_ms: Some(10),
            errors,
            notes: vec!["healed".into()],
            metrics: json!({"max_dr_version_delta": 1}),
        }
    }

    #[test]
    fn test_envelope_from_evaluation() {
        let scenario = Fixture(ScenarioHeader::new("desync-01", 0).with_tag("sanity"));
        let verdict = Verdict::from_failures(vec![FailureReason::DetectionMismatch]);
        let envelope = Envelope::evaluated(&scenario, &detected_result(), &verdict)
            .unwrap()
            .with_wall_time_ms(1.5);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "scenario_id": "desync-01",
                "language": "rust",
                "status": "fail",
                "detection": true,
                "detection_ms": 0,
                "recovery_ms": 10,
                "errors": ["DIVERGENCE_DETECTED"],
                "notes": ["healed"],
                "failures": ["detection_mismatch"],
                "metrics": {"max_dr_version_delta": 1},
                "tags": ["sanity"],
                "wall_time_ms": 1.5,
            })
        );
    }

    #[test]
    fn test_minimal_envelope_decodes() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"scenario_id": "x", "status": "pass"}"#).unwrap();
        assert_eq!(envelope.language, "");
        assert!(!envelope.detection);
        assert_eq!(envelope.detection_ms, None);
        assert!(envelope.errors.is_empty());
    }

    #[test]
    fn test_parity_diff_fields() {
        let scenario = Fixture(ScenarioHeader::new("desync-01", 0));
        let verdict = Verdict::from_failures(Vec::new());
        let ours = Envelope::evaluated(&scenario, &detected_result(), &verdict).unwrap();

        let mut theirs = ours.clone();
        theirs.language = "go".into();
        theirs.notes.clear();
        theirs.recovery_ms = None;
        assert!(ours.parity_diff(&theirs).is_empty());

        theirs.detection_ms = Some(3);
        theirs.errors.push("MESSAGE_LOSS".into());
        assert_eq!(ours.parity_diff(&theirs), vec!["detection_ms", "errors"]);
    }

    #[test]
    fn test_summary_counts_and_rejected_record() {
        let err = CorpusError::schema("bad-01", "expectations missing detected");
        let verdict = Verdict::from_failures(Vec::new());
        let ok = ScenarioRecord::evaluated("good-01", &detected_result(), &verdict).unwrap();
        let summary = RunSummary::new(
            "desync",
            Path::new("corpus.json"),
            vec![ok, ScenarioRecord::rejected("bad-01", &err)],
        );
        assert_eq!((summary.total, summary.passed, summary.failed), (2, 1, 1));
        assert!(!summary.is_success());

        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("wall_time").is_none());
        assert_eq!(value["scenarios"][1]["failures"], json!(["corpus_error"]));
        assert_eq!(
            value["scenarios"][1]["errors"],
            json!(["[bad-01] expectations missing detected"])
        );
        assert_eq!(value["scenarios"][0]["errors"], json!(["DIVERGENCE_DETECTED"]));
    }

    #[test]
    fn test_wall_time_percentiles() {
        assert_eq!(WallTimeStats::from_samples(&[]).unwrap(), None);

        let samples: Vec<u64> = (1..=100).collect();
        let stats = WallTimeStats::from_samples(&samples).unwrap().unwrap();
        assert_eq!(stats.samples, 100);
        assert!((49..=51).contains(&stats.p50_us), "{stats:?}");
        assert!((98..=100).contains(&stats.p99_us), "{stats:?}");
        assert_eq!(stats.max_us, 100);
    }

    #[test]
    fn test_envelope_lines_and_json_file() {
        let scenario = Fixture(ScenarioHeader::new("a", 0));
        let verdict = Verdict::from_failures(Vec::new());
        let envelope = Envelope::evaluated(&scenario, &detected_result(), &verdict).unwrap();

        let mut writer = EnvelopeWriter::new(Vec::new());
        writer.write(&envelope).unwrap();
        writer.write(&envelope).unwrap();
        let bytes = writer.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
        let decoded: Envelope = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(decoded, envelope);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/summary.json");
        write_json(&path, &json!({"ok": true})).unwrap();
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"ok": true}));
    }
}
