//! Corpus runner: select, execute, compare and summarize.
//!
//! ```text
//! corpus ──► entries ──► select (--scenario, stress tag) ──► execute
//!                                                             │
//!              parallel on a rayon pool, or sequential until │
//!              the first failure with --fail-fast             ▼
//!                               alternates (parity) ◄── records + envelopes
//!                                        │
//!                                        ▼
//!                                   RunSummary
//! ```

use crate::alternate::{AlternateEvaluator, SubprocessShim};
use crate::config::RunConfig;
use crate::report::{
    write_json, Envelope, EnvelopeWriter, ReportError, RunSummary, ScenarioRecord, WallTimeStats,
    LANGUAGE,
};
use foxwhisper_core::{
    load_corpus, read_corpus_entries, CorpusEntry, CorpusError, CorpusScenario, Simulator,
};
use foxwhisper_desync::{sanity_scenario, DeviceDesyncSimulator};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Scenarios carrying this tag only run in stress mode.
pub const STRESS_TAG: &str = "stress";

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("no scenarios matched in {corpus}")]
    NoScenariosMatched { corpus: PathBuf },

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Envelopes in corpus order; each of ours is followed by the
    /// alternates' envelopes for the same scenario.
    pub envelopes: Vec<Envelope>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Envelopes produced by this implementation.
    pub fn own_envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.envelopes
            .iter()
            .filter(|envelope| envelope.language == LANGUAGE)
    }

    /// Write the summary and envelope files named by `config`.
    pub fn write_reports(&self, config: &RunConfig) -> Result<(), ReportError> {
        if let Some(path) = &config.summary_out {
            write_json(path, &self.summary)?;
            debug!(path = %path.display(), "Wrote summary");
        }
        if let Some(path) = &config.envelope_out {
            let mut writer = EnvelopeWriter::create(path)?;
            for envelope in &self.envelopes {
                writer.write(envelope)?;
            }
            writer.finish()?;
            debug!(path = %path.display(), count = self.envelopes.len(), "Wrote envelopes");
        }
        Ok(())
    }
}

/// Run a corpus, comparing against the subprocess shims in `config`.
pub fn run_corpus<S: Simulator>(config: &RunConfig) -> Result<RunOutcome, RunError> {
    let alternates: Vec<Box<dyn AlternateEvaluator>> = config
        .shims
        .iter()
        .map(|spec| {
            let shim = SubprocessShim::new(spec.clone(), &config.corpus);
            Box::new(shim) as Box<dyn AlternateEvaluator>
        })
        .collect();
    run_corpus_with::<S>(config, &alternates)
}

/// Run a corpus against explicit alternate evaluators.
pub fn run_corpus_with<S: Simulator>(
    config: &RunConfig,
    alternates: &[Box<dyn AlternateEvaluator>],
) -> Result<RunOutcome, RunError> {
    let entries = select(load_entries::<S>(config)?, config);
    if entries.is_empty() {
        return Err(RunError::NoScenariosMatched {
            corpus: config.corpus.clone(),
        });
    }

    info!(
        domain = S::DOMAIN,
        corpus = %config.corpus.display(),
        scenarios = entries.len(),
        stress = config.stress,
        "Running corpus"
    );

    let executed = if config.fail_fast {
        execute_until_failure::<S>(&entries, config.stress)?
    } else {
        execute_parallel::<S>(&entries, config)?
    };

    let mut records = Vec::with_capacity(executed.len());
    let mut envelopes = Vec::new();
    let mut samples = Vec::new();
    let mut parity_mismatches = 0;

    for run in executed {
        if let Some(ours) = run.envelope {
            let theirs = compare_alternates(&ours, alternates, &mut parity_mismatches);
            envelopes.push(ours);
            envelopes.extend(theirs);
        }
        samples.extend(run.wall_time_us);
        records.push(run.record);
    }

    let mut summary = RunSummary::new(S::DOMAIN, &config.corpus, records);
    summary.parity_mismatches = parity_mismatches;
    if config.stress {
        summary.wall_time = WallTimeStats::from_samples(&samples)?;
    }

    info!(
        domain = S::DOMAIN,
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        parity_mismatches,
        "Corpus finished"
    );

    Ok(RunOutcome { summary, envelopes })
}

/// Run the built-in two-device desync scenario.
pub fn self_test() -> Result<ScenarioRecord, RunError> {
    let scenario = sanity_scenario()?;
    let (result, verdict) = DeviceDesyncSimulator::run(&scenario);
    Ok(ScenarioRecord::evaluated(
        scenario.scenario_id().as_str(),
        &result,
        &verdict,
    )?)
}

fn load_entries<S: Simulator>(
    config: &RunConfig,
) -> Result<Vec<CorpusEntry<S::Scenario>>, CorpusError> {
    if config.isolate_parse_errors {
        return read_corpus_entries::<S>(&config.corpus);
    }
    let entries = load_corpus::<S>(&config.corpus)?
        .into_iter()
        .enumerate()
        .map(|(index, scenario)| CorpusEntry {
            index,
            label: scenario.scenario_id().to_string(),
            scenario: Ok(scenario),
        })
        .collect();
    Ok(entries)
}

fn select<T: CorpusScenario>(
    entries: Vec<CorpusEntry<T>>,
    config: &RunConfig,
) -> Vec<CorpusEntry<T>> {
    let total = entries.len();
    let selected: Vec<_> = entries
        .into_iter()
        .filter(|entry| config.scenario.as_deref().map_or(true, |id| entry.label == id))
        .filter(|entry| match &entry.scenario {
            Ok(scenario) => config.stress || !scenario.has_tag(STRESS_TAG),
            Err(_) => true,
        })
        .collect();
    debug!(total, selected = selected.len(), "Selected scenarios");
    selected
}

struct Executed {
    record: ScenarioRecord,
    envelope: Option<Envelope>,
    wall_time_us: Option<u64>,
}

fn execute_parallel<S: Simulator>(
    entries: &[CorpusEntry<S::Scenario>],
    config: &RunConfig,
) -> Result<Vec<Executed>, RunError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = config.jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build()?;

    // Indexed collect keeps corpus order.
    let executed = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| execute::<S>(entry, config.stress))
            .collect::<Result<Vec<_>, _>>()
    })?;
    Ok(executed)
}

fn execute_until_failure<S: Simulator>(
    entries: &[CorpusEntry<S::Scenario>],
    stress: bool,
) -> Result<Vec<Executed>, RunError> {
    let mut executed = Vec::new();
    for entry in entries {
        let run = execute::<S>(entry, stress)?;
        let failed = !run.record.is_pass();
        executed.push(run);
        if failed {
            info!(
                scenario = %entry.label,
                skipped = entries.len() - executed.len(),
                "Stopping after first failure"
            );
            break;
        }
    }
    Ok(executed)
}

fn execute<S: Simulator>(
    entry: &CorpusEntry<S::Scenario>,
    stress: bool,
) -> Result<Executed, ReportError> {
    let scenario = match &entry.scenario {
        Ok(scenario) => scenario,
        Err(err) => {
            warn!(
                index = entry.index,
                scenario = %entry.label,
                error = %err,
                "Corpus entry rejected"
            );
            return Ok(Executed {
                record: ScenarioRecord::rejected(&entry.label, err),
                envelope: None,
                wall_time_us: None,
            });
        }
    };

    let started = Instant::now();
    let result = S::simulate(scenario);
    let elapsed = started.elapsed();
    let wall_time_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let verdict = S::evaluate_expectations(scenario, &result);

    debug!(
        domain = S::DOMAIN,
        scenario = %entry.label,
        status = %verdict.status,
        failures = ?verdict.failures,
        wall_time_us,
        "Scenario evaluated"
    );

    let record = ScenarioRecord::evaluated(&entry.label, &result, &verdict)?;
    let mut envelope = Envelope::evaluated(scenario, &result, &verdict)?;
    if stress {
        envelope = envelope.with_wall_time_ms(elapsed.as_secs_f64() * 1000.0);
    }

    Ok(Executed {
        record,
        envelope: Some(envelope),
        wall_time_us: Some(wall_time_us),
    })
}

fn compare_alternates(
    ours: &Envelope,
    alternates: &[Box<dyn AlternateEvaluator>],
    mismatches: &mut usize,
) -> Vec<Envelope> {
    let mut theirs = Vec::with_capacity(alternates.len());
    for alternate in alternates {
        match alternate.run(&ours.scenario_id) {
            Ok(envelope) => {
                let diff = ours.parity_diff(&envelope);
                if !diff.is_empty() {
                    *mismatches += 1;
                    warn!(
                        scenario = %ours.scenario_id,
                        language = %envelope.language,
                        fields = ?diff,
                        "Parity mismatch"
                    );
                }
                theirs.push(envelope);
            }
            Err(err) => {
                warn!(
                    scenario = %ours.scenario_id,
                    language = alternate.language(),
                    error = %err,
                    "Alternate evaluator failed"
                );
            }
        }
    }
    theirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alternate::ShimError;
    use foxwhisper_test_helpers::{corpus, desync, merge, without};
    use foxwhisper_types::FailureReason;
    use serde_json::{json, Value};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    fn passing(scenario_id: &str) -> Value {
        desync::scenario(
            scenario_id,
            vec![desync::device("a", 5), desync::device("b", 5)],
            vec![
                desync::send(0, "m1", "a", &["b"], 5),
                desync::recv(10, "m1", "b", 5),
            ],
        )
    }

    fn failing(scenario_id: &str) -> Value {
        desync::expect(passing(scenario_id), json!({"detected": true}))
    }

    fn stress(scenario_id: &str) -> Value {
        merge(passing(scenario_id), json!({"tags": ["stress"]}))
    }

    fn corpus_file(scenarios: Vec<Value>) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", corpus(scenarios)).unwrap();
        file
    }

    fn run(config: &RunConfig) -> Result<RunOutcome, RunError> {
        run_corpus::<DeviceDesyncSimulator>(config)
    }

    fn ids(outcome: &RunOutcome) -> Vec<&str> {
        outcome
            .summary
            .scenarios
            .iter()
            .map(|record| record.scenario_id.as_str())
            .collect()
    }

    struct Fixed {
        language: &'static str,
        status: Option<&'static str>,
    }

    impl AlternateEvaluator for Fixed {
        fn language(&self) -> &str {
            self.language
        }

        fn run(&self, scenario_id: &str) -> Result<Envelope, ShimError> {
            let status = self.status.ok_or_else(|| ShimError::NoOutput {
                language: self.language.to_owned(),
            })?;
            Ok(serde_json::from_value(json!({
                "scenario_id": scenario_id,
                "language": self.language,
                "status": status,
            }))
            .unwrap())
        }
    }

    #[traced_test]
    #[test]
    fn test_stress_scenarios_excluded_by_default() {
        let file = corpus_file(vec![passing("p1"), stress("s1"), passing("p2")]);

        let outcome = run(&RunConfig::new(file.path())).unwrap();
        assert_eq!(ids(&outcome), vec!["p1", "p2"]);
        assert!(outcome.is_success());
        assert!(outcome.summary.wall_time.is_none());
        assert!(outcome.envelopes.iter().all(|env| env.wall_time_ms.is_none()));

        let outcome = run(&RunConfig::new(file.path()).with_stress(true)).unwrap();
        assert_eq!(ids(&outcome), vec!["p1", "s1", "p2"]);
        assert_eq!(outcome.summary.wall_time.map(|stats| stats.samples), Some(3));
        assert!(outcome.envelopes.iter().all(|env| env.wall_time_ms.is_some()));
    }

    #[test]
    fn test_parallel_run_keeps_corpus_order() {
        let scenarios: Vec<_> = (0..24)
            .map(|i| {
                if i % 5 == 0 {
                    failing(&format!("sc-{i:02}"))
                } else {
                    passing(&format!("sc-{i:02}"))
                }
            })
            .collect();
        let file = corpus_file(scenarios);

        let outcome = run(&RunConfig::new(file.path()).with_jobs(4)).unwrap();
        let expected: Vec<String> = (0..24).map(|i| format!("sc-{i:02}")).collect();
        assert_eq!(ids(&outcome), expected);
        assert_eq!(outcome.summary.total, 24);
        assert_eq!(outcome.summary.failed, 5);
        assert!(!outcome.is_success());
        assert!(outcome.summary.scenarios[0]
            .failures
            .contains(&FailureReason::DetectionMismatch));
    }

    #[test]
    fn test_scenario_filter() {
        let file = corpus_file(vec![passing("p1"), failing("f1")]);

        let outcome = run(&RunConfig::new(file.path()).with_scenario("f1")).unwrap();
        assert_eq!(ids(&outcome), vec!["f1"]);

        let err = run(&RunConfig::new(file.path()).with_scenario("missing")).unwrap_err();
        assert!(matches!(err, RunError::NoScenariosMatched { .. }));

        let stress_only = corpus_file(vec![stress("s1")]);
        let err = run(&RunConfig::new(stress_only.path())).unwrap_err();
        assert!(err.to_string().starts_with("no scenarios matched"));
    }

    #[test]
    fn test_fail_fast_stops_after_first_failure() {
        let file = corpus_file(vec![passing("p1"), failing("f1"), passing("p2")]);

        let outcome = run(&RunConfig::new(file.path()).with_fail_fast(true)).unwrap();
        assert_eq!(ids(&outcome), vec!["p1", "f1"]);
        assert_eq!((outcome.summary.passed, outcome.summary.failed), (1, 1));

        let outcome = run(&RunConfig::new(file.path())).unwrap();
        assert_eq!(outcome.summary.total, 3);
    }

    #[test]
    fn test_malformed_entry_is_fatal_unless_isolated() {
        let file = corpus_file(vec![
            passing("p1"),
            without(passing("bad"), "expectations"),
        ]);

        let err = run(&RunConfig::new(file.path())).unwrap_err();
        assert!(matches!(err, RunError::Corpus(_)));

        let outcome = run(&RunConfig::new(file.path()).with_isolate_parse_errors(true)).unwrap();
        assert_eq!(ids(&outcome), vec!["p1", "bad"]);
        let rejected = &outcome.summary.scenarios[1];
        assert_eq!(rejected.failures, vec![FailureReason::CorpusError]);
        assert!(rejected.errors[0].starts_with("[bad]"), "{:?}", rejected.errors);
        assert_eq!(outcome.summary.failed, 1);
        // Rejected entries have no envelope.
        assert_eq!(outcome.envelopes.len(), 1);
    }

    #[test]
    fn test_missing_corpus_is_fatal() {
        let err = run(&RunConfig::new("/nonexistent/corpus.json")).unwrap_err();
        assert!(matches!(err, RunError::Corpus(CorpusError::Io { .. })));
    }

    #[traced_test]
    #[test]
    fn test_parity_mismatches_counted() {
        let file = corpus_file(vec![passing("p1"), failing("f1")]);
        let alternates: Vec<Box<dyn AlternateEvaluator>> = vec![
            Box::new(Fixed {
                language: "go",
                status: Some("pass"),
            }),
            Box::new(Fixed {
                language: "broken",
                status: None,
            }),
        ];

        let outcome =
            run_corpus_with::<DeviceDesyncSimulator>(&RunConfig::new(file.path()), &alternates)
                .unwrap();
        assert_eq!(outcome.summary.parity_mismatches, 1);

        let languages: Vec<_> = outcome
            .envelopes
            .iter()
            .map(|env| (env.scenario_id.as_str(), env.language.as_str()))
            .collect();
        assert_eq!(
            languages,
            vec![("p1", "rust"), ("p1", "go"), ("f1", "rust"), ("f1", "go")]
        );
        assert_eq!(outcome.own_envelopes().count(), 2);
        assert!(logs_contain("Parity mismatch"));
        assert!(logs_contain("Alternate evaluator failed"));
    }

    #[test]
    fn test_write_reports() {
        let file = corpus_file(vec![passing("p1"), failing("f1")]);
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(file.path())
            .with_summary_out(dir.path().join("out/summary.json"))
            .with_envelope_out(dir.path().join("out/envelopes.jsonl"));

        let outcome = run(&config).unwrap();
        outcome.write_reports(&config).unwrap();

        let summary: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["domain"], "desync");
        assert_eq!(summary["total"], 2);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["parity_mismatches"], 0);
        assert_eq!(summary["scenarios"][1]["status"], "fail");

        let lines = std::fs::read_to_string(dir.path().join("out/envelopes.jsonl")).unwrap();
        let envelopes: Vec<Envelope> = lines
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[1].scenario_id, "f1");
        assert_eq!(envelopes[1].status, "fail");
        assert_eq!(envelopes[0].tags, vec!["desync"]);
    }

    #[test]
    fn test_self_test_passes() {
        let record = self_test().unwrap();
        assert!(record.is_pass(), "{record:?}");
        assert_eq!(record.scenario_id, "desync-sanity-inline");
        assert_eq!(record.errors, vec!["DIVERGENCE_DETECTED"]);
    }
}
