//! FoxWhisper adversarial scenario CLI
//!
//! Runs a domain corpus (or a replay-storm profile set) and reports pass/fail
//! per scenario. Logs go to stderr; stdout carries the summary or envelopes.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use foxwhisper_replay::{run_profile_set, ProfileSet};
use foxwhisper_runner::report::write_json;
use foxwhisper_runner::{self_test, Domain, EnvelopeWriter, RunConfig, RunnerFile, ShimSpec};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foxwhisper-adversarial")]
#[command(about = "Adversarial scenario simulators for FoxWhisper")]
#[command(version)]
struct Cli {
    /// Runner config file supplying output paths, job count and shims
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an epoch-fork corpus
    Epoch(CorpusArgs),

    /// Run a multi-device desync corpus
    Desync(CorpusArgs),

    /// Run a corrupted record-chain corpus
    Eare(CorpusArgs),

    /// Run an SFU-abuse corpus
    Sfu(CorpusArgs),

    /// Run a replay-storm profile set
    ReplayStorm {
        /// Profile set JSON
        #[arg(long)]
        profiles: PathBuf,

        /// Write the summary here instead of stdout
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Run the built-in two-device desync scenario
    SelfTest,
}

#[derive(Args)]
struct CorpusArgs {
    /// Corpus JSON (an array of scenarios)
    #[arg(long)]
    corpus: PathBuf,

    /// Run only this scenario
    #[arg(long)]
    scenario: Option<String>,

    /// Include stress-tagged scenarios and report wall-time percentiles
    #[arg(long)]
    stress: bool,

    /// Stop after the first failing scenario
    #[arg(long)]
    fail_fast: bool,

    /// Worker threads (default: one per core)
    #[arg(long)]
    jobs: Option<usize>,

    /// Write the summary here instead of stdout
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Write envelopes of every implementation as JSON lines
    #[arg(long)]
    envelope_out: Option<PathBuf>,

    /// Print this implementation's envelopes to stdout
    #[arg(long)]
    emit_envelope: bool,

    /// Report malformed entries as failed scenarios instead of aborting
    #[arg(long)]
    isolate_parse_errors: bool,

    /// Alternate implementation, LANG=PROGRAM [ARGS..] (repeatable)
    #[arg(long = "shim", value_name = "LANG=PROGRAM")]
    shims: Vec<ShimSpec>,
}

impl CorpusArgs {
    fn into_config(self, file: Option<&RunnerFile>) -> RunConfig {
        let mut config = RunConfig::new(self.corpus)
            .with_stress(self.stress)
            .with_fail_fast(self.fail_fast)
            .with_emit_envelope(self.emit_envelope)
            .with_isolate_parse_errors(self.isolate_parse_errors);
        if let Some(scenario) = self.scenario {
            config = config.with_scenario(scenario);
        }
        if let Some(jobs) = self.jobs {
            config = config.with_jobs(jobs);
        }
        if let Some(path) = self.summary_out {
            config = config.with_summary_out(path);
        }
        if let Some(path) = self.envelope_out {
            config = config.with_envelope_out(path);
        }
        for shim in self.shims {
            config = config.with_shim(shim);
        }
        match file {
            Some(file) => config.with_file_defaults(file),
            None => config,
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let file = cli.config.as_deref().map(RunnerFile::load).transpose()?;

    match cli.command {
        Commands::Epoch(args) => run_corpus(Domain::Epoch, args.into_config(file.as_ref())),
        Commands::Desync(args) => run_corpus(Domain::Desync, args.into_config(file.as_ref())),
        Commands::Eare(args) => run_corpus(Domain::Eare, args.into_config(file.as_ref())),
        Commands::Sfu(args) => run_corpus(Domain::Sfu, args.into_config(file.as_ref())),
        Commands::ReplayStorm {
            profiles,
            summary_out,
        } => {
            let set = ProfileSet::load(&profiles)
                .with_context(|| format!("loading replay profiles {}", profiles.display()))?;
            let summary = run_profile_set(&set);
            let summary_out =
                summary_out.or_else(|| file.as_ref().and_then(|file| file.summary_out.clone()));
            emit_summary(summary_out.as_deref(), &summary)?;
            info!(
                passed = summary.passed,
                failed = summary.failed,
                status = summary.status,
                "Replay storm finished"
            );
            Ok(summary.is_success())
        }
        Commands::SelfTest => {
            let record = self_test()?;
            println!("{} {}", record.scenario_id, record.status);
            if record.is_pass() {
                info!(scenario = %record.scenario_id, "Self-test passed");
            } else {
                warn!(
                    scenario = %record.scenario_id,
                    failures = ?record.failures,
                    "Self-test failed"
                );
            }
            Ok(record.is_pass())
        }
    }
}

fn run_corpus(domain: Domain, config: RunConfig) -> anyhow::Result<bool> {
    let outcome = domain
        .run(&config)
        .with_context(|| format!("running {domain} corpus {}", config.corpus.display()))?;
    outcome.write_reports(&config)?;

    if config.emit_envelope {
        let mut writer = EnvelopeWriter::new(std::io::stdout().lock());
        for envelope in outcome.own_envelopes() {
            writer.write(envelope)?;
        }
        writer.finish()?;
    } else if config.summary_out.is_none() {
        emit_summary(None, &outcome.summary)?;
    }

    Ok(outcome.is_success())
}

fn emit_summary<T: Serialize>(path: Option<&Path>, summary: &T) -> anyhow::Result<()> {
    match path {
        Some(path) => write_json(path, summary)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, summary)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
