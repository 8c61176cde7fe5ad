use std::path::PathBuf;

use clap::Parser;

use mindora_bench::config::{ResolvedOutputs, SimulationConfig};
use mindora_bench::logging::init_logging;
use mindora_bench::simulate::SimulationRunner;

/// Simulation harness for the Mindora guessing engine.
#[derive(Debug, Parser)]
#[command(
    name = "mindora-bench",
    author,
    version,
    about = "Deterministic guessing-session simulator"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/bench.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of sessions to simulate.
    #[arg(long, value_name = "COUNT")]
    sessions: Option<usize>,

    /// Override the RNG seed for players and question noise.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the corpus snapshot path.
    #[arg(long, value_name = "FILE")]
    corpus: Option<String>,

    /// Override the probability of softened answers.
    #[arg(long, value_name = "P")]
    noise: Option<f64>,

    /// Teach the secret entity back to the engine after a miss.
    #[arg(long)]
    teach_on_miss: bool,

    /// Consult the HTTP copilot when an API key is set in the environment.
    #[arg(long)]
    copilot: bool,

    /// Apply MINDORA_* environment overrides on top of the configured engine block.
    #[arg(long)]
    engine_env: bool,

    /// Exit after validating the configuration (no session is played).
    #[arg(long)]
    validate_only: bool,

    /// Enable structured telemetry regardless of config.
    #[arg(long)]
    structured_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = SimulationConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(sessions) = cli.sessions {
        config.sessions.count = sessions;
    }

    if let Some(seed) = cli.seed {
        config.sessions.seed = Some(seed);
    }

    if let Some(corpus) = cli.corpus {
        config.corpus = corpus;
    }

    if let Some(noise) = cli.noise {
        config.sessions.answer_noise = noise;
    }

    if cli.teach_on_miss {
        config.sessions.teach_on_miss = true;
    }

    if cli.copilot {
        config.sessions.copilot = true;
    }

    if cli.engine_env {
        config.engine = config
            .engine
            .with_env_reader(|key| std::env::var(key).ok());
    }

    if cli.structured_logs {
        config.logging.enable_structured = true;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let sessions = config.sessions.count;

    println!(
        "Loaded configuration '{run_id}' with {sessions} session{} against {}",
        if sessions == 1 { "" } else { "s" },
        config.corpus
    );

    let _logging_guard = init_logging(&config.logging, &outputs)?;
    let runner = SimulationRunner::new(config, outputs)?;

    if cli.validate_only {
        println!("Validation-only mode: simulation skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    println!(
        "Simulation complete for '{run_id}': {}/{} correct → {} rows at {}",
        summary.successes,
        summary.sessions_played,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!("Summary table: {}", summary.summary_path.display());
    if let Some(telemetry_path) = summary.telemetry_path.as_ref() {
        println!("Telemetry log: {}", telemetry_path.display());
    }
    if let Some(outputs) = summary.telemetry_outputs.as_ref() {
        println!("Telemetry summary (JSON): {}", outputs.json_path.display());
        println!(
            "Telemetry summary (Markdown): {}",
            outputs.markdown_path.display()
        );
        if let Some(entropy) = outputs.summary.turns.avg_entropy_bits {
            println!(
                "  Turns: {} events, avg posterior entropy {:.3} bits",
                outputs.summary.turns.count, entropy
            );
        }
    }

    Ok(())
}
