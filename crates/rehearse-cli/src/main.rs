//! `rehearse`: evaluate a support agent against scripted customer scenarios.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rehearse_core::{
    EvaluationResult, EvaluationSummary, ResultsArchive, Role, Scenario, ScenarioSet,
};
use rehearse_runtime::{EvalContext, RunObserver, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "rehearse",
    version,
    about = "Evaluate a support agent with simulated customer conversations"
)]
struct Args {
    /// Scenario document (JSON or YAML)
    #[arg(long, default_value = "scenarios/default_scenarios.json")]
    scenarios: PathBuf,

    /// Run only the scenario with this name
    #[arg(long)]
    scenario: Option<String>,

    /// List the scenarios in the document and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Directory of markdown documents behind the knowledge tool
    #[arg(long)]
    knowledge_dir: Option<PathBuf>,

    /// Runtime config file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Conversations in flight at once
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds between conversation starts
    #[arg(long)]
    rate_limit_delay: Option<f64>,

    /// One conversation at a time, no delay between starts
    #[arg(long)]
    sequential: bool,

    /// Cap on support turns per conversation
    #[arg(long)]
    max_turns: Option<u32>,

    /// Skip the rubric judge
    #[arg(long)]
    no_llm_eval: bool,

    /// Print every transcript after the summary
    #[arg(long)]
    show_conversations: bool,

    /// Where results_<timestamp>.json is written
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RuntimeConfig::default(),
        };

        if let Some(dir) = &self.knowledge_dir {
            config.knowledge_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(delay) = self.rate_limit_delay {
            config.start_stagger = Duration::try_from_secs_f64(delay)
                .with_context(|| format!("invalid --rate-limit-delay {delay}"))?;
        }
        if self.sequential {
            config = config.sequential();
        }
        if self.max_turns.is_some() {
            config.max_turns = self.max_turns;
        }
        if self.no_llm_eval {
            config.llm_evaluation = false;
        }

        config.validate().context("invalid runtime configuration")?;
        Ok(config)
    }
}

/// Logs scenario progress.
struct ProgressLog;

impl RunObserver for ProgressLog {
    fn on_scenario_started(&self, index: usize, total: usize, scenario: &Scenario) {
        tracing::info!(
            scenario = %scenario.name,
            persona = %scenario.persona,
            "[{}/{}] Starting",
            index + 1,
            total
        );
    }

    fn on_turn(&self, scenario: &Scenario, turn: &rehearse_core::ConversationTurn) {
        tracing::debug!(
            scenario = %scenario.name,
            role = %turn.role,
            turn = turn.turn_number,
            tools = turn.tool_uses.len(),
            "Turn recorded"
        );
    }

    fn on_scenario_finished(&self, index: usize, total: usize, result: &EvaluationResult) {
        match result.error() {
            Some(error) => tracing::warn!(
                scenario = %result.scenario.name,
                error,
                "[{}/{}] Errored",
                index + 1,
                total
            ),
            None => tracing::info!(
                scenario = %result.scenario.name,
                status = %result.status(),
                score = format_args!("{:.2}", result.score),
                turns = result.turn_count,
                "[{}/{}] Finished",
                index + 1,
                total
            ),
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().with_target(false))
        .init();
}

fn list_scenarios(set: &ScenarioSet) {
    println!("{} scenario(s):", set.len());
    for (i, scenario) in set.scenarios.iter().enumerate() {
        let number = scenario.scenario_number.unwrap_or(i as u32 + 1);
        println!(
            "  {:>2}. {} [{}, max {} turns]",
            number, scenario.name, scenario.persona, scenario.max_turns
        );
        println!("      {}", scenario.description);
    }
}

fn print_summary(results: &[EvaluationResult]) {
    let summary = EvaluationSummary::from_results(results);

    println!();
    println!("{}", "=".repeat(60));
    println!("Evaluation summary");
    println!("{}", "=".repeat(60));
    for result in results {
        let llm = result
            .llm_evaluation
            .as_ref()
            .map(|e| format!("  llm {}/5", e.score))
            .unwrap_or_default();
        println!(
            "  {:<8} {:<32} score {:.2}  turns {}{}",
            result.status().to_string(),
            result.scenario.name,
            result.score,
            result.turn_count,
            llm
        );
        if !result.topics_missing.is_empty() {
            println!("           missing: {}", result.topics_missing.join(", "));
        }
        if let Some(error) = result.error() {
            println!("           error: {}", error);
        }
    }
    println!("{}", "-".repeat(60));
    println!(
        "  total {}  pass {}  partial {}  fail {}  errored {}",
        summary.total, summary.passed, summary.partial, summary.failed, summary.errored
    );
    println!(
        "  average score {:.2}  average turns {:.1}",
        summary.average_score, summary.average_turns
    );
    if let Some(llm) = summary.average_llm_score {
        println!("  average llm score {:.2}/5", llm);
    }
}

fn print_conversations(results: &[EvaluationResult]) {
    for result in results {
        println!();
        println!("### {} ({})", result.scenario.name, result.status());
        for turn in &result.conversation.turns {
            let speaker = match turn.role {
                Role::User => "Customer",
                Role::Support => "Support",
            };
            println!("[{} {}] {}", speaker, turn.turn_number, turn.message);
            for usage in &turn.tool_uses {
                println!("    -> {}({:?})", usage.tool_name, usage.tool_input);
            }
        }
        if let Some(evaluation) = &result.llm_evaluation {
            println!("Judge: {}/5 {}", evaluation.score, evaluation.comment);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let set = ScenarioSet::from_file(&args.scenarios)
        .with_context(|| format!("loading scenarios from {}", args.scenarios.display()))?;

    if args.list_scenarios {
        list_scenarios(&set);
        return Ok(());
    }

    let scenarios = set
        .select(args.scenario.as_deref())
        .context("selecting scenarios")?;
    let config = args.runtime_config()?;
    let context = EvalContext::new(config).context("setting up the model provider")?;
    let evaluator = Arc::new(context.evaluator().context("creating responders")?);

    let results = context
        .scheduler()
        .with_observer(Arc::new(ProgressLog))
        .run_all(evaluator, &scenarios)
        .await;

    print_summary(&results);
    if args.show_conversations {
        print_conversations(&results);
    }

    let archive = ResultsArchive::new(&results);
    let file_name = format!(
        "results_{}.json",
        archive.generated_at.format("%Y%m%d_%H%M%S")
    );
    let path = archive
        .write_to(args.output_dir.join(file_name))
        .context("writing results archive")?;
    println!();
    println!("Results written to {}", path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
