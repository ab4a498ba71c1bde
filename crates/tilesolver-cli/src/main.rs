use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use serde::Deserialize;
use tilesolver_contracts::categories::CategoryRegistry;
use tilesolver_contracts::errors::SolveOutcome;
use tilesolver_contracts::events::EventWriter;
use tilesolver_contracts::report::write_report;
use tilesolver_engine::{
    ChallengeSolver, DryrunScorer, FrameHandle, HttpScorer, InteractionAdapter, ScorerHandle,
    SolverOptions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tilesolver", version, about = "Tiled image-selection challenge solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a solve session against a replay scenario file.
    Solve(SolveArgs),
    /// List the built-in category registry.
    Categories,
}

#[derive(Debug, Parser)]
struct SolveArgs {
    /// JSON scenario describing the challenge rounds to replay.
    #[arg(long)]
    scenario: PathBuf,
    /// Output directory for events.jsonl and report.json.
    #[arg(long)]
    out: PathBuf,
    /// Base URL of an HTTP similarity scorer; omit for the dry-run scorer.
    #[arg(long)]
    scorer_url: Option<String>,
    #[arg(long, default_value_t = 15)]
    max_rounds: u32,
    #[arg(long, default_value_t = 10)]
    frame_timeout_secs: u64,
}

/// One scripted challenge presentation.
#[derive(Debug, Deserialize)]
struct ScenarioRound {
    instruction: String,
    tile_count: usize,
    grid_image: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    rounds: Vec<ScenarioRound>,
}

/// Adapter that replays a scripted scenario instead of driving a browser.
/// Once the scenario runs out of rounds the frame wait reports a timeout,
/// which the engine reads as solved.
struct ReplayAdapter {
    rounds: VecDeque<(ScenarioRound, RgbImage)>,
    next_frame_id: u64,
}

impl ReplayAdapter {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&raw)
            .with_context(|| format!("invalid scenario file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut rounds = VecDeque::new();
        for round in scenario.rounds {
            let image_path = if round.grid_image.is_absolute() {
                round.grid_image.clone()
            } else {
                base.join(&round.grid_image)
            };
            let grid = image::open(&image_path)
                .with_context(|| format!("failed opening grid image {}", image_path.display()))?
                .to_rgb8();
            rounds.push_back((round, grid));
        }
        Ok(Self {
            rounds,
            next_frame_id: 0,
        })
    }

    fn current(&self) -> Result<&(ScenarioRound, RgbImage)> {
        self.rounds
            .front()
            .context("replay adapter asked for a round after the scenario ended")
    }
}

impl InteractionAdapter for ReplayAdapter {
    fn wait_for_challenge_frame(&mut self, _timeout: Duration) -> Result<Option<FrameHandle>> {
        if self.rounds.is_empty() {
            return Ok(None);
        }
        self.next_frame_id += 1;
        Ok(Some(FrameHandle::new(self.next_frame_id)))
    }

    fn read_instruction_text(&mut self, _frame: &FrameHandle) -> Result<String> {
        Ok(self.current()?.0.instruction.clone())
    }

    fn count_tiles(&mut self, _frame: &FrameHandle) -> Result<usize> {
        Ok(self.current()?.0.tile_count)
    }

    fn capture_grid_image(&mut self, _frame: &FrameHandle) -> Result<RgbImage> {
        Ok(self.current()?.1.clone())
    }

    fn click_tile(&mut self, _frame: &FrameHandle, position: usize) -> Result<()> {
        info!(position, "replay: tile clicked");
        Ok(())
    }

    fn click_submit(&mut self, _frame: &FrameHandle) -> Result<()> {
        info!("replay: submit clicked");
        self.rounds.pop_front();
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tilesolver error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Solve(args) => run_solve(args),
        Command::Categories => {
            run_categories();
            Ok(0)
        }
    }
}

fn run_solve(args: SolveArgs) -> Result<i32> {
    let adapter = ReplayAdapter::load(&args.scenario)?;
    let scorer = match args.scorer_url.as_deref() {
        Some(url) => ScorerHandle::ready(HttpScorer::new(url)?)?,
        None => ScorerHandle::ready(DryrunScorer)?,
    };

    let session_id = format!("session-{}", uuid::Uuid::new_v4());
    let events = EventWriter::new(args.out.join("events.jsonl"), session_id);
    let mut solver = ChallengeSolver::new(
        adapter,
        scorer,
        CategoryRegistry::default(),
        events,
        SolverOptions {
            frame_timeout: Duration::from_secs(args.frame_timeout_secs),
            max_rounds: args.max_rounds,
        },
    )?;

    let outcome = solver.solve()?;
    let report = solver.build_report(&outcome);
    write_report(&args.out.join("report.json"), &report)?;

    match outcome {
        SolveOutcome::Solved { rounds_processed } => {
            println!("solved after {rounds_processed} round(s)");
            Ok(0)
        }
        SolveOutcome::Failed(failure) => {
            println!(
                "failed in round {} ({}): {}",
                failure.round,
                failure.state.as_str(),
                failure.error
            );
            Ok(2)
        }
    }
}

fn run_categories() {
    let registry = CategoryRegistry::default();
    for (name, config) in registry.list() {
        println!(
            "{name}: {} positive / {} negative prompts, threshold {:.2}",
            config.positive_prompts.len(),
            config.negative_prompts.len(),
            config.threshold
        );
    }
}
