mod cli;
mod config;
mod coordinate;
mod guidance;
mod ids;
mod logging;
mod process;
mod propose;
mod store;
mod summary;
mod tasks;
mod trial;
mod tuner;
mod universe;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::universe::DEFAULT_SHARD_PREFIX;

#[derive(Parser)]
#[command(name = "guidance-lab", version, about = "Trial coordinator and guidance tuner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a universe file into deterministic shard files.
    PlanShards {
        universe: PathBuf,
        #[arg(long)]
        shards: usize,
        #[arg(long, default_value = "shards")]
        out_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_SHARD_PREFIX)]
        prefix: String,
    },
    /// Stage a run on shared storage and emit its job manifest.
    Submit {
        universe: PathBuf,
        #[arg(long)]
        shards: usize,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, default_value = "runs")]
        run_root: PathBuf,
    },
    /// Execute one (condition, shard) job of a submitted run.
    RunShard {
        run_id: String,
        #[arg(long)]
        condition: String,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        tasks: PathBuf,
        #[arg(long)]
        guidance: Option<PathBuf>,
        #[arg(long, default_value = "runs")]
        run_root: PathBuf,
    },
    /// Run or resume the guidance hill climb for one target repository.
    Tune {
        target: String,
        #[arg(long)]
        tasks: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "tuning")]
        out_dir: PathBuf,
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        candidates: Option<usize>,
        #[arg(long)]
        tasks_per_score: Option<usize>,
        #[arg(long)]
        char_budget: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Aggregate a run's records into a cross-condition summary.
    Summarize {
        run_id: String,
        #[arg(long)]
        conditions: Vec<String>,
        #[arg(long, default_value = "runs")]
        run_root: PathBuf,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        Command::PlanShards {
            universe,
            shards,
            out_dir,
            prefix,
        } => cli::plan_shards(&universe, shards, &out_dir, &prefix),
        Command::Submit {
            universe,
            shards,
            config,
            run_id,
            run_root,
        } => cli::submit(&run_root, run_id, &universe, shards, &config),
        Command::RunShard {
            run_id,
            condition,
            index,
            config,
            tasks,
            guidance,
            run_root,
        } => cli::run_shard(
            &run_root,
            &run_id,
            &condition,
            index,
            &config,
            &tasks,
            guidance.as_deref(),
        ),
        Command::Tune {
            target,
            tasks,
            config,
            out_dir,
            iterations,
            candidates,
            tasks_per_score,
            char_budget,
            seed,
        } => {
            let overrides = cli::TuneOverrides {
                iterations,
                candidates_per_iter: candidates,
                tasks_per_score,
                char_budget,
                sample_seed: seed,
            };
            cli::tune(&target, &tasks, &config, &out_dir, &overrides)
        }
        Command::Summarize {
            run_id,
            conditions,
            run_root,
        } => cli::summarize(&run_root, &run_id, &conditions),
    }
}
