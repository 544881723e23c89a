//! CLI command implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::{ExperimentConfig, validate_condition_name};
use crate::coordinate::{self, RunLayout, RunMeta};
use crate::guidance::GuidanceArtifact;
use crate::ids::make_run_id;
use crate::propose::CommandProposer;
use crate::store::{Partition, export_predictions};
use crate::summary;
use crate::tasks::load_tasks;
use crate::trial::{CommandAgent, CommandEvaluator, run_shard_trials};
use crate::tuner::{TrialScorer, run_tuning_loop};
use crate::universe;

/// Plan shards for a universe file and write them to a directory.
pub fn plan_shards(
    universe_path: &Path,
    shard_count: usize,
    out_dir: &Path,
    prefix: &str,
) -> Result<()> {
    let ids = universe::read_item_ids(universe_path)?;
    let shards = universe::plan_shards(&ids, shard_count)?;
    let paths = universe::write_shard_files(out_dir, prefix, &shards)?;
    for (shard, path) in shards.iter().zip(&paths) {
        println!("shard: items={} file={}", shard.len(), path.display());
    }
    println!(
        "plan: items={} shards={} sha256={}",
        ids.len(),
        shard_count,
        universe::universe_sha256(universe_path)?
    );
    Ok(())
}

/// Stage a run on shared storage and emit its job manifest.
pub fn submit(
    run_root: &Path,
    run_id: Option<String>,
    universe_path: &Path,
    shard_count: usize,
    config_path: &Path,
) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let run_id = run_id.unwrap_or_else(|| make_run_id("exp"));
    let meta = coordinate::submit(
        run_root,
        &run_id,
        universe_path,
        shard_count,
        &config.experiment.conditions,
    )?;

    let layout = RunLayout::new(run_root, &run_id);
    println!(
        "submit: run_id={} items={} shards={} conditions={}",
        meta.run_id,
        meta.item_count,
        meta.shard_count,
        meta.conditions.join(",")
    );
    println!("submit: manifest={}", layout.manifest_path().display());
    Ok(())
}

/// Execute one (condition, shard) job against the staged run layout.
#[allow(clippy::too_many_arguments)]
pub fn run_shard(
    run_root: &Path,
    run_id: &str,
    condition: &str,
    shard_index: usize,
    config_path: &Path,
    tasks_path: &Path,
    guidance_path: Option<&Path>,
) -> Result<()> {
    validate_condition_name(condition)?;
    let config = ExperimentConfig::load(config_path)?;
    let layout = RunLayout::new(run_root, run_id);
    if !layout.meta_path().exists() {
        bail!("run {} not found under {}", run_id, run_root.display());
    }
    let meta = RunMeta::load(&layout.meta_path())?;
    if !meta.conditions.contains(&condition.to_string()) {
        bail!(
            "condition {} was not submitted with run {} (submitted: {})",
            condition,
            run_id,
            meta.conditions.join(", ")
        );
    }
    if shard_index >= meta.shard_count {
        bail!(
            "shard index {} out of range for {} shards",
            shard_index,
            meta.shard_count
        );
    }

    // The frozen universe must match what was fingerprinted at submit time.
    let actual = universe::universe_sha256(&layout.universe_path())?;
    if actual != meta.universe_sha256 {
        bail!(
            "universe fingerprint mismatch for run {}: expected {}, found {}",
            run_id,
            meta.universe_sha256,
            actual
        );
    }

    let ids = universe::read_item_ids(&layout.universe_path())?;
    let shards = universe::plan_shards(&ids, meta.shard_count)?;
    let shard_ids = &shards[shard_index];
    let tasks = load_tasks(tasks_path, Some(shard_ids))?;
    debug!(run_id, condition, shard_index, items = tasks.len(), "shard resolved");

    let guidance_text = match guidance_path {
        Some(path) => {
            let artifact = GuidanceArtifact::load(path)?;
            info!(
                target = %artifact.target,
                version = artifact.version,
                "guidance loaded"
            );
            Some(artifact.render())
        }
        None => None,
    };

    let partition = Partition::new(layout.partition_dir(condition, shard_index));
    let agent = CommandAgent::new(
        config.agent.command.clone(),
        Duration::from_secs(config.agent.timeout_s),
        config.agent.step_limit,
    );
    let evaluator = CommandEvaluator::new(
        config.harness.command.clone(),
        Duration::from_secs(config.harness.timeout_s),
        partition.dir().join("harness"),
        config.experiment.model.clone(),
    );

    let stats = run_shard_trials(
        &agent,
        &evaluator,
        &tasks,
        condition,
        guidance_text.as_deref(),
        &partition,
    )?;

    let preds_path = partition.dir().join("preds.jsonl");
    let exported = export_predictions(&partition, &preds_path, &config.experiment.model)?;

    println!(
        "run-shard: run_id={} condition={} shard={} attempted={} skipped={}",
        run_id, condition, shard_index, stats.attempted, stats.skipped
    );
    println!(
        "run-shard: passed={} failed={} errored={} predictions={}",
        stats.passed, stats.failed, stats.errored, exported
    );
    Ok(())
}

/// Knob overrides for `tune`; unset values fall back to the experiment
/// file's `[tuning]` table.
#[derive(Debug, Default)]
pub struct TuneOverrides {
    pub iterations: Option<u32>,
    pub candidates_per_iter: Option<usize>,
    pub tasks_per_score: Option<usize>,
    pub char_budget: Option<usize>,
    pub sample_seed: Option<u64>,
}

/// Run (or resume) a hill climb for one target.
pub fn tune(
    target: &str,
    tasks_path: &Path,
    config_path: &Path,
    output_dir: &Path,
    overrides: &TuneOverrides,
) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let mut params = config.tuning.clone();
    if let Some(iterations) = overrides.iterations {
        params.iterations = iterations;
    }
    if let Some(k) = overrides.candidates_per_iter {
        params.candidates_per_iter = k;
    }
    if let Some(n) = overrides.tasks_per_score {
        params.tasks_per_score = n;
    }
    if let Some(budget) = overrides.char_budget {
        params.char_budget = budget;
    }
    if let Some(seed) = overrides.sample_seed {
        params.sample_seed = seed;
    }
    params.validate().context("tune overrides")?;

    let all_tasks = load_tasks(tasks_path, None)?;
    let tasks: Vec<_> = all_tasks
        .into_iter()
        .filter(|task| task.repo == target)
        .collect();
    if tasks.is_empty() {
        bail!("no tasks for target {} in {}", target, tasks_path.display());
    }
    info!(target, tasks = tasks.len(), iterations = params.iterations, "tuning");

    let proposer = CommandProposer::new(
        config.proposer.command.clone(),
        Duration::from_secs(config.proposer.timeout_s),
    );
    let agent = CommandAgent::new(
        config.agent.command.clone(),
        Duration::from_secs(config.agent.timeout_s),
        config.agent.step_limit,
    );
    let evaluator = CommandEvaluator::new(
        config.harness.command.clone(),
        Duration::from_secs(config.harness.timeout_s),
        output_dir.join("harness"),
        config.experiment.model.clone(),
    );
    let scorer = TrialScorer::new(&agent, &evaluator);

    let state = run_tuning_loop(&proposer, &scorer, target, &tasks, &params, output_dir)?;

    println!(
        "tune: target={} iterations={} versions_scored={}",
        target,
        state.completed_iterations,
        state.history.len()
    );
    println!(
        "tune: best_version={} best_score={:.3} output={}",
        state.best_version,
        state.best_score,
        output_dir.display()
    );
    Ok(())
}

/// Aggregate a run across conditions and print the headline numbers.
pub fn summarize(run_root: &Path, run_id: &str, conditions: &[String]) -> Result<()> {
    let wanted = if conditions.is_empty() {
        None
    } else {
        Some(conditions)
    };
    let summary = summary::summarize(run_root, run_id, wanted)?;

    for (condition, s) in &summary.conditions {
        println!(
            "summary: condition={} resolved={}/{} rate={:.3} errors={} missing={}",
            condition, s.resolved, s.total, s.rate, s.errors, s.missing
        );
    }
    if let Some(delta) = &summary.delta {
        println!(
            "summary: delta {} vs {}: resolved={:+} rate={:+.3}",
            delta.other, delta.base, delta.resolved, delta.rate
        );
    }
    println!(
        "summary: run_id={} complete={} file={}",
        summary.run_id,
        summary.complete,
        RunLayout::new(run_root, run_id).summary_path().display()
    );
    Ok(())
}
