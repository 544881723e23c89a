//! Trial execution: one task through the agent and the harness.
//!
//! The executor never aborts a shard because one item misbehaved. Agent
//! failures (timeouts, empty patches, nonzero exits) are legitimate
//! experimental results and recorded as `Fail`; only infrastructure faults
//! around the harness become `Error`.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::process;
use crate::store::{Outcome, Partition, Prediction, TrialRecord};
use crate::tasks::TaskInstance;

pub const GUIDANCE_BLOCK_START: &str = "# REPO GUIDANCE (AUTO-TUNED)";
pub const GUIDANCE_BLOCK_END: &str = "# END REPO GUIDANCE";

/// What the agent produced for one task.
#[derive(Debug)]
pub struct AgentOutput {
    pub patch: String,
    pub timed_out: bool,
}

/// Generates a patch for a task given an assembled prompt.
pub trait Agent {
    fn generate(&self, task: &TaskInstance, prompt: &str) -> Result<AgentOutput>;
}

/// Judges whether a patch resolves its task.
pub trait Evaluator {
    fn evaluate(&self, task: &TaskInstance, patch: &str) -> Result<bool>;
}

/// Agent backed by an external command: prompt on stdin, patch on stdout.
pub struct CommandAgent {
    command: Vec<String>,
    timeout: Duration,
    step_limit: u32,
}

impl CommandAgent {
    pub fn new(command: Vec<String>, timeout: Duration, step_limit: u32) -> Self {
        Self {
            command,
            timeout,
            step_limit,
        }
    }
}

impl Agent for CommandAgent {
    fn generate(&self, task: &TaskInstance, prompt: &str) -> Result<AgentOutput> {
        let mut cmd = process::build_command(&self.command, &[])?;
        cmd.env("AGENT_TASK_ID", &task.instance_id)
            .env("AGENT_REPO", &task.repo)
            .env("AGENT_BASE_COMMIT", &task.base_commit)
            .env("AGENT_STEP_LIMIT", self.step_limit.to_string());
        let output = process::run_with_timeout(cmd, Some(prompt.as_bytes()), self.timeout)
            .context("run agent command")?;
        if output.timed_out {
            return Ok(AgentOutput {
                patch: String::new(),
                timed_out: true,
            });
        }
        if !output.status.success() {
            bail!(
                "agent exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(AgentOutput {
            patch: String::from_utf8_lossy(&output.stdout).into_owned(),
            timed_out: false,
        })
    }
}

/// Evaluator backed by the external harness command.
///
/// The patch is written as a single-record prediction file; the harness is
/// invoked as `<command> <preds_path> <instance_id>` and answers with its
/// exit code (0 resolved, 1 unresolved, anything else is a fault).
pub struct CommandEvaluator {
    command: Vec<String>,
    timeout: Duration,
    work_dir: PathBuf,
    model: String,
}

impl CommandEvaluator {
    pub fn new(
        command: Vec<String>,
        timeout: Duration,
        work_dir: impl Into<PathBuf>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            command,
            timeout,
            work_dir: work_dir.into(),
            model: model.into(),
        }
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(&self, task: &TaskInstance, patch: &str) -> Result<bool> {
        fs::create_dir_all(&self.work_dir)
            .with_context(|| format!("create harness dir {}", self.work_dir.display()))?;
        let prediction = Prediction {
            instance_id: task.instance_id.clone(),
            model_name_or_path: self.model.clone(),
            model_patch: patch.to_string(),
        };
        let preds_path = self
            .work_dir
            .join(format!("pred_{}.jsonl", task.instance_id));
        let mut line = serde_json::to_string(&prediction).context("serialize prediction")?;
        line.push('\n');
        fs::write(&preds_path, line)
            .with_context(|| format!("write {}", preds_path.display()))?;

        let args = vec![
            preds_path.display().to_string(),
            task.instance_id.clone(),
        ];
        let cmd = process::build_command(&self.command, &args)?;
        let output =
            process::run_with_timeout(cmd, None, self.timeout).context("run harness command")?;
        if output.timed_out {
            bail!("harness timed out for {}", task.instance_id);
        }
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => bail!(
                "harness exited with {:?} for {}: {}",
                code,
                task.instance_id,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }
}

/// Assemble the agent prompt for a task, injecting guidance when present.
///
/// The guidance block sits between fixed delimiter lines so downstream
/// tooling can locate and strip it.
pub fn build_prompt(task: &TaskInstance, guidance: Option<&str>) -> String {
    let mut prompt = format!(
        "Repository: {}\nBase commit: {}\n\n{}\n",
        task.repo, task.base_commit, task.problem_statement
    );
    if let Some(text) = guidance
        && !text.trim().is_empty()
    {
        prompt.push_str(&format!(
            "\n{GUIDANCE_BLOCK_START}\n{text}\n{GUIDANCE_BLOCK_END}\n"
        ));
    }
    prompt
}

/// Run one trial and produce its record. Never returns an error for
/// per-item failures; those become `Fail` or `Error` records.
pub fn run_trial(
    agent: &dyn Agent,
    evaluator: &dyn Evaluator,
    task: &TaskInstance,
    condition: &str,
    guidance: Option<&str>,
) -> TrialRecord {
    let started = Instant::now();
    let prompt = build_prompt(task, guidance);

    let (outcome, reason, patch) = match agent.generate(task, &prompt) {
        Ok(output) if output.timed_out => {
            (Outcome::Fail, Some("timeout".to_string()), String::new())
        }
        Ok(output) if output.patch.trim().is_empty() => {
            (Outcome::Fail, Some("empty_patch".to_string()), String::new())
        }
        Ok(output) => match evaluator.evaluate(task, &output.patch) {
            Ok(true) => (Outcome::Pass, None, output.patch),
            Ok(false) => (Outcome::Fail, None, output.patch),
            Err(err) => {
                warn!(item_id = %task.instance_id, %err, "harness fault");
                (Outcome::Error, Some(format!("{err:#}")), output.patch)
            }
        },
        Err(err) => {
            warn!(item_id = %task.instance_id, %err, "agent failed");
            (Outcome::Fail, Some(format!("{err:#}")), String::new())
        }
    };

    TrialRecord {
        item_id: task.instance_id.clone(),
        condition: condition.to_string(),
        outcome,
        reason,
        patch,
        duration_secs: started.elapsed().as_secs_f64(),
        recorded_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Tally of one shard run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShardRunStats {
    pub attempted: usize,
    pub skipped: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Run every not-yet-recorded task in a shard, appending records as each
/// trial completes. Already recorded items are skipped so a resubmitted
/// job resumes where its predecessor stopped.
pub fn run_shard_trials(
    agent: &dyn Agent,
    evaluator: &dyn Evaluator,
    tasks: &[TaskInstance],
    condition: &str,
    guidance: Option<&str>,
    partition: &Partition,
) -> Result<ShardRunStats> {
    let recorded = partition.recorded_ids()?;
    let mut stats = ShardRunStats::default();

    for task in tasks {
        if recorded.contains(&task.instance_id) {
            stats.skipped += 1;
            continue;
        }
        let record = run_trial(agent, evaluator, task, condition, guidance);
        match record.outcome {
            Outcome::Pass => stats.passed += 1,
            Outcome::Fail => stats.failed += 1,
            Outcome::Error => stats.errored += 1,
        }
        partition.append(&record)?;
        stats.attempted += 1;
        info!(
            item_id = %task.instance_id,
            outcome = ?record.outcome,
            "trial recorded"
        );
    }
    Ok(stats)
}
