//! Hill-climbing guidance tuner.
//!
//! One climb per target: propose variants of the current best guidance,
//! score each on a seeded task sample, adopt only strict improvements.
//! All progress lives in `tuning_state.json` so an interrupted climb
//! resumes at the next incomplete iteration, and a scored version is never
//! scored twice.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TuneParams;
use crate::guidance::{self, GuidanceArtifact};
use crate::propose::Proposer;
use crate::store::{Outcome, Partition};
use crate::tasks::TaskInstance;
use crate::trial::{Agent, Evaluator, run_shard_trials};

/// Hard cap on tuning iterations, regardless of configuration.
pub const MAX_TUNING_ITERATIONS: u32 = 20;

const TUNING_CONDITION: &str = "tuning";

/// How a scored version entered the climb.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Initial,
    Variant,
}

/// One scored version in the climb's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub version: u32,
    pub iteration: u32,
    pub kind: CandidateKind,
    pub resolved: usize,
    pub total: usize,
    pub score: f64,
    pub adopted: bool,
}

/// Persistent state of one climb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuningState {
    pub target: String,
    pub best_version: u32,
    pub best_score: f64,
    /// Next version number to hand out. Versions are never reused, even
    /// across interrupted iterations.
    pub next_version: u32,
    pub completed_iterations: u32,
    pub history: Vec<HistoryEntry>,
}

impl TuningState {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut buf = serde_json::to_string_pretty(self).context("serialize tuning state")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp state {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("replace state {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse state {}", path.display()))
    }

    fn score_pairs(&self) -> Vec<(u32, f64)> {
        self.history.iter().map(|h| (h.version, h.score)).collect()
    }
}

/// Pass/fail tally of one scoring run. Errors are excluded entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub resolved: usize,
    pub total: usize,
}

impl ScoreOutcome {
    /// Resolve rate over decided trials; 0.0 when nothing was decided.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.resolved as f64 / self.total as f64
        }
    }
}

/// Scores one guidance version against a task sample.
pub trait Scorer {
    fn score(
        &self,
        artifact: &GuidanceArtifact,
        sample: &[TaskInstance],
        partition: &Partition,
    ) -> Result<ScoreOutcome>;
}

/// Scorer that runs real trials through the agent and harness.
pub struct TrialScorer<'a> {
    agent: &'a dyn Agent,
    evaluator: &'a dyn Evaluator,
}

impl<'a> TrialScorer<'a> {
    pub fn new(agent: &'a dyn Agent, evaluator: &'a dyn Evaluator) -> Self {
        Self { agent, evaluator }
    }
}

impl Scorer for TrialScorer<'_> {
    fn score(
        &self,
        artifact: &GuidanceArtifact,
        sample: &[TaskInstance],
        partition: &Partition,
    ) -> Result<ScoreOutcome> {
        run_shard_trials(
            self.agent,
            self.evaluator,
            sample,
            TUNING_CONDITION,
            Some(&artifact.render()),
            partition,
        )?;
        let mut outcome = ScoreOutcome {
            resolved: 0,
            total: 0,
        };
        for record in partition.read()?.values() {
            match record.outcome {
                Outcome::Pass => {
                    outcome.resolved += 1;
                    outcome.total += 1;
                }
                Outcome::Fail => outcome.total += 1,
                Outcome::Error => {}
            }
        }
        Ok(outcome)
    }
}

/// Draw a deterministic task sample for one scoring round.
///
/// The same (seed, draw) pair always yields the same sample; distinct draw
/// indices yield independent samples, so each iteration scores on fresh
/// tasks instead of overfitting to one fixed subset.
pub fn sample_tasks(all: &[TaskInstance], n: usize, seed: u64, draw: u64) -> Vec<TaskInstance> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(draw.wrapping_mul(0x9E37_79B9_7F4A_7C15)));
    all.choose_multiple(&mut rng, n.min(all.len()))
        .cloned()
        .collect()
}

/// Output paths of one climb rooted at an output directory.
#[derive(Debug, Clone)]
pub struct TunerLayout {
    root: PathBuf,
}

impl TunerLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("tuning_state.json")
    }

    pub fn version_path(&self, version: u32) -> PathBuf {
        self.root.join("versions").join(format!("v{version}.json"))
    }

    pub fn score_partition(&self, version: u32) -> Partition {
        Partition::new(self.root.join("scores").join(format!("v{version}")))
    }

    pub fn best_path(&self) -> PathBuf {
        self.root.join("best_guidance.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join("tuning_metrics.json")
    }

    pub fn params_path(&self) -> PathBuf {
        self.root.join("tune_params.json")
    }
}

#[derive(Debug, Serialize)]
struct TuningMetrics {
    target: String,
    completed_iterations: u32,
    candidates_scored: usize,
    adopted_count: usize,
    best_version: u32,
    best_score: f64,
    trajectory: Vec<TrajectoryPoint>,
}

#[derive(Debug, Serialize)]
struct TrajectoryPoint {
    version: u32,
    iteration: u32,
    score: f64,
    best_score: f64,
}

/// Run (or resume) the hill climb for one target.
pub fn run_tuning_loop(
    proposer: &dyn Proposer,
    scorer: &dyn Scorer,
    target: &str,
    tasks: &[TaskInstance],
    params: &TuneParams,
    output_dir: &Path,
) -> Result<TuningState> {
    params.validate()?;
    if tasks.is_empty() {
        bail!("no tasks available for tuning {target}");
    }
    let layout = TunerLayout::new(output_dir);

    let mut state = if layout.state_path().exists() {
        let state = TuningState::load(&layout.state_path())?;
        if state.target != target {
            bail!(
                "state at {} belongs to target {}, not {}",
                layout.state_path().display(),
                state.target,
                target
            );
        }
        info!(
            target,
            completed = state.completed_iterations,
            best_version = state.best_version,
            "resuming climb"
        );
        state
    } else {
        initialize_climb(proposer, scorer, target, tasks, params, &layout)?
    };

    for iteration in (state.completed_iterations + 1)..=params.iterations {
        let best = GuidanceArtifact::load(&layout.version_path(state.best_version))?;
        let sample = sample_tasks(tasks, params.tasks_per_score, params.sample_seed, u64::from(iteration));
        let variants = proposer.propose_variants(
            &best,
            state.best_score,
            &state.score_pairs(),
            params.candidates_per_iter,
        )?;
        if variants.is_empty() {
            warn!(target, iteration, "no variants proposed, iteration skipped");
        }

        for lines in variants {
            let joined_len = lines.join("\n").chars().count();
            if joined_len > params.char_budget {
                warn!(
                    target,
                    iteration,
                    chars = joined_len,
                    budget = params.char_budget,
                    "candidate over budget, rejected unscored"
                );
                continue;
            }

            let version = state.next_version;
            state.next_version += 1;
            let candidate = best.succeed(version, lines);
            candidate.save(&layout.version_path(version))?;
            // The bumped counter must hit disk before scoring starts: a run
            // resumed after a mid-score crash must never hand this version
            // number (or its score partition) to a different candidate.
            state.save(&layout.state_path())?;

            let outcome = scorer.score(&candidate, &sample, &layout.score_partition(version))?;
            let score = outcome.rate();
            let adopted = score > state.best_score;
            state.history.push(HistoryEntry {
                version,
                iteration,
                kind: CandidateKind::Variant,
                resolved: outcome.resolved,
                total: outcome.total,
                score,
                adopted,
            });
            if adopted {
                info!(target, version, score, previous = state.best_score, "candidate adopted");
                state.best_version = version;
                state.best_score = score;
                candidate.save(&layout.best_path())?;
            } else {
                info!(target, version, score, best = state.best_score, "candidate kept out");
            }
            state.save(&layout.state_path())?;
        }

        state.completed_iterations = iteration;
        state.save(&layout.state_path())?;
    }

    write_metrics(&state, &layout)?;
    let mut params_json = serde_json::to_string_pretty(params).context("serialize params")?;
    params_json.push('\n');
    fs::write(layout.params_path(), params_json)
        .with_context(|| format!("write {}", layout.params_path().display()))?;
    Ok(state)
}

/// Establish version 0 and score it, producing the initial state.
fn initialize_climb(
    proposer: &dyn Proposer,
    scorer: &dyn Scorer,
    target: &str,
    tasks: &[TaskInstance],
    params: &TuneParams,
    layout: &TunerLayout,
) -> Result<TuningState> {
    // A v0 left behind by a run that died while scoring is kept as-is;
    // re-proposing would overwrite an immutable version and mismatch any
    // records already in its score partition.
    let artifact = if layout.version_path(0).exists() {
        GuidanceArtifact::load(&layout.version_path(0))?
    } else {
        let lines = proposer.propose_initial(target, params.char_budget)?;
        if lines.is_empty() {
            bail!("proposer produced no initial guidance for {target}");
        }
        // Version 0 is trimmed rather than rejected: without a baseline
        // there is nothing to climb from.
        let artifact =
            GuidanceArtifact::new(target, lines, params.char_budget).trimmed_to_budget();
        for warning in guidance::validate(&artifact) {
            warn!(target, %warning, "initial guidance");
        }
        artifact.save(&layout.version_path(0))?;
        artifact
    };

    let sample = sample_tasks(tasks, params.tasks_per_score, params.sample_seed, 0);
    let outcome = scorer.score(&artifact, &sample, &layout.score_partition(0))?;
    let score = outcome.rate();
    info!(target, score, "baseline scored");

    artifact.save(&layout.best_path())?;
    let state = TuningState {
        target: target.to_string(),
        best_version: 0,
        best_score: score,
        next_version: 1,
        completed_iterations: 0,
        history: vec![HistoryEntry {
            version: 0,
            iteration: 0,
            kind: CandidateKind::Initial,
            resolved: outcome.resolved,
            total: outcome.total,
            score,
            adopted: true,
        }],
    };
    state.save(&layout.state_path())?;
    Ok(state)
}

fn write_metrics(state: &TuningState, layout: &TunerLayout) -> Result<()> {
    let mut running_best = 0.0_f64;
    let mut trajectory = Vec::with_capacity(state.history.len());
    for entry in &state.history {
        if entry.adopted {
            running_best = entry.score;
        }
        trajectory.push(TrajectoryPoint {
            version: entry.version,
            iteration: entry.iteration,
            score: entry.score,
            best_score: running_best,
        });
    }
    let metrics = TuningMetrics {
        target: state.target.clone(),
        completed_iterations: state.completed_iterations,
        candidates_scored: state.history.len(),
        adopted_count: state.history.iter().filter(|h| h.adopted).count(),
        best_version: state.best_version,
        best_score: state.best_score,
        trajectory,
    };
    let mut buf = serde_json::to_string_pretty(&metrics).context("serialize metrics")?;
    buf.push('\n');
    fs::write(layout.metrics_path(), buf)
        .with_context(|| format!("write {}", layout.metrics_path().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn task(id: &str) -> TaskInstance {
        TaskInstance {
            instance_id: id.to_string(),
            repo: "acme/widgets".to_string(),
            base_commit: "deadbeef".to_string(),
            problem_statement: format!("issue for {id}"),
        }
    }

    fn corpus(n: usize) -> Vec<TaskInstance> {
        (0..n).map(|i| task(&format!("i{i}"))).collect()
    }

    fn params(iterations: u32, k: usize) -> TuneParams {
        TuneParams {
            iterations,
            candidates_per_iter: k,
            tasks_per_score: 4,
            char_budget: 200,
            sample_seed: 42,
        }
    }

    /// Proposer that hands out pre-scripted variant batches in order.
    struct ScriptedProposer {
        initial: Vec<String>,
        batches: RefCell<Vec<Vec<Vec<String>>>>,
    }

    impl ScriptedProposer {
        fn new(initial: &[&str], batches: Vec<Vec<Vec<String>>>) -> Self {
            Self {
                initial: initial.iter().map(|s| s.to_string()).collect(),
                batches: RefCell::new(batches),
            }
        }

        fn batch(variants: &[&[&str]]) -> Vec<Vec<String>> {
            variants
                .iter()
                .map(|lines| lines.iter().map(|s| s.to_string()).collect())
                .collect()
        }
    }

    impl Proposer for ScriptedProposer {
        fn propose_initial(&self, _target: &str, _char_budget: usize) -> Result<Vec<String>> {
            Ok(self.initial.clone())
        }

        fn propose_variants(
            &self,
            _current: &GuidanceArtifact,
            _score: f64,
            _history: &[(u32, f64)],
            _k: usize,
        ) -> Result<Vec<Vec<String>>> {
            let mut batches = self.batches.borrow_mut();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }

    /// Scorer returning a fixed score per version, counting invocations.
    struct ScriptedScorer {
        scores: BTreeMap<u32, (usize, usize)>,
        calls: RefCell<Vec<u32>>,
    }

    impl ScriptedScorer {
        fn new(scores: &[(u32, usize, usize)]) -> Self {
            Self {
                scores: scores
                    .iter()
                    .map(|&(v, resolved, total)| (v, (resolved, total)))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Scorer for ScriptedScorer {
        fn score(
            &self,
            artifact: &GuidanceArtifact,
            _sample: &[TaskInstance],
            _partition: &Partition,
        ) -> Result<ScoreOutcome> {
            self.calls.borrow_mut().push(artifact.version);
            let (resolved, total) = self.scores[&artifact.version];
            Ok(ScoreOutcome { resolved, total })
        }
    }

    #[test]
    fn sampling_is_deterministic_per_draw() {
        let tasks = corpus(30);
        let a = sample_tasks(&tasks, 5, 7, 1);
        let b = sample_tasks(&tasks, 5, 7, 1);
        let c = sample_tasks(&tasks, 5, 7, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn rate_excludes_errors_and_handles_empty() {
        assert_eq!(ScoreOutcome { resolved: 1, total: 2 }.rate(), 0.5);
        assert_eq!(ScoreOutcome { resolved: 0, total: 0 }.rate(), 0.0);
    }

    #[test]
    fn adopts_only_strict_improvements_and_best_never_regresses() {
        let temp = tempdir().expect("tempdir");
        // v0 baseline 1/4; v1 ties (skip), v2 improves (adopt), v3 worse,
        // v4 ties the new best (skip).
        let proposer = ScriptedProposer::new(
            &["- base"],
            vec![
                ScriptedProposer::batch(&[&["- tie"], &["- better"]]),
                ScriptedProposer::batch(&[&["- worse"], &["- tie again"]]),
            ],
        );
        let scorer =
            ScriptedScorer::new(&[(0, 1, 4), (1, 1, 4), (2, 3, 4), (3, 0, 4), (4, 3, 4)]);

        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &corpus(10),
            &params(2, 2),
            temp.path(),
        )
        .expect("tune");

        assert_eq!(state.best_version, 2);
        assert_eq!(state.best_score, 0.75);
        let adopted: Vec<u32> = state
            .history
            .iter()
            .filter(|h| h.adopted)
            .map(|h| h.version)
            .collect();
        assert_eq!(adopted, vec![0, 2]);

        // Running best is monotonically non-decreasing.
        let mut best = 0.0;
        for entry in &state.history {
            if entry.adopted {
                assert!(entry.score >= best || entry.version == 0);
                best = entry.score;
            } else if entry.version != 0 {
                assert!(entry.score <= best);
            }
        }

        let best_artifact = GuidanceArtifact::load(&temp.path().join("best_guidance.json"))
            .expect("best");
        assert_eq!(best_artifact.version, 2);
        assert_eq!(best_artifact.lines, vec!["- better"]);
        assert!(temp.path().join("tuning_metrics.json").exists());
        assert!(temp.path().join("tune_params.json").exists());
    }

    #[test]
    fn over_budget_candidates_are_rejected_without_a_version() {
        let temp = tempdir().expect("tempdir");
        let huge = "x".repeat(500);
        let proposer = ScriptedProposer::new(
            &["- base"],
            vec![vec![vec![huge], vec!["- fits".to_string()]]],
        );
        let scorer = ScriptedScorer::new(&[(0, 1, 4), (1, 2, 4)]);

        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &corpus(10),
            &params(1, 2),
            temp.path(),
        )
        .expect("tune");

        // The over-budget candidate burned no version number.
        assert_eq!(state.next_version, 2);
        assert_eq!(scorer.calls.borrow().as_slice(), &[0, 1]);
        assert_eq!(state.best_version, 1);
    }

    #[test]
    fn resumes_without_rescoring_completed_iterations() {
        let temp = tempdir().expect("tempdir");
        let tasks = corpus(10);

        let proposer = ScriptedProposer::new(
            &["- base"],
            vec![ScriptedProposer::batch(&[&["- one"]])],
        );
        let scorer = ScriptedScorer::new(&[(0, 1, 4), (1, 2, 4)]);
        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &tasks,
            &params(1, 1),
            temp.path(),
        )
        .expect("first run");
        assert_eq!(state.completed_iterations, 1);

        // Second invocation extends to iteration 2. v0 and v1 must not be
        // rescored; only the new candidate v2 is.
        let proposer = ScriptedProposer::new(
            &["- unused"],
            vec![ScriptedProposer::batch(&[&["- two"]])],
        );
        let scorer = ScriptedScorer::new(&[(2, 3, 4)]);
        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &tasks,
            &params(2, 1),
            temp.path(),
        )
        .expect("resume");

        assert_eq!(scorer.calls.borrow().as_slice(), &[2]);
        assert_eq!(state.completed_iterations, 2);
        assert_eq!(state.best_version, 2);
        assert_eq!(state.history.len(), 3);
    }

    /// Scorer that accepts the baseline and dies on any later version.
    struct CrashingScorer;

    impl Scorer for CrashingScorer {
        fn score(
            &self,
            artifact: &GuidanceArtifact,
            _sample: &[TaskInstance],
            _partition: &Partition,
        ) -> Result<ScoreOutcome> {
            if artifact.version == 0 {
                Ok(ScoreOutcome { resolved: 1, total: 4 })
            } else {
                bail!("worker killed")
            }
        }
    }

    #[test]
    fn crash_while_scoring_never_reuses_the_version_number() {
        use crate::store::TrialRecord;
        use crate::trial::AgentOutput;

        let temp = tempdir().expect("tempdir");
        let tasks = corpus(10);

        // First run dies while scoring v1, after v1's artifact and the
        // bumped version counter hit disk.
        let proposer = ScriptedProposer::new(
            &["- base"],
            vec![ScriptedProposer::batch(&[&["- candidate a"]])],
        );
        run_tuning_loop(
            &proposer,
            &CrashingScorer,
            "acme/widgets",
            &tasks,
            &params(1, 1),
            temp.path(),
        )
        .expect_err("killed");

        let layout = TunerLayout::new(temp.path());
        let state = TuningState::load(&layout.state_path()).expect("state");
        assert_eq!(state.next_version, 2);

        // The dead worker left pass records behind in v1's partition.
        let stale = layout.score_partition(1);
        for task in sample_tasks(&tasks, 4, 42, 1) {
            stale
                .append(&TrialRecord {
                    item_id: task.instance_id,
                    condition: "tuning".to_string(),
                    outcome: Outcome::Pass,
                    reason: None,
                    patch: "diff".to_string(),
                    duration_secs: 1.0,
                    recorded_at: "2026-01-01T00:00:00Z".to_string(),
                })
                .expect("append");
        }

        // Resume with a different candidate under an evaluator that fails
        // every trial. The candidate must get a fresh version and a fresh
        // partition, not v1's number or its stale passes.
        struct PatchingAgent;
        impl Agent for PatchingAgent {
            fn generate(&self, _task: &TaskInstance, _prompt: &str) -> Result<AgentOutput> {
                Ok(AgentOutput {
                    patch: "diff".to_string(),
                    timed_out: false,
                })
            }
        }
        struct RejectingEvaluator;
        impl Evaluator for RejectingEvaluator {
            fn evaluate(&self, _task: &TaskInstance, _patch: &str) -> Result<bool> {
                Ok(false)
            }
        }

        let proposer = ScriptedProposer::new(
            &["- unused"],
            vec![ScriptedProposer::batch(&[&["- candidate b"]])],
        );
        let agent = PatchingAgent;
        let evaluator = RejectingEvaluator;
        let scorer = TrialScorer::new(&agent, &evaluator);
        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &tasks,
            &params(1, 1),
            temp.path(),
        )
        .expect("resume");

        let v1 = GuidanceArtifact::load(&layout.version_path(1)).expect("v1");
        assert_eq!(v1.lines, vec!["- candidate a"]);
        let v2 = GuidanceArtifact::load(&layout.version_path(2)).expect("v2");
        assert_eq!(v2.lines, vec!["- candidate b"]);

        // No history entry ever names v1, and the all-fail candidate was
        // not adopted off the stale records.
        assert!(state.history.iter().all(|h| h.version != 1));
        let scored = state.history.last().expect("entry");
        assert_eq!(scored.version, 2);
        assert_eq!(scored.score, 0.0);
        assert_eq!(state.best_version, 0);
        assert_eq!(state.best_score, 0.25);
    }

    #[test]
    fn crash_while_scoring_the_baseline_keeps_its_artifact() {
        let temp = tempdir().expect("tempdir");
        let tasks = corpus(10);
        let layout = TunerLayout::new(temp.path());

        struct NeverScores;
        impl Scorer for NeverScores {
            fn score(
                &self,
                _artifact: &GuidanceArtifact,
                _sample: &[TaskInstance],
                _partition: &Partition,
            ) -> Result<ScoreOutcome> {
                bail!("worker killed")
            }
        }

        let proposer = ScriptedProposer::new(&["- original baseline"], vec![]);
        run_tuning_loop(
            &proposer,
            &NeverScores,
            "acme/widgets",
            &tasks,
            &params(0, 1),
            temp.path(),
        )
        .expect_err("killed");

        // A rerun proposing different text must keep the saved v0.
        let proposer = ScriptedProposer::new(&["- rewritten baseline"], vec![]);
        let scorer = ScriptedScorer::new(&[(0, 1, 4)]);
        let state = run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &tasks,
            &params(0, 1),
            temp.path(),
        )
        .expect("rerun");

        let v0 = GuidanceArtifact::load(&layout.version_path(0)).expect("v0");
        assert_eq!(v0.lines, vec!["- original baseline"]);
        assert_eq!(state.best_version, 0);
    }

    #[test]
    fn state_round_trips_and_rejects_target_mismatch() {
        let temp = tempdir().expect("tempdir");
        let proposer = ScriptedProposer::new(&["- base"], vec![]);
        let scorer = ScriptedScorer::new(&[(0, 1, 4)]);
        run_tuning_loop(
            &proposer,
            &scorer,
            "acme/widgets",
            &corpus(5),
            &params(0, 1),
            temp.path(),
        )
        .expect("init only");

        let err = run_tuning_loop(
            &proposer,
            &scorer,
            "other/repo",
            &corpus(5),
            &params(0, 1),
            temp.path(),
        )
        .expect_err("mismatch");
        assert!(err.to_string().contains("belongs to target"));
    }
}
