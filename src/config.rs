//! Experiment configuration.
//!
//! An experiment file is TOML wiring the external collaborators (agent,
//! harness, proposer commands), the tuning knobs, and the named
//! conditions. Validation fails fast before any work starts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::guidance::DEFAULT_CHAR_BUDGET;
use crate::tuner::MAX_TUNING_ITERATIONS;

/// A parsed experiment file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    pub experiment: ExperimentMeta,
    pub agent: AgentConfig,
    pub harness: HarnessConfig,
    pub proposer: ProposerConfig,
    #[serde(default)]
    pub tuning: TuneParams,
}

/// Experiment identity: model name and the declared conditions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentMeta {
    /// Model name written into prediction records.
    pub model: String,
    /// Named processing variants (slug format: `[a-z0-9_-]+`).
    pub conditions: Vec<String>,
}

/// External agent command: prompt on stdin, patch on stdout.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub command: Vec<String>,
    #[serde(default = "default_agent_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,
}

/// External evaluation harness command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HarnessConfig {
    pub command: Vec<String>,
    #[serde(default = "default_harness_timeout_s")]
    pub timeout_s: u64,
}

/// External text-generation command used to propose guidance.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProposerConfig {
    pub command: Vec<String>,
    #[serde(default = "default_proposer_timeout_s")]
    pub timeout_s: u64,
}

/// Hill-climbing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuneParams {
    /// Iterations T.
    pub iterations: u32,
    /// Candidates per iteration K.
    pub candidates_per_iter: usize,
    /// Sampled tasks per scoring run N.
    pub tasks_per_score: usize,
    pub char_budget: usize,
    pub sample_seed: u64,
}

impl Default for TuneParams {
    fn default() -> Self {
        Self {
            iterations: 10,
            candidates_per_iter: 6,
            tasks_per_score: 20,
            char_budget: DEFAULT_CHAR_BUDGET,
            sample_seed: 0,
        }
    }
}

fn default_agent_timeout_s() -> u64 {
    600
}

fn default_harness_timeout_s() -> u64 {
    1200
}

fn default_proposer_timeout_s() -> u64 {
    120
}

fn default_step_limit() -> u32 {
    30
}

impl ExperimentConfig {
    /// Load and validate an experiment file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read experiment {}", path.display()))?;
        let config: ExperimentConfig = toml::from_str(&contents)
            .with_context(|| format!("parse experiment {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validate experiment {}", path.display()))?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(contents).context("parse experiment")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.experiment.model.trim().is_empty() {
            bail!("experiment.model must be non-empty");
        }
        if self.experiment.conditions.is_empty() {
            bail!("experiment.conditions must be a non-empty array");
        }
        for condition in &self.experiment.conditions {
            validate_condition_name(condition)?;
        }
        let mut sorted = self.experiment.conditions.clone();
        sorted.sort();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                bail!("duplicate condition {}", pair[0]);
            }
        }
        validate_command(&self.agent.command, "agent.command")?;
        validate_command(&self.harness.command, "harness.command")?;
        validate_command(&self.proposer.command, "proposer.command")?;
        self.tuning.validate()?;
        Ok(())
    }
}

impl TuneParams {
    pub fn validate(&self) -> Result<()> {
        if self.iterations > MAX_TUNING_ITERATIONS {
            bail!(
                "tuning.iterations={} exceeds cap {}",
                self.iterations,
                MAX_TUNING_ITERATIONS
            );
        }
        if self.candidates_per_iter == 0 {
            bail!("tuning.candidates_per_iter must be > 0");
        }
        if self.tasks_per_score == 0 {
            bail!("tuning.tasks_per_score must be > 0");
        }
        if self.char_budget == 0 {
            bail!("tuning.char_budget must be > 0");
        }
        Ok(())
    }
}

fn validate_command(command: &[String], label: &str) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        bail!("{label} must be a non-empty array");
    }
    Ok(())
}

/// Validate a condition name (slug, no path separators).
pub fn validate_condition_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("condition name must be non-empty");
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("condition {} must use [a-z0-9_-] only", name);
    }
    Ok(())
}
