//! Guidance proposals from an external text-generation command.
//!
//! The proposer command receives a prompt on stdin and prints candidate
//! guidance as JSON on stdout. Malformed output is treated as zero
//! candidates for that call, never a hard failure; the tuning loop simply
//! moves on.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, warn};

use crate::guidance::GuidanceArtifact;
use crate::process;

/// Produces candidate guidance line sets.
pub trait Proposer {
    /// Initial guidance for a target with no prior versions.
    fn propose_initial(&self, target: &str, char_budget: usize) -> Result<Vec<String>>;

    /// Up to `k` variants of the current best guidance.
    fn propose_variants(
        &self,
        current: &GuidanceArtifact,
        score: f64,
        history: &[(u32, f64)],
        k: usize,
    ) -> Result<Vec<Vec<String>>>;
}

/// Proposer backed by an external command.
pub struct CommandProposer {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandProposer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn run(&self, prompt: &str) -> Result<String> {
        let cmd = process::build_command(&self.command, &[])?;
        let output = process::run_with_timeout(cmd, Some(prompt.as_bytes()), self.timeout)
            .context("run proposer command")?;
        if output.timed_out {
            bail!("proposer command timed out");
        }
        if !output.status.success() {
            bail!(
                "proposer command exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Proposer for CommandProposer {
    fn propose_initial(&self, target: &str, char_budget: usize) -> Result<Vec<String>> {
        let prompt = initial_prompt(target, char_budget);
        let raw = self.run(&prompt)?;
        let mut candidates = parse_candidates(&raw);
        if candidates.is_empty() {
            warn!(target, "proposer returned no usable initial guidance");
            return Ok(Vec::new());
        }
        Ok(candidates.remove(0))
    }

    fn propose_variants(
        &self,
        current: &GuidanceArtifact,
        score: f64,
        history: &[(u32, f64)],
        k: usize,
    ) -> Result<Vec<Vec<String>>> {
        let prompt = variant_prompt(current, score, history, k);
        let raw = self.run(&prompt)?;
        let mut candidates = parse_candidates(&raw);
        candidates.truncate(k);
        debug!(
            target = %current.target,
            requested = k,
            received = candidates.len(),
            "variants proposed"
        );
        Ok(candidates)
    }
}

fn initial_prompt(target: &str, char_budget: usize) -> String {
    format!(
        "You are writing repository-specific guidance for an automated coding \
         agent that fixes issues in `{target}`.\n\
         Write a short list of concrete, actionable guidance lines (project \
         layout, test conventions, common pitfalls).\n\
         Hard limit: the joined lines must be at most {char_budget} characters.\n\
         Respond with a JSON array of candidate line lists, e.g. \
         [[\"- line one\", \"- line two\"]]. Output only JSON."
    )
}

fn variant_prompt(
    current: &GuidanceArtifact,
    score: f64,
    history: &[(u32, f64)],
    k: usize,
) -> String {
    let mut history_text = String::new();
    for (version, hist_score) in history {
        history_text.push_str(&format!("  v{version}: {hist_score:.3}\n"));
    }
    format!(
        "You are improving repository-specific guidance for an automated \
         coding agent working on `{target}`.\n\
         Current guidance (v{version}, resolve rate {score:.3}):\n\
         ---\n{body}\n---\n\
         Version history (version: resolve rate):\n{history_text}\
         Propose {k} distinct edited variants. Each variant may rewrite, \
         reorder, add, or drop lines, and the joined lines must be at most \
         {char_budget} characters.\n\
         Respond with a JSON array of {k} candidate line lists, e.g. \
         [[\"- line one\"], [\"- other\"]]. Output only JSON.",
        target = current.target,
        version = current.version,
        body = current.render(),
        char_budget = current.char_budget,
    )
}

/// Parse proposer output into candidate line lists.
///
/// Accepts a JSON array of string arrays, or an array of objects carrying
/// a `lines` array. A surrounding Markdown code fence is stripped first.
/// Anything unparseable yields an empty list.
pub fn parse_candidates(raw: &str) -> Vec<Vec<String>> {
    let stripped = strip_code_fence(raw.trim());
    let value: Value = match serde_json::from_str(stripped) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "proposer output is not valid JSON");
            return Vec::new();
        }
    };
    let Value::Array(items) = value else {
        warn!("proposer output is not a JSON array");
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for item in items {
        let lines = match item {
            Value::Array(entries) => string_lines(entries),
            Value::Object(mut map) => match map.remove("lines") {
                Some(Value::Array(entries)) => string_lines(entries),
                _ => None,
            },
            _ => None,
        };
        match lines {
            Some(lines) if !lines.is_empty() => candidates.push(lines),
            _ => warn!("skipping malformed candidate entry"),
        }
    }
    candidates
}

fn string_lines(entries: Vec<Value>) -> Option<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(line) => Some(line),
            _ => None,
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").map_or(rest, str::trim_end)
}
