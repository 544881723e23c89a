//! Task corpus access.
//!
//! Tasks live in an external JSONL file, one instance per line. The corpus
//! itself is an external collaborator; this module only reads the minimal
//! payload the trial executor needs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One evaluable work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInstance {
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    pub problem_statement: String,
}

/// Load task instances from a JSONL file.
///
/// When `item_ids` is given, the result is filtered to those IDs and
/// returned in the ID list's order; a missing payload for any requested ID
/// is a configuration error.
pub fn load_tasks(path: &Path, item_ids: Option<&[String]>) -> Result<Vec<TaskInstance>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tasks {}", path.display()))?;
    let mut all = Vec::new();
    for (line_no, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let task: TaskInstance = serde_json::from_str(line)
            .with_context(|| format!("parse {} line {}", path.display(), line_no + 1))?;
        all.push(task);
    }
    debug!(path = %path.display(), count = all.len(), "tasks loaded");

    let Some(wanted) = item_ids else {
        return Ok(all);
    };

    let mut selected = Vec::with_capacity(wanted.len());
    for id in wanted {
        match all.iter().find(|task| &task.instance_id == id) {
            Some(task) => selected.push(task.clone()),
            None => bail!("task payload missing for item {} in {}", id, path.display()),
        }
    }
    Ok(selected)
}
