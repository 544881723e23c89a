//! Result store: append-safe, idempotent persistence of trial outcomes.
//!
//! A partition is one directory owning a `records.jsonl` file. Exactly one
//! worker appends to a partition at a time; reads are last-write-wins per
//! (item_id, condition) so retried workers can safely re-append. Each
//! append is a single write of one complete line, and readers skip any
//! partial trailing line left by an interrupted writer.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of one trial.
///
/// `Error` marks an infrastructure fault (harness unreachable) and is
/// excluded from resolve-rate denominators; `Fail` is a legitimate
/// experimental result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

/// One recorded trial for an (item, condition) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    pub item_id: String,
    pub condition: String,
    pub outcome: Outcome,
    /// Why a trial failed or errored (e.g. `timeout`, `empty_patch`).
    pub reason: Option<String>,
    /// The produced artifact (unified diff); may be empty.
    pub patch: String,
    pub duration_secs: f64,
    pub recorded_at: String,
}

/// Prediction record in the fixed external schema consumed by the
/// evaluation harness. Field names and shape must not change.
#[derive(Debug, Serialize, Deserialize)]
pub struct Prediction {
    pub instance_id: String,
    pub model_name_or_path: String,
    pub model_patch: String,
}

/// One physical result partition.
#[derive(Debug, Clone)]
pub struct Partition {
    dir: PathBuf,
}

impl Partition {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn records_path(&self) -> PathBuf {
        self.dir.join("records.jsonl")
    }

    /// Append one record. The line is fully written or absent.
    pub fn append(&self, record: &TrialRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create partition {}", self.dir.display()))?;
        let path = self.records_path();
        let mut line = serde_json::to_string(record).context("serialize record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        debug!(item_id = %record.item_id, outcome = ?record.outcome, "record appended");
        Ok(())
    }

    /// Read all records, keyed by (item_id, condition), last-write-wins.
    ///
    /// Unparseable lines (a partial write from a killed worker) are
    /// skipped with a warning, never an error.
    pub fn read(&self) -> Result<BTreeMap<(String, String), TrialRecord>> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let mut records = BTreeMap::new();
        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TrialRecord>(line) {
                Ok(record) => {
                    let key = (record.item_id.clone(), record.condition.clone());
                    records.insert(key, record);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unparseable record line");
                }
            }
        }
        Ok(records)
    }

    /// IDs of items already recorded in this partition.
    pub fn recorded_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self.read()?.into_keys().map(|(item_id, _)| item_id).collect())
    }
}

/// Export a partition's records as prediction JSONL for the harness.
///
/// Returns the number of predictions written.
pub fn export_predictions(partition: &Partition, out_path: &Path, model: &str) -> Result<usize> {
    let records = partition.read()?;
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create preds dir {}", parent.display()))?;
    }
    let mut body = String::new();
    for record in records.values() {
        let prediction = Prediction {
            instance_id: record.item_id.clone(),
            model_name_or_path: model.to_string(),
            model_patch: record.patch.clone(),
        };
        body.push_str(&serde_json::to_string(&prediction).context("serialize prediction")?);
        body.push('\n');
    }
    fs::write(out_path, body).with_context(|| format!("write {}", out_path.display()))?;
    Ok(records.len())
}
