//! Cross-condition aggregation of a finished (or in-flight) run.
//!
//! The summary is recomputed from the record partitions every time, never
//! cached incrementally, so a partially complete run yields an honest
//! partial summary.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinate::{RunLayout, RunMeta};
use crate::store::{Outcome, Partition, TrialRecord};
use crate::universe;

/// Aggregate for one condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionSummary {
    /// Trials that passed.
    pub resolved: usize,
    /// Decided trials (pass + fail). Errors are excluded.
    pub total: usize,
    pub errors: usize,
    pub rate: f64,
    /// All records seen, including errors.
    pub records: usize,
    /// Universe items with no record yet.
    pub missing: usize,
    pub complete: bool,
}

/// Head-to-head difference between the first two conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeltaSummary {
    pub base: String,
    pub other: String,
    /// `other` resolved minus `base` resolved.
    pub resolved: i64,
    /// `other` rate minus `base` rate.
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentSummary {
    pub run_id: String,
    pub generated_at: String,
    pub conditions: BTreeMap<String, ConditionSummary>,
    pub delta: Option<DeltaSummary>,
    pub complete: bool,
}

/// Tally a set of records against the universe item count.
fn tally(records: &BTreeMap<(String, String), TrialRecord>, item_count: usize) -> ConditionSummary {
    let mut resolved = 0;
    let mut total = 0;
    let mut errors = 0;
    for record in records.values() {
        match record.outcome {
            Outcome::Pass => {
                resolved += 1;
                total += 1;
            }
            Outcome::Fail => total += 1,
            Outcome::Error => errors += 1,
        }
    }
    let rate = if total == 0 {
        0.0
    } else {
        resolved as f64 / total as f64
    };
    let missing = item_count.saturating_sub(records.len());
    ConditionSummary {
        resolved,
        total,
        errors,
        rate,
        records: records.len(),
        missing,
        complete: missing == 0,
    }
}

/// Summarize a run, writing `summary.json` into its run directory.
///
/// When `conditions` is `None` the run's submitted conditions are used.
pub fn summarize(
    run_root: &Path,
    run_id: &str,
    conditions: Option<&[String]>,
) -> Result<ExperimentSummary> {
    let layout = RunLayout::new(run_root, run_id);
    if !layout.meta_path().exists() {
        bail!("run {} not found under {}", run_id, run_root.display());
    }
    let meta = RunMeta::load(&layout.meta_path())?;
    let wanted: Vec<String> = match conditions {
        Some(list) => {
            for condition in list {
                if !meta.conditions.contains(condition) {
                    bail!(
                        "condition {} was not part of run {} (submitted: {})",
                        condition,
                        run_id,
                        meta.conditions.join(", ")
                    );
                }
            }
            list.to_vec()
        }
        None => meta.conditions.clone(),
    };

    // The frozen universe copy bounds completeness.
    let ids = universe::read_item_ids(&layout.universe_path())?;

    let mut summaries = BTreeMap::new();
    for condition in &wanted {
        let mut merged = BTreeMap::new();
        for shard_index in 0..meta.shard_count {
            let partition = Partition::new(layout.partition_dir(condition, shard_index));
            merged.extend(partition.read()?);
        }
        let summary = tally(&merged, ids.len());
        info!(
            run_id,
            condition,
            resolved = summary.resolved,
            total = summary.total,
            rate = summary.rate,
            "condition summarized"
        );
        summaries.insert(condition.clone(), summary);
    }

    let delta = if wanted.len() >= 2 {
        let base = &summaries[&wanted[0]];
        let other = &summaries[&wanted[1]];
        Some(DeltaSummary {
            base: wanted[0].clone(),
            other: wanted[1].clone(),
            resolved: other.resolved as i64 - base.resolved as i64,
            rate: other.rate - base.rate,
        })
    } else {
        None
    };

    let summary = ExperimentSummary {
        run_id: run_id.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        complete: summaries.values().all(|s| s.complete),
        conditions: summaries,
        delta,
    };

    let mut buf = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    buf.push('\n');
    let out_path = layout.summary_path();
    std::fs::write(&out_path, buf)
        .with_context(|| format!("write summary {}", out_path.display()))?;
    Ok(summary)
}
