//! Run submission and layout for the external scheduler.
//!
//! `submit` stages everything a run needs on shared storage: a frozen copy
//! of the universe, the shard plan, run metadata, and a tab-separated job
//! manifest the scheduler consumes. The coordinator itself never executes
//! trials; workers invoke `run-shard` against this layout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::universe::{self, DEFAULT_SHARD_PREFIX};

pub const MANIFEST_HEADER: &str = "condition\tjob_id\tshard_range\tdepends_on\tpartition_path";

/// Metadata frozen at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    pub run_id: String,
    /// Path of the universe file the run was submitted with.
    pub universe_file: String,
    /// Fingerprint of the frozen universe copy; workers verify it before
    /// replanning shards.
    pub universe_sha256: String,
    pub item_count: usize,
    pub shard_count: usize,
    pub conditions: Vec<String>,
    pub created_at: String,
}

impl RunMeta {
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(self).context("serialize run meta")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp meta {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("replace meta {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read run meta {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse run meta {}", path.display()))
    }
}

/// Filesystem layout of one run under a run root.
#[derive(Debug, Clone)]
pub struct RunLayout {
    run_dir: PathBuf,
}

impl RunLayout {
    pub fn new(run_root: &Path, run_id: &str) -> Self {
        Self {
            run_dir: run_root.join(run_id),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn universe_path(&self) -> PathBuf {
        self.run_dir.join("universe.txt")
    }

    pub fn shards_dir(&self) -> PathBuf {
        self.run_dir.join("shards")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.run_dir.join("run_meta.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.run_dir.join("manifest.tsv")
    }

    /// Partition directory for one (condition, shard) pair.
    pub fn partition_dir(&self, condition: &str, shard_index: usize) -> PathBuf {
        self.run_dir
            .join("preds")
            .join(condition)
            .join(format!("shard_{shard_index:03}"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join("summary.json")
    }
}

fn job_id(run_id: &str, condition: &str, stage: &str) -> String {
    format!("{run_id}__{condition}__{stage}")
}

/// Stage a run: freeze the universe, write shards, metadata, and the job
/// manifest. Refuses to overwrite an already submitted run.
pub fn submit(
    run_root: &Path,
    run_id: &str,
    universe_path: &Path,
    shard_count: usize,
    conditions: &[String],
) -> Result<RunMeta> {
    if conditions.is_empty() {
        bail!("at least one condition is required");
    }
    let layout = RunLayout::new(run_root, run_id);
    if layout.meta_path().exists() {
        bail!("run {} already submitted at {}", run_id, layout.run_dir().display());
    }

    let ids = universe::read_item_ids(universe_path)?;
    let shards = universe::plan_shards(&ids, shard_count)?;

    fs::create_dir_all(layout.run_dir())
        .with_context(|| format!("create run dir {}", layout.run_dir().display()))?;
    fs::copy(universe_path, layout.universe_path()).with_context(|| {
        format!(
            "copy universe {} to {}",
            universe_path.display(),
            layout.universe_path().display()
        )
    })?;
    universe::write_shard_files(&layout.shards_dir(), DEFAULT_SHARD_PREFIX, &shards)?;

    let meta = RunMeta {
        run_id: run_id.to_string(),
        universe_file: universe_path.display().to_string(),
        universe_sha256: universe::universe_sha256(&layout.universe_path())?,
        item_count: ids.len(),
        shard_count,
        conditions: conditions.to_vec(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    meta.save(&layout.meta_path())?;

    write_manifest(&layout, &meta)?;
    info!(
        run_id,
        items = meta.item_count,
        shards = meta.shard_count,
        conditions = meta.conditions.len(),
        "run submitted"
    );
    Ok(meta)
}

/// Write the scheduler manifest: per condition, one produce job over all
/// shards and one score job depending on it.
fn write_manifest(layout: &RunLayout, meta: &RunMeta) -> Result<()> {
    let mut body = String::from(MANIFEST_HEADER);
    body.push('\n');
    let shard_range = format!("0-{}", meta.shard_count.saturating_sub(1));
    for condition in &meta.conditions {
        let produce = job_id(&meta.run_id, condition, "produce");
        let score = job_id(&meta.run_id, condition, "score");
        let partition = PathBuf::from("preds").join(condition);
        body.push_str(&format!(
            "{condition}\t{produce}\t{shard_range}\t-\t{}\n",
            partition.display()
        ));
        body.push_str(&format!(
            "{condition}\t{score}\t{shard_range}\t{produce}\t{}\n",
            partition.display()
        ));
    }
    let path = layout.manifest_path();
    fs::write(&path, body).with_context(|| format!("write manifest {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn conditions() -> Vec<String> {
        vec!["no_guidance".to_string(), "with_guidance".to_string()]
    }

    fn write_universe(dir: &Path, n: usize) -> PathBuf {
        let path = dir.join("universe.txt");
        let body: String = (1..=n).map(|i| format!("i{i}\n")).collect();
        fs::write(&path, body).expect("write universe");
        path
    }

    #[test]
    fn submit_stages_the_full_run_layout() {
        let temp = tempdir().expect("tempdir");
        let universe = write_universe(temp.path(), 10);
        let run_root = temp.path().join("runs");

        let meta = submit(&run_root, "exp_20260101_000000_abcd", &universe, 4, &conditions())
            .expect("submit");
        assert_eq!(meta.item_count, 10);
        assert_eq!(meta.shard_count, 4);

        let layout = RunLayout::new(&run_root, "exp_20260101_000000_abcd");
        assert!(layout.universe_path().exists());
        assert!(layout.shards_dir().join("shard_003.txt").exists());

        let loaded = RunMeta::load(&layout.meta_path()).expect("meta");
        assert_eq!(loaded, meta);
        assert_eq!(loaded.universe_sha256.len(), 64);

        let manifest = fs::read_to_string(layout.manifest_path()).expect("manifest");
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines[0], MANIFEST_HEADER);
        // 2 jobs per condition.
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("exp_20260101_000000_abcd__no_guidance__produce"));
        assert!(lines[2].contains("\texp_20260101_000000_abcd__no_guidance__produce\t"));
        assert!(lines[2].contains("__no_guidance__score"));
    }

    #[test]
    fn resubmitting_the_same_run_id_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let universe = write_universe(temp.path(), 4);
        let run_root = temp.path().join("runs");

        submit(&run_root, "exp_1", &universe, 2, &conditions()).expect("first");
        let err = submit(&run_root, "exp_1", &universe, 2, &conditions())
            .expect_err("second");
        assert!(err.to_string().contains("already submitted"));
    }

    #[test]
    fn partition_paths_separate_condition_and_shard() {
        let temp = tempdir().expect("tempdir");
        let layout = RunLayout::new(temp.path(), "exp_1");
        let a = layout.partition_dir("no_guidance", 0);
        let b = layout.partition_dir("with_guidance", 0);
        let c = layout.partition_dir("no_guidance", 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with("preds/no_guidance/shard_000"));
    }
}
