//! Work universe loading and deterministic shard planning.
//!
//! A universe is a newline-delimited file of work-item identifiers.
//! Shards are a pure function of (universe order, shard_count, index), so
//! replanning for a re-submitted job reproduces identical shards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default filename prefix for shard files.
pub const DEFAULT_SHARD_PREFIX: &str = "shard";

/// Read work-item IDs from a newline-delimited file.
///
/// Blank lines and `#` comment lines are skipped.
pub fn read_item_ids(path: &Path) -> Result<Vec<String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read ids {}", path.display()))?;
    let mut ids = Vec::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            ids.push(line.to_string());
        }
    }
    debug!(path = %path.display(), count = ids.len(), "ids loaded");
    Ok(ids)
}

/// Partition `ids` into `shard_count` round-robin shards.
///
/// Item at position `i` goes to shard `i % shard_count`. The union of all
/// shards equals the input exactly once and shard sizes differ by at most
/// one.
pub fn plan_shards(ids: &[String], shard_count: usize) -> Result<Vec<Vec<String>>> {
    if shard_count == 0 {
        bail!("shard_count must be > 0");
    }
    if ids.is_empty() {
        bail!("universe is empty");
    }
    let mut shards: Vec<Vec<String>> = vec![Vec::new(); shard_count];
    for (index, id) in ids.iter().enumerate() {
        shards[index % shard_count].push(id.clone());
    }
    Ok(shards)
}

/// Deterministic shard file name: `{prefix}_{index:03}.txt`.
pub fn shard_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index:03}.txt")
}

/// Write one ID file per shard into `out_dir`.
pub fn write_shard_files(
    out_dir: &Path,
    prefix: &str,
    shards: &[Vec<String>],
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create shard dir {}", out_dir.display()))?;
    let mut paths = Vec::with_capacity(shards.len());
    for (index, shard) in shards.iter().enumerate() {
        let path = out_dir.join(shard_file_name(prefix, index));
        let mut body = shard.join("\n");
        if !shard.is_empty() {
            body.push('\n');
        }
        fs::write(&path, body).with_context(|| format!("write shard {}", path.display()))?;
        paths.push(path);
    }
    Ok(paths)
}

/// SHA-256 hex digest of the verbatim universe file.
pub fn universe_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}
