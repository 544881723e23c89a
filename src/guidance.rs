//! The per-target guidance artifact.
//!
//! A guidance artifact is the only thing the tuning loop edits; everything
//! else (prompt wiring, runner settings, harness) stays frozen. Versions
//! are immutable once written; an artifact is superseded, never edited.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAR_BUDGET: usize = 3200;

pub const MIN_LINE_COUNT: usize = 3;
pub const MAX_LINE_COUNT: usize = 120;

/// A bounded, line-oriented guidance block for one tuning target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuidanceArtifact {
    pub target: String,
    pub version: u32,
    pub lines: Vec<String>,
    pub char_budget: usize,
}

impl GuidanceArtifact {
    pub fn new(target: impl Into<String>, lines: Vec<String>, char_budget: usize) -> Self {
        Self {
            target: target.into(),
            version: 0,
            lines,
            char_budget,
        }
    }

    /// Join lines into the guidance text block.
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    pub fn char_count(&self) -> usize {
        self.render().chars().count()
    }

    pub fn is_within_budget(&self) -> bool {
        self.char_count() <= self.char_budget
    }

    /// Copy with new lines at the given version.
    pub fn succeed(&self, version: u32, lines: Vec<String>) -> Self {
        Self {
            target: self.target.clone(),
            version,
            lines,
            char_budget: self.char_budget,
        }
    }

    /// Copy with lines dropped from the end until the budget fits.
    pub fn trimmed_to_budget(&self) -> Self {
        let mut trimmed = self.clone();
        while !trimmed.lines.is_empty() && !trimmed.is_within_budget() {
            trimmed.lines.pop();
        }
        trimmed
    }

    /// Atomically write the artifact as pretty JSON (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .with_context(|| format!("artifact path missing parent {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let mut buf = serde_json::to_string_pretty(self).context("serialize guidance")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp guidance {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("replace guidance {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read guidance {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse guidance {}", path.display()))
    }
}

/// Validate an artifact, returning warning strings. Empty means clean.
///
/// Warnings are informational; the budget check in the tuner is the only
/// hard gate.
pub fn validate(artifact: &GuidanceArtifact) -> Vec<String> {
    let mut warnings = Vec::new();

    if !artifact.is_within_budget() {
        warnings.push(format!(
            "guidance exceeds char budget: {} > {}",
            artifact.char_count(),
            artifact.char_budget
        ));
    }

    let count = artifact.lines.len();
    if count < MIN_LINE_COUNT {
        warnings.push(format!("too few lines ({count} < {MIN_LINE_COUNT})"));
    }
    if count > MAX_LINE_COUNT {
        warnings.push(format!("too many lines ({count} > {MAX_LINE_COUNT})"));
    }

    let blank = artifact.lines.iter().filter(|line| line.trim().is_empty()).count();
    if count > 6 && blank > count / 3 {
        warnings.push(format!("{blank}/{count} lines are blank"));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(lines: &[&str], budget: usize) -> GuidanceArtifact {
        GuidanceArtifact::new(
            "acme/widgets",
            lines.iter().map(|s| s.to_string()).collect(),
            budget,
        )
    }

    #[test]
    fn render_joins_lines() {
        let g = artifact(&["- tip one", "- tip two"], 100);
        assert_eq!(g.render(), "- tip one\n- tip two");
        assert_eq!(g.char_count(), 19);
        assert!(g.is_within_budget());
    }

    #[test]
    fn trim_drops_lines_from_the_end_until_budget_fits() {
        let g = artifact(&["aaaa", "bbbb", "cccc"], 9);
        let trimmed = g.trimmed_to_budget();
        assert_eq!(trimmed.lines, vec!["aaaa", "bbbb"]);
        assert!(trimmed.is_within_budget());
    }

    #[test]
    fn save_load_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("versions").join("v0.json");
        let g = artifact(&["- a", "- b", "- c"], 64);
        g.save(&path).expect("save");
        let loaded = GuidanceArtifact::load(&path).expect("load");
        assert_eq!(loaded, g);
    }

    #[test]
    fn validate_flags_budget_and_line_bounds() {
        let over = artifact(&["xxxxxxxxxx"], 5);
        let warnings = validate(&over);
        assert!(warnings.iter().any(|w| w.contains("char budget")));
        assert!(warnings.iter().any(|w| w.contains("too few lines")));

        let clean = artifact(&["- a", "- b", "- c"], 64);
        assert!(validate(&clean).is_empty());
    }
}
