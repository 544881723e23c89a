//! Run ID generation.

use chrono::Utc;
use rand::Rng;

/// Generate a filesystem-safe run ID: `<prefix>_<YYYYmmdd_HHMMSS>_<4-hex>`.
pub fn make_run_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix: u16 = rand::thread_rng().r#gen();
    format!("{prefix}_{timestamp}_{suffix:04x}")
}
