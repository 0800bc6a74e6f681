//! Byte-size classification.

use serde::{Deserialize, Serialize};

pub const KIB: u64 = 1024;

/// Severity bucket derived purely from an asset's byte size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationLevel {
    Good,
    Notice,
    Warning,
    Critical,
}

impl OptimizationLevel {
    /// Per-asset sub-score
    pub fn score(self) -> u32 {
        match self {
            OptimizationLevel::Good => 100,
            OptimizationLevel::Notice => 75,
            OptimizationLevel::Warning => 50,
            OptimizationLevel::Critical => 0,
        }
    }

    /// Exclusive lower bound of the bucket in bytes
    pub fn lower_bound(self) -> u64 {
        match self {
            OptimizationLevel::Good => 0,
            OptimizationLevel::Notice => 100 * KIB,
            OptimizationLevel::Warning => 200 * KIB,
            OptimizationLevel::Critical => 500 * KIB,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationLevel::Good => "GOOD",
            OptimizationLevel::Notice => "NOTICE",
            OptimizationLevel::Warning => "WARNING",
            OptimizationLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a byte size.
///
/// `None` and `0` land in `Good`: an unmeasured asset is never scored as the
/// worst case. Callers that need to tell "small" from "unknown" must keep the
/// `None` themselves.
pub fn classify(byte_size: Option<u64>) -> OptimizationLevel {
    let size = byte_size.unwrap_or(0);
    if size > OptimizationLevel::Critical.lower_bound() {
        OptimizationLevel::Critical
    } else if size > OptimizationLevel::Warning.lower_bound() {
        OptimizationLevel::Warning
    } else if size > OptimizationLevel::Notice.lower_bound() {
        OptimizationLevel::Notice
    } else {
        OptimizationLevel::Good
    }
}

/// Human-readable size, e.g. `600.00 KB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= KIB as f64 && unit < UNITS.len() - 1 {
        value /= KIB as f64;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
