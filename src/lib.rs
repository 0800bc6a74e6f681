//! PageLens
//!
//! Media weight analysis for web pages: finds the images, background images
//! and videos a page uses, measures them over the network, classifies and
//! scores them, and attributes any tag-manager containers to the vendor or
//! platform that injected them.
//!
//! # Features
//!
//! - **Snapshot boundary**: analysis runs over a `DocumentQuery`, either a
//!   static `PageSnapshot` parsed from HTML or a rendered snapshot recorded
//!   as JSON by a browser-side collaborator
//! - **HTTP probing** (`http`, default): `reqwest`-backed size probes,
//!   container fetching and page loading
//! - **Cooperative cancellation**: a running scan stops at the next asset
//!   boundary and discards partial results
//!
//! # Example
//!
//! ```no_run
//! use pagelens::{AnalyzerConfig, PageLoader, ScanCoordinator, ScanOutcome};
//!
//! # async fn demo() -> pagelens::Result<()> {
//! let config = AnalyzerConfig { probe_concurrency: 4, ..Default::default() };
//! let page = PageLoader::new(&config)?.load("https://example.com").await?;
//! let coordinator = ScanCoordinator::from_config(config)?;
//! if let ScanOutcome::Completed(report) = coordinator.run(&page).await {
//!     println!("score {} ({})", report.score, report.grade);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error;
pub use error::{Error, Result};

pub mod asset;
pub mod classify;
pub mod discovery;
pub mod dom;
pub mod fingerprint;
pub mod history;
pub mod recommend;
pub mod report;
pub mod resolver;
pub mod scan;
pub mod score;

#[cfg(feature = "http")]
pub mod loader;

pub use asset::{Asset, AssetKind};
pub use classify::{classify, OptimizationLevel};
pub use discovery::{AssetDirectory, DiscoveredImages, PageBlock};
pub use dom::{DocumentQuery, ElementId, PageSnapshot};
pub use fingerprint::{GtmSourceAttribution, PlatformProfile, VendorFingerprintMatcher};
pub use history::{AnalysisHistory, AnalysisHistoryEntry};
#[cfg(feature = "http")]
pub use loader::PageLoader;
pub use recommend::{FormatSupport, Recommendation};
pub use report::ScanReport;
pub use resolver::{ResourceProbe, RetryPolicy, SizeResolver};
pub use scan::{ScanCoordinator, ScanOutcome, ScanState};
pub use score::{Grade, ScoreBreakdown};

/// Configuration for the analyzer
///
/// The defaults reproduce the reference behaviour: one probe at a time,
/// three attempts 200ms apart, container attribution on, WebP as the
/// suggested modern format.
///
/// # Examples
///
/// ```
/// let cfg = pagelens::AnalyzerConfig::default();
/// assert_eq!(cfg.retry.max_attempts, 3);
/// assert_eq!(cfg.probe_concurrency, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// User agent string sent with every request
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Retry discipline for size probes and container fetches
    pub retry: RetryPolicy,
    /// Maximum size probes in flight during a scan
    pub probe_concurrency: usize,
    /// Whether to fetch and attribute tag-manager containers
    pub analyze_containers: bool,
    /// Formats the audience's browsers decode
    pub format_support: FormatSupport,
    /// JSON file the history log is kept in; in-memory when unset
    pub history_path: Option<PathBuf>,
    /// First-party platform recognised by container attribution
    pub platform: PlatformProfile,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Mozilla/5.0 (X11; Linux x86_64) PageLens/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 15000,
            retry: RetryPolicy::default(),
            probe_concurrency: 1,
            analyze_containers: true,
            format_support: FormatSupport::default(),
            history_path: None,
            platform: PlatformProfile::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load a configuration file; absent keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_concurrency == 0 {
            return Err(Error::ConfigError("probe_concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::ConfigError("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
