//! Remediation suggestions for a single asset.

use crate::asset::Asset;
use crate::classify::KIB;
use serde::{Deserialize, Serialize};

/// What a recommendation asks the site owner to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Format,
    Loading,
    Responsive,
    Resize,
    Compression,
}

/// Display priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    pub fn impact(self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub message: String,
    pub impact: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, priority: Priority, message: impl Into<String>) -> Self {
        Self { kind, priority, message: message.into(), impact: priority.impact().to_string() }
    }
}

/// Image encodings the audience's browsers can decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSupport {
    pub webp: bool,
    pub avif: bool,
    pub jpeg: bool,
    pub png: bool,
}

impl Default for FormatSupport {
    fn default() -> Self {
        Self { webp: true, avif: false, jpeg: true, png: true }
    }
}

impl FormatSupport {
    /// Best supported modern encoding, AVIF first
    pub fn preferred_modern(&self) -> Option<&'static str> {
        if self.avif {
            Some("AVIF")
        } else if self.webp {
            Some("WebP")
        } else {
            None
        }
    }
}

/// Lower-cased file extension of a locator, query string removed.
pub fn image_format(locator: &str) -> String {
    let last = locator.rsplit('.').next().unwrap_or("");
    let ext = last.split(['?', '#']).next().unwrap_or("");
    // "https://e.com/image" has no extension: the last segment is a path
    if ext.contains('/') {
        return String::new();
    }
    ext.to_ascii_lowercase()
}

/// Suggestions for one asset, in display order. Every rule is evaluated
/// independently.
pub fn recommend(asset: &Asset, byte_size: u64, format: &str, support: &FormatSupport) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if matches!(format, "jpg" | "jpeg" | "png") {
        if let Some(modern) = support.preferred_modern() {
            out.push(Recommendation::new(
                RecommendationKind::Format,
                Priority::High,
                format!("Convert to {} for 25-35% size reduction", modern),
            ));
        }
    }

    if asset.is_image_element() && !asset.lazy_loaded {
        out.push(Recommendation::new(
            RecommendationKind::Loading,
            Priority::Medium,
            "Add loading=\"lazy\" attribute",
        ));
    }

    if asset.is_image_element() && !asset.responsive {
        out.push(Recommendation::new(
            RecommendationKind::Responsive,
            Priority::Medium,
            "Use srcset for responsive images",
        ));
    }

    if asset.is_oversized() {
        out.push(Recommendation::new(
            RecommendationKind::Resize,
            Priority::High,
            format!(
                "Resize from {}x{} to ~{}x{}",
                asset.natural.width, asset.natural.height, asset.display.width, asset.display.height
            ),
        ));
    }

    if byte_size > 100 * KIB {
        let critical = byte_size > 500 * KIB;
        let (target, priority) = if critical { ("200KB", Priority::Critical) } else { ("100KB", Priority::Medium) };
        out.push(Recommendation::new(
            RecommendationKind::Compression,
            priority,
            format!("Compress image to under {}", target),
        ));
    }

    out
}
