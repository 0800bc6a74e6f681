//! Serializable result of one completed scan

use crate::asset::{Asset, AssetKind};
use crate::classify::OptimizationLevel;
use crate::fingerprint::GtmSourceAttribution;
use crate::recommend::Recommendation;
use crate::score::{ClassifiedAsset, Grade, ScoreBreakdown};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub locator: String,
    pub kind: AssetKind,
    pub byte_size: u64,
    pub level: OptimizationLevel,
    pub visible: bool,
    pub recommendations: Vec<Recommendation>,
}

impl From<&ClassifiedAsset> for AssetReport {
    fn from(c: &ClassifiedAsset) -> Self {
        Self {
            locator: c.asset.locator.clone(),
            kind: c.asset.kind,
            byte_size: c.byte_size,
            level: c.level,
            visible: c.asset.visible,
            recommendations: c.recommendations.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReport {
    pub locator: String,
    pub kind: AssetKind,
    pub autoplay: bool,
}

impl From<&Asset> for VideoReport {
    fn from(v: &Asset) -> Self {
        Self { locator: v.locator.clone(), kind: v.kind, autoplay: v.autoplay }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub score: u32,
    pub grade: Grade,
    pub breakdown: ScoreBreakdown,
    /// Measured assets in discovery order
    pub assets: Vec<AssetReport>,
    pub videos: Vec<VideoReport>,
    /// Locators whose size could not be resolved
    pub unmeasured: Vec<String>,
    /// Measured assets that are not rendered
    pub hidden: Vec<String>,
    pub vendor_attributions: Vec<GtmSourceAttribution>,
}

impl ScanReport {
    pub fn new(url: &str, breakdown: ScoreBreakdown, measured: &[ClassifiedAsset], videos: &[Asset]) -> Self {
        Self {
            timestamp: Utc::now(),
            url: url.to_string(),
            score: breakdown.score,
            grade: breakdown.grade,
            breakdown,
            assets: measured.iter().map(AssetReport::from).collect(),
            videos: videos.iter().map(VideoReport::from).collect(),
            unmeasured: Vec::new(),
            hidden: measured.iter().filter(|c| !c.asset.visible).map(|c| c.asset.locator.clone()).collect(),
            vendor_attributions: Vec::new(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Measured assets at a given level
    pub fn assets_at(&self, level: OptimizationLevel) -> impl Iterator<Item = &AssetReport> {
        self.assets.iter().filter(move |a| a.level == level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KIB;
    use crate::dom::ElementId;
    use crate::score::score;

    #[test]
    fn report_serializes_camel_case() {
        let mut hidden = Asset::new(ElementId(3), "https://e.com/h.png", AssetKind::Image);
        hidden.visible = false;
        let measured = vec![
            ClassifiedAsset::new(Asset::new(ElementId(1), "https://e.com/a.jpg", AssetKind::Image), 300 * KIB),
            ClassifiedAsset::new(hidden, 10),
        ];
        let mut video = Asset::new(ElementId(5), "https://youtube.com/embed/x?autoplay=1", AssetKind::EmbeddedVideo);
        video.autoplay = true;
        let videos = vec![video];

        let report = ScanReport::new("https://e.com/", score(&measured, &videos), &measured, &videos);
        assert_eq!(report.hidden, vec!["https://e.com/h.png".to_string()]);
        assert_eq!(report.assets_at(OptimizationLevel::Warning).count(), 1);

        let json = report.to_json_pretty().unwrap();
        assert!(json.contains("\"vendorAttributions\": []"));
        assert!(json.contains("\"byteSize\": 307200"));
        assert!(json.contains("\"level\": \"WARNING\""));
        assert!(json.contains("\"kind\": \"embeddedVideo\""));

        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
