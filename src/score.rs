//! Weighted page score and letter grade.
//!
//! A linear penalty model starting from 100. The weights are part of the
//! report format: changing them breaks comparisons against stored history.

use crate::asset::Asset;
use crate::classify::{classify, OptimizationLevel};
use crate::recommend::Recommendation;
use serde::{Deserialize, Serialize};

const PENALTY_CRITICAL: i64 = 15;
const PENALTY_WARNING: i64 = 8;
const PENALTY_NOTICE: i64 = 3;
const PENALTY_NO_LAZY: i64 = 2;
const PENALTY_NO_RESPONSIVE: i64 = 1;
const PENALTY_OVERSIZED: i64 = 3;
const PENALTY_AUTOPLAY: i64 = 10;

/// An asset whose size was resolved, with its derived level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedAsset {
    pub asset: Asset,
    pub byte_size: u64,
    pub level: OptimizationLevel,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl ClassifiedAsset {
    pub fn new(asset: Asset, byte_size: u64) -> Self {
        let level = classify(Some(byte_size));
        let asset = asset.with_size(Some(byte_size));
        Self { asset, byte_size, level, recommendations: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

/// Aggregate counts plus the clamped score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub critical_images: u32,
    pub warning_images: u32,
    pub notice_images: u32,
    pub no_lazy_load: u32,
    pub no_responsive: u32,
    pub oversized_images: u32,
    pub autoplay_videos: u32,
    pub total_size: u64,
    pub score: u32,
    pub grade: Grade,
}

/// Score a set of measured assets and the page's videos.
pub fn score(assets: &[ClassifiedAsset], videos: &[Asset]) -> ScoreBreakdown {
    let mut raw: i64 = 100;
    let mut b = ScoreBreakdown {
        critical_images: 0,
        warning_images: 0,
        notice_images: 0,
        no_lazy_load: 0,
        no_responsive: 0,
        oversized_images: 0,
        autoplay_videos: 0,
        total_size: 0,
        score: 100,
        grade: Grade::A,
    };

    for item in assets {
        b.total_size = b.total_size.saturating_add(item.byte_size);

        match item.level {
            OptimizationLevel::Critical => {
                b.critical_images += 1;
                raw -= PENALTY_CRITICAL;
            }
            OptimizationLevel::Warning => {
                b.warning_images += 1;
                raw -= PENALTY_WARNING;
            }
            OptimizationLevel::Notice => {
                b.notice_images += 1;
                raw -= PENALTY_NOTICE;
            }
            OptimizationLevel::Good => {}
        }

        let asset = &item.asset;
        if asset.is_image_element() && !asset.lazy_loaded {
            b.no_lazy_load += 1;
            raw -= PENALTY_NO_LAZY;
        }
        if asset.is_image_element() && !asset.responsive {
            b.no_responsive += 1;
            raw -= PENALTY_NO_RESPONSIVE;
        }
        if asset.is_oversized() {
            b.oversized_images += 1;
            raw -= PENALTY_OVERSIZED;
        }
    }

    b.autoplay_videos = videos.iter().filter(|v| v.autoplay).count() as u32;
    raw -= PENALTY_AUTOPLAY * i64::from(b.autoplay_videos);

    b.score = raw.clamp(0, 100) as u32;
    b.grade = Grade::from_score(b.score);
    b
}
