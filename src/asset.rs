//! Discovered media assets

use crate::dom::{Dimensions, ElementId};
use serde::{Deserialize, Serialize};

/// What kind of visual resource an asset is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    /// `<img>` element
    Image,
    /// CSS `background-image` layer
    BackgroundImage,
    /// HTML5 `<video>`
    Video,
    /// Embedded player iframe (YouTube, Vimeo)
    EmbeddedVideo,
}

impl AssetKind {
    pub fn is_video(self) -> bool {
        matches!(self, AssetKind::Video | AssetKind::EmbeddedVideo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::BackgroundImage => "backgroundImage",
            AssetKind::Video => "video",
            AssetKind::EmbeddedVideo => "embeddedVideo",
        }
    }
}

/// One discovered visual resource.
///
/// Created during discovery with `byte_size = None`; the scan attaches the
/// resolved size once and treats the asset as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Handle of the source element in the page snapshot
    pub handle: ElementId,
    /// Absolute URL of the resource
    pub locator: String,
    pub kind: AssetKind,
    pub visible: bool,
    pub lazy_loaded: bool,
    pub responsive: bool,
    pub natural: Dimensions,
    pub display: Dimensions,
    pub byte_size: Option<u64>,
    /// Only meaningful for videos
    pub autoplay: bool,
    /// `<video poster>` present
    pub has_poster: bool,
}

impl Asset {
    pub fn new(handle: ElementId, locator: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            handle,
            locator: locator.into(),
            kind,
            visible: true,
            lazy_loaded: false,
            responsive: false,
            natural: Dimensions::default(),
            display: Dimensions::default(),
            byte_size: None,
            autoplay: false,
            has_poster: false,
        }
    }

    /// `<img>` elements are the only assets judged on lazy/responsive hints
    pub fn is_image_element(&self) -> bool {
        self.kind == AssetKind::Image
    }

    /// Intrinsic width more than twice the rendered width
    pub fn is_oversized(&self) -> bool {
        self.is_image_element() && u64::from(self.natural.width) > u64::from(self.display.width) * 2
    }

    pub fn with_size(mut self, byte_size: Option<u64>) -> Self {
        self.byte_size = byte_size;
        self
    }
}
