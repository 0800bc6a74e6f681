//! Read-only page snapshot consumed by asset discovery.
//!
//! The analyzer never holds live presentation objects. A page is handed over
//! as an arena of `ElementSnapshot`s addressed by `ElementId`, either recorded
//! by a browser-side collaborator (JSON) or built from static HTML with
//! `scraper`. Discovery only talks to the `DocumentQuery` trait.

use crate::{Error, Result};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Opaque handle to an element inside a `PageSnapshot` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

/// Width/height pair in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Bounding client rect of a rendered element
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn sized(width: f64, height: f64) -> Self {
        Self { x: 0.0, y: 0.0, width, height }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width.max(0.0).round() as u32,
            height: self.height.max(0.0).round() as u32,
        }
    }
}

/// The subset of computed style the analyzer reads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display: Option<String>,
    pub visibility: Option<String>,
    pub opacity: Option<f64>,
    pub background_image: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ComputedStyle {
    /// Parse an inline `style="..."` declaration list.
    pub fn parse_inline(decls: &str) -> Self {
        let mut style = ComputedStyle::default();
        for decl in decls.split(';') {
            let Some((name, value)) = decl.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim();
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "display" => style.display = Some(value.to_ascii_lowercase()),
                "visibility" => style.visibility = Some(value.to_ascii_lowercase()),
                "opacity" => style.opacity = value.parse().ok(),
                "background-image" => style.background_image = Some(value.to_string()),
                // `background` shorthand only matters for its url() layers
                "background" if value.contains("url(") => {
                    style.background_image = Some(value.to_string())
                }
                "width" => style.width = parse_px(value),
                "height" => style.height = parse_px(value),
                _ => {}
            }
        }
        style
    }

    pub fn is_display_none(&self) -> bool {
        self.display.as_deref() == Some("none")
    }

    pub fn is_visibility_hidden(&self) -> bool {
        matches!(self.visibility.as_deref(), Some("hidden") | Some("collapse"))
    }

    pub fn opacity(&self) -> f64 {
        self.opacity.unwrap_or(1.0)
    }
}

fn parse_px(value: &str) -> Option<f64> {
    let v = value.trim();
    let v = v.strip_suffix("px").unwrap_or(v);
    v.trim().parse::<f64>().ok()
}

fn default_connected() -> bool {
    true
}

/// One element of the page, snapshotted at load/render time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub style: ComputedStyle,
    /// Layout box; `None` when the snapshot carries no geometry (static HTML)
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Intrinsic size of replaced content (images, video frames)
    #[serde(default)]
    pub natural: Option<Dimensions>,
    /// Source actually selected by the browser (`img.currentSrc`)
    #[serde(default)]
    pub current_src: Option<String>,
    #[serde(default)]
    pub parent: Option<ElementId>,
    /// Whether the element is attached to the document tree
    #[serde(default = "default_connected")]
    pub connected: bool,
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            style: ComputedStyle::default(),
            rect: None,
            natural: None,
            current_src: None,
            parent: None,
            connected: true,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }
}

/// DOM-like query capability asset discovery is written against.
pub trait DocumentQuery {
    /// URL of the loaded document, used to resolve relative locators
    fn document_url(&self) -> &str;

    /// Number of elements in document order
    fn element_count(&self) -> usize;

    /// Look up one element
    fn element(&self, id: ElementId) -> Option<&ElementSnapshot>;

    /// All element handles in document order
    fn elements(&self) -> Box<dyn Iterator<Item = ElementId> + '_> {
        Box::new((0..self.element_count()).map(ElementId))
    }

    /// Handles of elements with the given tag name, in document order
    fn elements_by_tag<'a>(&'a self, tag: &'a str) -> Box<dyn Iterator<Item = ElementId> + 'a> {
        Box::new(self.elements().filter(move |id| {
            self.element(*id)
                .map(|e| e.tag.eq_ignore_ascii_case(tag))
                .unwrap_or(false)
        }))
    }

    /// Ancestors of `id`, nearest first
    fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut cur = self.element(id).and_then(|e| e.parent);
        while let Some(p) = cur {
            // Guard against malformed snapshots that loop
            if out.contains(&p) || out.len() > self.element_count() {
                break;
            }
            out.push(p);
            cur = self.element(p).and_then(|e| e.parent);
        }
        out
    }

    /// Whether `id` lies inside the subtree rooted at `root` (inclusive)
    fn is_within(&self, id: ElementId, root: ElementId) -> bool {
        id == root || self.ancestors(id).contains(&root)
    }

    /// Handles of `root` and all its descendants, in document order
    fn subtree(&self, root: ElementId) -> Vec<ElementId> {
        self.elements().filter(|id| self.is_within(*id, root)).collect()
    }
}

/// Arena-backed snapshot of one loaded document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub elements: Vec<ElementSnapshot>,
}

impl DocumentQuery for PageSnapshot {
    fn document_url(&self) -> &str {
        &self.url
    }

    fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn element(&self, id: ElementId) -> Option<&ElementSnapshot> {
        self.elements.get(id.0)
    }
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), elements: Vec::new() }
    }

    /// Append an element and return its handle
    pub fn push(&mut self, element: ElementSnapshot) -> ElementId {
        self.elements.push(element);
        ElementId(self.elements.len() - 1)
    }

    /// Build a static snapshot from HTML source.
    ///
    /// There is no layout engine behind this: geometry comes from inline
    /// `width`/`height` styles or attributes, computed style from the inline
    /// `style` attribute only. `data-natural-width`/`data-natural-height`
    /// override the intrinsic size, which otherwise defaults to the declared
    /// size.
    pub fn from_html(html: &str, url: &str) -> Self {
        let document = Html::parse_document(html);
        let mut snapshot = PageSnapshot::new(url);

        let root = document.root_element();
        let mut stack: Vec<(ElementRef, Option<ElementId>)> = vec![(root, None)];
        while let Some((node, parent)) = stack.pop() {
            let mut el = ElementSnapshot::new(node.value().name());
            el.parent = parent;
            for (k, v) in node.value().attrs() {
                el.attributes.insert(k.to_ascii_lowercase(), v.to_string());
            }
            if let Some(style) = el.attr("style").map(ComputedStyle::parse_inline) {
                el.style = style;
            }

            let width = el.style.width.or_else(|| el.attr("width").and_then(parse_px));
            let height = el.style.height.or_else(|| el.attr("height").and_then(parse_px));
            if let (Some(w), Some(h)) = (width, height) {
                el.rect = Some(Rect::sized(w, h));
            }

            let natural_w = el.attr("data-natural-width").and_then(|v| v.parse::<u32>().ok());
            let natural_h = el.attr("data-natural-height").and_then(|v| v.parse::<u32>().ok());
            el.natural = match (natural_w, natural_h) {
                (Some(w), Some(h)) => Some(Dimensions::new(w, h)),
                _ => el.rect.map(|r| r.dimensions()),
            };

            let id = snapshot.push(el);
            let children: Vec<_> = node.children().filter_map(ElementRef::wrap).collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }
        snapshot
    }

    /// Load a snapshot recorded as JSON by a browser-side collaborator
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::LoadError(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&data)?)
    }
}
