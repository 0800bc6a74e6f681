//! Asset discovery over a page snapshot.
//!
//! `AssetDirectory` enumerates images, CSS background images, videos,
//! tag-manager containers and named page blocks. It performs no network I/O
//! and never mutates the document.

use crate::asset::{Asset, AssetKind};
use crate::dom::{DocumentQuery, ElementId, ElementSnapshot};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn background_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"]*?))\s*\)"#).expect("valid url() pattern")
    })
}

fn autoplay_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bautoplay=1\b").expect("valid autoplay pattern"))
}

fn container_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"id=(GTM-[A-Z0-9]+)").expect("valid container id pattern"))
}

/// Images split by rendered visibility
#[derive(Debug, Clone, Default)]
pub struct DiscoveredImages {
    pub visible: Vec<Asset>,
    pub hidden: Vec<Asset>,
}

impl DiscoveredImages {
    /// Visible images first, then hidden ones
    pub fn all(&self) -> impl Iterator<Item = &Asset> {
        self.visible.iter().chain(self.hidden.iter())
    }

    pub fn len(&self) -> usize {
        self.visible.len() + self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_all(self) -> Vec<Asset> {
        let mut all = self.visible;
        all.extend(self.hidden);
        all
    }
}

/// A tag-manager container referenced by a `<script>` on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
    pub handle: ElementId,
    pub src: String,
}

/// How a page block was recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    /// Element whose id starts with `block`
    Block,
    /// Element carrying a `...contentSection...` class
    ContentSection,
    /// One of the well-known section classes
    Class,
}

/// A named section of the page that can be analyzed on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    pub id: String,
    pub kind: BlockKind,
    pub name: String,
    pub root: ElementId,
}

const NAMED_SECTION_CLASSES: &[(&str, &str)] = &[
    ("quickIntro", "Quick Intro"),
    ("introSec", "Intro Section"),
    ("bonusBlock", "Bonus Block"),
];

/// Read-only enumerator of the assets on one document
pub struct AssetDirectory<'a, D: DocumentQuery + ?Sized> {
    doc: &'a D,
    base: Option<Url>,
}

impl<'a, D: DocumentQuery + ?Sized> AssetDirectory<'a, D> {
    /// Fails when the document URL is present but not a valid URL, since
    /// no relative locator could then be resolved.
    pub fn new(doc: &'a D) -> Result<Self> {
        let url = doc.document_url().trim();
        let base = if url.is_empty() {
            None
        } else {
            Some(Url::parse(url).map_err(|e| {
                Error::DiscoveryError(format!("invalid document URL {:?}: {}", url, e))
            })?)
        };
        Ok(Self { doc, base })
    }

    /// All `<img>` elements with a source, split by visibility.
    pub fn discover_images(&self) -> DiscoveredImages {
        let mut out = DiscoveredImages::default();
        for id in self.doc.elements_by_tag("img") {
            if let Some(asset) = self.image_asset(id) {
                if asset.visible {
                    out.visible.push(asset);
                } else {
                    out.hidden.push(asset);
                }
            }
        }
        out
    }

    /// CSS background images, one asset per distinct URL.
    pub fn discover_background_images(&self) -> Vec<Asset> {
        let mut seen = HashSet::new();
        self.background_assets(self.doc.elements(), &mut seen)
    }

    /// HTML5 videos and embedded YouTube/Vimeo players.
    pub fn discover_videos(&self) -> Vec<Asset> {
        let mut out = Vec::new();
        for id in self.doc.elements() {
            let Some(el) = self.doc.element(id) else { continue };
            let asset = match el.tag.as_str() {
                "iframe" => {
                    let src = el.attr("src").unwrap_or("");
                    if !(src.contains("youtube") || src.contains("vimeo")) {
                        continue;
                    }
                    self.resolve(src).map(|locator| {
                        let mut a = Asset::new(id, locator, AssetKind::EmbeddedVideo);
                        a.autoplay = autoplay_regex().is_match(src);
                        a
                    })
                }
                "video" => self.video_source(id, el).map(|locator| {
                    let mut a = Asset::new(id, locator, AssetKind::Video);
                    a.autoplay = el.has_attr("autoplay");
                    a.has_poster = el.has_attr("poster");
                    a
                }),
                _ => None,
            };
            if let Some(mut a) = asset {
                a.visible = self.is_rendered(id);
                a.display = el.rect.map(|r| r.dimensions()).unwrap_or_default();
                out.push(a);
            }
        }
        out
    }

    /// Tag-manager containers loaded via `gtm.js?id=GTM-...`, first occurrence wins.
    pub fn discover_containers(&self) -> Vec<ContainerRef> {
        let mut out: Vec<ContainerRef> = Vec::new();
        for id in self.doc.elements_by_tag("script") {
            let Some(src) = self.doc.element(id).and_then(|e| e.attr("src")) else {
                continue;
            };
            if !src.contains("googletagmanager.com/gtm.js") {
                continue;
            }
            if let Some(cap) = container_id_regex().captures(src) {
                let cid = cap[1].to_string();
                if out.iter().all(|c| c.id != cid) {
                    out.push(ContainerRef { id: cid, handle: id, src: src.to_string() });
                }
            }
        }
        out
    }

    /// Named page sections, deduplicated by id.
    pub fn discover_blocks(&self) -> Vec<PageBlock> {
        let mut blocks = Vec::new();
        let mut seen = HashSet::new();

        for id in self.doc.elements() {
            let Some(el) = self.doc.element(id) else { continue };
            if let Some(eid) = el.attr("id").filter(|v| v.starts_with("block")) {
                if seen.insert(eid.to_string()) {
                    blocks.push(PageBlock {
                        id: eid.to_string(),
                        kind: BlockKind::Block,
                        name: capitalize(eid),
                        root: id,
                    });
                }
            }
        }

        for id in self.doc.elements() {
            let Some(el) = self.doc.element(id) else { continue };
            let Some(class) = el.classes().find(|c| c.contains("contentSection")) else {
                continue;
            };
            if seen.insert(class.to_string()) {
                blocks.push(PageBlock {
                    id: class.to_string(),
                    kind: BlockKind::ContentSection,
                    name: content_section_name(class),
                    root: id,
                });
            }
        }

        for (class, name) in NAMED_SECTION_CLASSES {
            let matching = self
                .doc
                .elements()
                .filter(|id| self.doc.element(*id).map(|e| e.classes().any(|c| c == *class)).unwrap_or(false));
            for (idx, id) in matching.enumerate() {
                let bid = format!("{}-{}", class, idx);
                if seen.insert(bid.clone()) {
                    blocks.push(PageBlock { id: bid, kind: BlockKind::Class, name: name.to_string(), root: id });
                }
            }
        }

        blocks
    }

    /// Images and background images below a block's root; the root itself
    /// is not included.
    pub fn images_in_block(&self, block: &PageBlock) -> Vec<Asset> {
        let mut subtree = self.doc.subtree(block.root);
        subtree.retain(|id| *id != block.root);
        let mut out: Vec<Asset> = subtree
            .iter()
            .filter(|id| self.doc.element(**id).map(|e| e.tag == "img").unwrap_or(false))
            .filter_map(|id| self.image_asset(*id))
            .collect();
        let mut seen = HashSet::new();
        out.extend(self.background_assets(subtree.into_iter(), &mut seen));
        out
    }

    fn image_asset(&self, id: ElementId) -> Option<Asset> {
        let el = self.doc.element(id)?;
        let raw = el
            .current_src
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| el.attr("src").filter(|s| !s.trim().is_empty()))
            .or_else(|| el.attr("data-src"))?;
        let locator = self.resolve(raw)?;

        let mut asset = Asset::new(id, locator, AssetKind::Image);
        asset.visible = self.is_rendered(id);
        asset.lazy_loaded = el.has_attr("loading") || el.has_attr("data-src");
        asset.responsive = el.has_attr("srcset");
        asset.natural = el.natural.unwrap_or_default();
        asset.display = el.rect.map(|r| r.dimensions()).unwrap_or(asset.natural);
        Some(asset)
    }

    fn background_assets(
        &self,
        ids: impl Iterator<Item = ElementId>,
        seen: &mut HashSet<String>,
    ) -> Vec<Asset> {
        let mut out = Vec::new();
        for id in ids {
            let Some(el) = self.doc.element(id) else { continue };
            let Some(bg) = el.style.background_image.as_deref() else { continue };
            if bg.trim().eq_ignore_ascii_case("none") {
                continue;
            }
            for cap in background_url_regex().captures_iter(bg) {
                let raw = cap
                    .get(1)
                    .or_else(|| cap.get(2))
                    .or_else(|| cap.get(3))
                    .map(|m| m.as_str().trim())
                    .unwrap_or("");
                if raw.is_empty() || raw.starts_with("data:") {
                    continue;
                }
                let Some(locator) = self.resolve(raw) else { continue };
                if !seen.insert(locator.clone()) {
                    continue;
                }
                let mut asset = Asset::new(id, locator, AssetKind::BackgroundImage);
                asset.visible = self.is_rendered(id);
                asset.display = el.rect.map(|r| r.dimensions()).unwrap_or_default();
                out.push(asset);
            }
        }
        out
    }

    fn video_source(&self, id: ElementId, el: &ElementSnapshot) -> Option<String> {
        let direct = el
            .current_src
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| el.attr("src").filter(|s| !s.trim().is_empty()));
        let raw = match direct {
            Some(s) => s,
            None => self
                .doc
                .subtree(id)
                .into_iter()
                .filter_map(|cid| self.doc.element(cid))
                .find(|c| c.tag == "source" && c.attr("src").is_some_and(|s| !s.trim().is_empty()))
                .and_then(|c| c.attr("src"))?,
        };
        self.resolve(raw)
    }

    /// Rendered: attached, non-empty box, opaque, and not hidden by itself
    /// or an ancestor.
    fn is_rendered(&self, id: ElementId) -> bool {
        let Some(el) = self.doc.element(id) else { return false };
        if !el.connected || el.style.is_display_none() || el.style.opacity() <= 0.0 {
            return false;
        }
        if let Some(rect) = el.rect {
            if !rect.has_area() {
                return false;
            }
        }

        // `visibility` inherits: the nearest explicit value decides
        let mut visibility = el.style.visibility.is_some().then_some(&el.style);
        for anc in self.doc.ancestors(id) {
            let Some(a) = self.doc.element(anc) else { return false };
            if !a.connected || a.style.is_display_none() || a.style.opacity() <= 0.0 {
                return false;
            }
            if visibility.is_none() && a.style.visibility.is_some() {
                visibility = Some(&a.style);
            }
        }
        !visibility.is_some_and(|style| style.is_visibility_hidden())
    }

    fn resolve(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with("data:") {
            return Some(raw.to_string());
        }
        match &self.base {
            Some(base) => base.join(raw).ok().map(|u| u.to_string()),
            None => Some(Url::parse(raw).map(|u| u.to_string()).unwrap_or_else(|_| raw.to_string())),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `contentSectionHeroBanner` -> "Hero Banner", `contentSection12` -> "Section 12"
fn content_section_name(class: &str) -> String {
    let suffix = class.replacen("contentSection", "", 1);
    let mut spaced = String::new();
    for c in suffix.chars() {
        if c.is_ascii_uppercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }
    let name = spaced.trim().to_string();
    if name.chars().count() <= 2 {
        format!("Section {}", suffix)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ComputedStyle, Dimensions, ElementSnapshot, PageSnapshot, Rect};

    fn page(html: &str) -> PageSnapshot {
        PageSnapshot::from_html(html, "https://shop.example.com/models/")
    }

    #[test]
    fn images_split_by_visibility_and_resolved() {
        let p = page(
            r#"<body>
              <img src="hero.jpg" width="600" height="300" loading="lazy" srcset="hero-2x.jpg 2x">
              <div style="display:none"><img src="/hidden.png" width="10" height="10"></div>
              <img src="zero.png" width="0" height="10">
              <img alt="no source">
            </body>"#,
        );
        let dir = AssetDirectory::new(&p).unwrap();
        let images = dir.discover_images();
        assert_eq!(images.visible.len(), 1);
        assert_eq!(images.hidden.len(), 2);

        let hero = &images.visible[0];
        assert_eq!(hero.locator, "https://shop.example.com/models/hero.jpg");
        assert!(hero.lazy_loaded);
        assert!(hero.responsive);
        assert_eq!(hero.display, Dimensions::new(600, 300));
        assert_eq!(images.hidden[0].locator, "https://shop.example.com/hidden.png");

        let all: Vec<_> = images.all().map(|a| a.locator.as_str()).collect();
        assert_eq!(all[0], "https://shop.example.com/models/hero.jpg");
    }

    #[test]
    fn visibility_inherits_from_ancestors() {
        let p = page(
            r#"<div style="visibility:hidden">
                 <img id="a" src="a.jpg">
                 <span style="visibility:visible"><img id="b" src="b.jpg"></span>
               </div>
               <div style="opacity:0"><img src="c.jpg"></div>"#,
        );
        let images = AssetDirectory::new(&p).unwrap().discover_images();
        let visible: Vec<_> = images.visible.iter().map(|a| a.locator.rsplit('/').next().unwrap()).collect();
        assert_eq!(visible, vec!["b.jpg"]);
        assert_eq!(images.hidden.len(), 2);
    }

    #[test]
    fn background_images_deduplicated_and_data_uri_excluded() {
        let p = page(
            r#"<div style="background-image: url('bg.webp'), url(&quot;data:image/png;base64,AAAA&quot;)"></div>
               <section style="background: #fff url(bg.webp) no-repeat"></section>
               <section style="background-image: url(&quot;/other.jpg&quot;)"></section>
               <p style="background-image:none"></p>"#,
        );
        let bgs = AssetDirectory::new(&p).unwrap().discover_background_images();
        let locs: Vec<_> = bgs.iter().map(|a| a.locator.as_str()).collect();
        assert_eq!(
            locs,
            vec!["https://shop.example.com/models/bg.webp", "https://shop.example.com/other.jpg"]
        );
        assert!(bgs.iter().all(|a| a.kind == AssetKind::BackgroundImage));
    }

    #[test]
    fn videos_and_embeds() {
        let p = page(
            r#"<video autoplay poster="p.jpg"><source src="/clip.mp4" type="video/mp4"></video>
               <video src="quiet.webm"></video>
               <iframe src="https://www.youtube.com/embed/xyz?autoplay=1&mute=1"></iframe>
               <iframe src="https://player.vimeo.com/video/1"></iframe>
               <iframe src="https://maps.example.com/embed"></iframe>
               <video></video>"#,
        );
        let videos = AssetDirectory::new(&p).unwrap().discover_videos();
        assert_eq!(videos.len(), 4);
        assert_eq!(videos[0].locator, "https://shop.example.com/clip.mp4");
        assert!(videos[0].autoplay);
        assert!(videos[0].has_poster);
        assert!(!videos[1].autoplay);
        assert_eq!(videos[2].kind, AssetKind::EmbeddedVideo);
        assert!(videos[2].autoplay);
        assert!(!videos[3].autoplay);
    }

    #[test]
    fn containers_deduplicated() {
        let p = page(
            r#"<script src="https://www.googletagmanager.com/gtm.js?id=GTM-ABC123"></script>
               <script src="https://www.googletagmanager.com/gtm.js?id=GTM-ABC123&l=dl"></script>
               <script src="https://www.googletagmanager.com/gtm.js?id=GTM-XYZ9"></script>
               <script src="/app.js"></script>"#,
        );
        let ids: Vec<_> = AssetDirectory::new(&p)
            .unwrap()
            .discover_containers()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["GTM-ABC123", "GTM-XYZ9"]);
    }

    #[test]
    fn blocks_and_block_images() {
        let p = page(
            r#"<div id="blockHero"><img src="h.jpg"><div style="background-image:url(h-bg.jpg)"></div></div>
               <div class="wrap contentSectionSpecialOffers"><img src="o.jpg"></div>
               <div class="contentSection12"></div>
               <div class="quickIntro"></div><div class="quickIntro"></div>
               <div class="bonusBlock"></div>"#,
        );
        let dir = AssetDirectory::new(&p).unwrap();
        let blocks = dir.discover_blocks();
        let names: Vec<_> = blocks.iter().map(|b| (b.id.as_str(), b.name.as_str())).collect();
        assert_eq!(
            names,
            vec![
                ("blockHero", "BlockHero"),
                ("contentSectionSpecialOffers", "Special Offers"),
                ("contentSection12", "Section 12"),
                ("quickIntro-0", "Quick Intro"),
                ("quickIntro-1", "Quick Intro"),
                ("bonusBlock-0", "Bonus Block"),
            ]
        );

        let hero = dir.images_in_block(&blocks[0]);
        assert_eq!(hero.len(), 2);
        assert_eq!(hero[0].kind, AssetKind::Image);
        assert_eq!(hero[1].kind, AssetKind::BackgroundImage);
    }

    #[test]
    fn block_root_is_not_its_own_image() {
        let p = page(
            r#"<div id="blockPromo" style="background-image:url(promo-bg.jpg)"><img src="inner.jpg"></div>
               <img id="blockLogo" src="logo.png">"#,
        );
        let dir = AssetDirectory::new(&p).unwrap();
        let blocks = dir.discover_blocks();
        assert_eq!(blocks.len(), 2);

        let promo = dir.images_in_block(&blocks[0]);
        let locators: Vec<_> = promo.iter().map(|a| a.locator.as_str()).collect();
        assert_eq!(locators, vec!["https://shop.example.com/models/inner.jpg"]);
        assert!(dir.images_in_block(&blocks[1]).is_empty());
    }

    #[test]
    fn invalid_document_url_is_a_discovery_error() {
        let p = PageSnapshot::new("not a url");
        assert!(matches!(AssetDirectory::new(&p), Err(Error::DiscoveryError(_))));
    }

    #[test]
    fn recorded_snapshot_geometry_drives_visibility() {
        let mut p = PageSnapshot::new("https://e.com/");
        let mut img = ElementSnapshot::new("img");
        img.attributes.insert("src".into(), "a.jpg".into());
        img.current_src = Some("https://cdn.e.com/a@2x.jpg".into());
        img.rect = Some(Rect::sized(200.0, 100.0));
        img.natural = Some(Dimensions::new(800, 400));
        p.push(img);
        let mut ghost = ElementSnapshot::new("img");
        ghost.attributes.insert("src".into(), "b.jpg".into());
        ghost.style = ComputedStyle::parse_inline("opacity: 0");
        p.push(ghost);

        let images = AssetDirectory::new(&p).unwrap().discover_images();
        assert_eq!(images.visible[0].locator, "https://cdn.e.com/a@2x.jpg");
        assert!(images.visible[0].is_oversized());
        assert_eq!(images.hidden[0].locator, "https://e.com/b.jpg");
    }
}
