//! Tag-manager container attribution.
//!
//! A container payload is scored against two data tables: third-party vendor
//! signatures and first-party platform markers. The decision rule on top of
//! the accumulated scores is fixed; extending detection means adding table
//! rows, not branches.

use crate::resolver::RetryPolicy;
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

pub const FETCH_FAILED_SOURCE: &str = "Unknown (Fetch Failed)";
pub const CUSTOM_SOURCE: &str = "Custom Implementation";

/// A third-party vendor fingerprint
#[derive(Debug, Clone)]
pub struct VendorSignature {
    pub name: String,
    pub domain_pattern: Regex,
    pub keyword_pattern: Regex,
    pub category: String,
    pub weight: u32,
}

impl VendorSignature {
    /// Compile a signature; patterns are matched case-insensitively.
    pub fn new(name: &str, domains: &str, keywords: &str, category: &str, weight: u32) -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(&format!("(?i){}", p))
                .map_err(|e| Error::ConfigError(format!("bad pattern for vendor {}: {}", name, e)))
        };
        Ok(Self {
            name: name.to_string(),
            domain_pattern: compile(domains)?,
            keyword_pattern: compile(keywords)?,
            category: category.to_string(),
            weight,
        })
    }
}

// (name, domain pattern, keyword pattern, category, weight)
const VENDOR_TABLE: &[(&str, &str, &str, &str, u32)] = &[
    ("CallRail", r"callrail\.com|cdn\.callrail", r"callrail|swap\.js|dynamic_number", "Call Tracking", 5),
    ("CallTrackingMetrics", r"calltrackingmetrics\.com", r"calltrackingmetrics", "Call Tracking", 5),
    ("Mongoose", r"mongooseresearch\.com|callrevu\.com", r"mongoose|callrevu", "Call Tracking", 5),
    ("ActivEngage", r"activengage\.com|ae-cdn", r"activengage|ae_chat", "Live Chat", 5),
    ("Gubagoo", r"gubagoo\.com|gubagoo\.io", r"gubagoo", "Live Chat", 5),
    ("CarNow", r"carnow\.com|carnowcdn", r"carnow|cn_chat", "Live Chat", 5),
    ("VinSolutions", r"vinsolutions\.com|vincue", r"vinsolutions|connect_cta", "CRM", 4),
    ("Elead", r"elead-crm\.com|eleadcrm", r"elead|eleadcrm", "CRM", 4),
    ("AutoSweet", r"autosweet\.com|silentvisitor", r"autosweet|silentvisitor|as_track", "Analytics", 4),
    ("FullStory", r"fullstory\.com", r"fullstory|_fs_", "Analytics", 3),
    ("Hotjar", r"hotjar\.com", r"hotjar|_hj_id", "Analytics", 3),
    ("Facebook", r"facebook\.com|fbcdn", r"fbevents", "Advertising", 2),
    ("AdRoll", r"adroll\.com", r"adroll|__adroll_adv", "Advertising", 3),
    ("Criteo", r"criteo\.com|criteo\.net", r"criteo|criteoq", "Advertising", 3),
    ("Conversica", r"conversica\.com", r"conversica", "AI Engagement", 4),
    ("Podium", r"podium\.com|podium\.io", r"podium|podium_widget", "Reviews", 4),
];

/// The built-in vendor signature table
pub fn default_vendor_signatures() -> &'static [VendorSignature] {
    static TABLE: OnceLock<Vec<VendorSignature>> = OnceLock::new();
    TABLE.get_or_init(|| {
        VENDOR_TABLE
            .iter()
            .map(|(name, domains, keywords, category, weight)| {
                VendorSignature::new(name, domains, keywords, category, *weight).expect("valid vendor table")
            })
            .collect()
    })
}

/// The first-party platform whose own injection is recognised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformProfile {
    /// Display name used in source labels and evidence
    pub name: String,
    /// Pattern for direct references to the platform (case-insensitive)
    pub reference_pattern: String,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self {
            name: "DealerOn".to_string(),
            reference_pattern: r"dealeron|cosmos_dealer_id|dealertag".to_string(),
        }
    }
}

/// One first-party heuristic: fires when `pattern` matches at least
/// `threshold` times, adding `weight` to the platform score.
#[derive(Debug, Clone)]
pub struct PlatformMarker {
    pub pattern: Regex,
    pub threshold: usize,
    pub weight: u32,
    /// Evidence line; `{count}` and `{platform}` are substituted
    pub evidence: String,
}

impl PlatformMarker {
    fn new(pattern: &str, threshold: usize, weight: u32, evidence: &str) -> Result<Self> {
        let pattern =
            Regex::new(pattern).map_err(|e| Error::ConfigError(format!("bad platform marker pattern: {}", e)))?;
        Ok(Self { pattern, threshold, weight, evidence: evidence.to_string() })
    }
}

fn platform_markers(profile: &PlatformProfile) -> Result<Vec<PlatformMarker>> {
    Ok(vec![
        PlatformMarker::new(
            r"eventModel\.(item_make|item_model|item_year|cta_type|cta_name|page_type|event_owner)",
            3,
            3,
            "{count} {platform} eventModel variables",
        )?,
        PlatformMarker::new(
            r"(?i)(kia|toyota|subaru|chrysler|dodge|jeep|ram|alfaromeo|fiat)\.(com|net)",
            15,
            4,
            "{count} automotive dealership domains",
        )?,
        PlatformMarker::new(r"G-[A-Z0-9]{7,}", 4, 2, "{count} GA4 property IDs (multi-dealer)")?,
        PlatformMarker::new(r"\d{3}-\d{3}-\d{4}", 10, 2, "{count} phone tracking numbers")?,
        PlatformMarker::new(
            r"(?i)(inventory_date|item_condition|item_price|item_number|item_variant|item_color)",
            5,
            2,
            "Vehicle inventory tracking detected",
        )?,
        PlatformMarker::new(
            r"(?i)(element_text|element_color|element_order|element_type|element_subtype)",
            3,
            1,
            "{platform} element tracking found",
        )?,
        PlatformMarker::new(
            &format!("(?i)({})", profile.reference_pattern),
            1,
            5,
            "Direct {platform} platform reference",
        )?,
    ])
}

/// A vendor detected in a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMatch {
    pub name: String,
    pub category: String,
    pub confidence: u32,
    pub evidence: Vec<String>,
}

/// Tag families referenced by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub kind: String,
    pub count: usize,
}

/// Who injected a container, and how sure we are
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GtmSourceAttribution {
    pub container_id: String,
    pub source: String,
    /// 0..=100
    pub confidence: u32,
    pub evidence: Vec<String>,
    pub is_primary_platform: bool,
    pub platform_score: u32,
    pub vendors: Vec<VendorMatch>,
    #[serde(default)]
    pub tags: Vec<TagUsage>,
}

impl GtmSourceAttribution {
    fn fetch_failed(container_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            source: FETCH_FAILED_SOURCE.to_string(),
            confidence: 0,
            evidence: vec!["Unable to fetch container".to_string()],
            is_primary_platform: false,
            platform_score: 0,
            vendors: Vec::new(),
            tags: Vec::new(),
        }
    }
}

const TAG_PATTERNS: &[(&str, &str)] = &[
    ("GA4", r"gtag\(|G-[A-Z0-9]{10}|google-analytics\.com/analytics\.js"),
    ("Facebook Pixel", r"facebook|fbq|connect\.facebook\.net"),
    ("LinkedIn Insight", r"linkedin|snap\.licdn\.com"),
    ("TikTok Pixel", r"tiktok|analytics\.tiktok\.com"),
    ("Hotjar", r"hotjar|static\.hotjar\.com"),
    ("Custom HTML", r"<script|<iframe"),
];

/// Count tag families referenced by a container payload; absent kinds are omitted.
pub fn inventory_tags(payload: &str) -> Vec<TagUsage> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        TAG_PATTERNS
            .iter()
            .map(|(kind, p)| (*kind, Regex::new(p).expect("valid tag pattern")))
            .collect()
    });
    patterns
        .iter()
        .filter_map(|(kind, re)| {
            let count = re.find_iter(payload).count();
            (count > 0).then(|| TagUsage { kind: kind.to_string(), count })
        })
        .collect()
}

/// Where container payloads come from
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// Container script text, or `None` if it could not be fetched
    async fn fetch_container(&self, container_id: &str) -> Option<String>;
}

/// Fetches `gtm.js?id=...` over HTTP
#[cfg(feature = "http")]
pub struct HttpContainerSource {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "http")]
impl HttpContainerSource {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.googletagmanager.com/gtm.js";

    pub fn new(user_agent: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint: Self::DEFAULT_ENDPOINT.to_string() })
    }

    /// Point at a different `gtm.js` endpoint (mirrors, test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ContainerSource for HttpContainerSource {
    async fn fetch_container(&self, container_id: &str) -> Option<String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("id", container_id)])
            .send()
            .await
            .map_err(|e| debug!("container {} fetch failed: {}", container_id, e))
            .ok()?;
        if !resp.status().is_success() {
            debug!("container {} fetch returned {}", container_id, resp.status());
            return None;
        }
        resp.text().await.ok()
    }
}

/// Scores container payloads against vendor and platform tables
pub struct VendorFingerprintMatcher {
    vendors: Vec<VendorSignature>,
    markers: Vec<PlatformMarker>,
    platform: PlatformProfile,
    source: Option<Arc<dyn ContainerSource>>,
    policy: RetryPolicy,
}

impl VendorFingerprintMatcher {
    pub fn new(platform: PlatformProfile) -> Result<Self> {
        Ok(Self {
            vendors: default_vendor_signatures().to_vec(),
            markers: platform_markers(&platform)?,
            platform,
            source: None,
            policy: RetryPolicy::default(),
        })
    }

    /// Replace the vendor table
    pub fn with_vendors(mut self, vendors: Vec<VendorSignature>) -> Self {
        self.vendors = vendors;
        self
    }

    /// Attach the network side used by `identify_source`
    pub fn with_source(mut self, source: Arc<dyn ContainerSource>, policy: RetryPolicy) -> Self {
        self.source = Some(source);
        self.policy = policy;
        self
    }

    pub fn platform(&self) -> &PlatformProfile {
        &self.platform
    }

    /// Fetch a container and attribute it. Fetch failures yield an
    /// "Unknown (Fetch Failed)" attribution with zero confidence.
    pub async fn identify_source(&self, container_id: &str) -> GtmSourceAttribution {
        let payload = match &self.source {
            Some(source) => {
                self.policy
                    .retry(|_| {
                        let source = source.clone();
                        async move { source.fetch_container(container_id).await }
                    })
                    .await
            }
            None => None,
        };

        match payload {
            Some(text) => {
                let mut attribution = self.identify_payload(container_id, &text);
                attribution.tags = inventory_tags(&text);
                attribution
            }
            None => {
                warn!("Failed to fetch container {}", container_id);
                GtmSourceAttribution::fetch_failed(container_id)
            }
        }
    }

    /// Attribute an already-fetched payload.
    pub fn identify_payload(&self, container_id: &str, payload: &str) -> GtmSourceAttribution {
        let vendors = self.match_vendors(payload);
        let (platform_score, evidence) = self.platform_signals(payload);
        let name = &self.platform.name;

        let (source, confidence, is_primary_platform) = if platform_score >= 8 {
            (format!("{} Platform (OEM)", name), (60 + platform_score * 5).min(95), true)
        } else if platform_score >= 5 {
            (format!("Likely {} Platform", name), 70, true)
        } else if let Some(top) = top_vendor(&vendors) {
            (format!("Third-Party: {}", top.name), top.confidence, false)
        } else {
            (CUSTOM_SOURCE.to_string(), 50, false)
        };
        debug!("container {} -> {} ({}%, platform score {})", container_id, source, confidence, platform_score);

        GtmSourceAttribution {
            container_id: container_id.to_string(),
            source,
            confidence,
            evidence,
            is_primary_platform,
            platform_score,
            vendors,
            tags: Vec::new(),
        }
    }

    fn match_vendors(&self, payload: &str) -> Vec<VendorMatch> {
        let mut out = Vec::new();
        for sig in &self.vendors {
            let mut score = 0u32;
            let mut evidence = Vec::new();
            if sig.domain_pattern.is_match(payload) {
                score += 3;
                evidence.push("Domain found".to_string());
            }
            let keywords = sig.keyword_pattern.find_iter(payload).count();
            if keywords > 0 {
                score += 2;
                evidence.push(format!("{} keywords", keywords));
            }
            if score >= 3 {
                out.push(VendorMatch {
                    name: sig.name.clone(),
                    category: sig.category.clone(),
                    confidence: (score * 15).min(95),
                    evidence,
                });
            }
        }
        out
    }

    fn platform_signals(&self, payload: &str) -> (u32, Vec<String>) {
        let mut score = 0;
        let mut evidence = Vec::new();
        for marker in &self.markers {
            let count = marker.pattern.find_iter(payload).count();
            if count >= marker.threshold {
                score += marker.weight;
                evidence.push(
                    marker
                        .evidence
                        .replace("{count}", &count.to_string())
                        .replace("{platform}", &self.platform.name),
                );
            }
        }
        (score, evidence)
    }
}

/// Highest confidence wins; ties go to the earlier table entry
fn top_vendor(vendors: &[VendorMatch]) -> Option<&VendorMatch> {
    let mut best: Option<&VendorMatch> = None;
    for v in vendors {
        if best.map_or(true, |b| v.confidence > b.confidence) {
            best = Some(v);
        }
    }
    best
}
