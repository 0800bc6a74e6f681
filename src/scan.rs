//! Scan orchestration.
//!
//! `ScanCoordinator` drives discovery, size resolution, classification and
//! scoring for one page at a time. It is the only long-lived stateful piece:
//! it owns the active-scan state, the cancellation flag and the history log.
//! All methods take `&self` so one coordinator can be shared behind an `Arc`
//! between the task running a scan and whoever wants to cancel it.

use crate::asset::Asset;
use crate::discovery::{AssetDirectory, BlockKind, ContainerRef, PageBlock};
use crate::dom::DocumentQuery;
use crate::fingerprint::{GtmSourceAttribution, VendorFingerprintMatcher};
use crate::history::{AnalysisHistory, AnalysisHistoryEntry};
use crate::recommend::{image_format, recommend};
use crate::report::{AssetReport, ScanReport};
use crate::resolver::{ResourceProbe, SizeResolver};
use crate::score::{score, ClassifiedAsset, Grade, ScoreBreakdown};
use crate::{AnalyzerConfig, Error, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle of the coordinator.
///
/// `Idle -> Running -> {Completed | Cancelled | Failed} -> Idle`. Terminal
/// states are kept until `reset` or the next `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Cooperative cancellation shared by every stage of one scan
#[derive(Debug, Default)]
pub struct ScanContext {
    cancelled: AtomicBool,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Result of `ScanCoordinator::run`
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(Box<ScanReport>),
    /// Partial results were discarded
    Cancelled,
    Failed(Error),
    /// Another scan was running; nothing happened
    AlreadyRunning,
}

impl ScanOutcome {
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed(r) => Some(r.as_ref()),
            _ => None,
        }
    }
}

/// Progress of the size-resolution stage
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Assets processed so far (1-based)
    pub done: usize,
    pub total: usize,
    pub locator: String,
    pub byte_size: Option<u64>,
}

pub type ProgressHandler = Arc<dyn Fn(&ScanProgress) + Send + Sync>;

/// Score of a single page block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAnalysis {
    pub block_id: String,
    pub block_name: String,
    pub block_kind: BlockKind,
    pub assets: Vec<AssetReport>,
    pub score: u32,
    pub grade: Grade,
    pub breakdown: ScoreBreakdown,
}

/// Everything discovery produced, in probe order
struct Inventory {
    /// Images (visible, then hidden) followed by background images
    queue: Vec<Asset>,
    videos: Vec<Asset>,
    containers: Vec<ContainerRef>,
}

fn discover<D: DocumentQuery + ?Sized>(page: &D) -> Result<Inventory> {
    let dir = AssetDirectory::new(page)?;
    let mut queue = dir.discover_images().into_all();
    queue.extend(dir.discover_background_images());
    Ok(Inventory { queue, videos: dir.discover_videos(), containers: dir.discover_containers() })
}

/// Holds `Running` for one scan. Dropped without `finish` (the `run`
/// future was dropped, or a stage panicked) it leaves the coordinator
/// `Failed`.
struct RunGuard<'a> {
    coordinator: &'a ScanCoordinator,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, next: ScanState) {
        self.finished = true;
        self.coordinator.settle(next);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Scan abandoned before completion");
            self.coordinator.settle(ScanState::Failed);
        }
    }
}

pub struct ScanCoordinator {
    config: AnalyzerConfig,
    resolver: SizeResolver,
    matcher: VendorFingerprintMatcher,
    context: ScanContext,
    state: Mutex<ScanState>,
    history: Mutex<AnalysisHistory>,
    on_progress: Option<ProgressHandler>,
}

impl ScanCoordinator {
    pub fn new(
        config: AnalyzerConfig,
        probe: Arc<dyn ResourceProbe>,
        matcher: VendorFingerprintMatcher,
        history: AnalysisHistory,
    ) -> Self {
        let resolver = SizeResolver::new(probe, config.retry);
        Self {
            config,
            resolver,
            matcher,
            context: ScanContext::new(),
            state: Mutex::new(ScanState::Idle),
            history: Mutex::new(history),
            on_progress: None,
        }
    }

    /// Coordinator wired to the network: HTTP probing, `gtm.js` fetching,
    /// and the configured history file.
    #[cfg(feature = "http")]
    pub fn from_config(config: AnalyzerConfig) -> Result<Self> {
        use crate::fingerprint::HttpContainerSource;
        use crate::resolver::HttpProbe;

        let probe = Arc::new(HttpProbe::new(&config.user_agent, config.timeout_ms)?);
        let source = Arc::new(HttpContainerSource::new(&config.user_agent, config.timeout_ms)?);
        let matcher = VendorFingerprintMatcher::new(config.platform.clone())?.with_source(source, config.retry);
        let history = match &config.history_path {
            Some(path) => AnalysisHistory::load(path)?,
            None => AnalysisHistory::new(),
        };
        Ok(Self::new(config, probe, matcher, history))
    }

    pub fn with_progress(mut self, handler: ProgressHandler) -> Self {
        self.on_progress = Some(handler);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn matcher(&self) -> &VendorFingerprintMatcher {
        &self.matcher
    }

    pub fn state(&self) -> ScanState {
        self.state.lock().map(|s| *s).unwrap_or(ScanState::Failed)
    }

    /// Request cancellation of the running scan. Ignored when idle.
    pub fn cancel(&self) {
        if self.state() == ScanState::Running {
            info!("Cancellation requested");
            self.context.cancel();
        }
    }

    /// Return to `Idle` from a terminal state. Returns false while running.
    pub fn reset(&self) -> bool {
        let Ok(mut state) = self.state.lock() else { return false };
        if *state == ScanState::Running {
            return false;
        }
        *state = ScanState::Idle;
        self.context.reset();
        true
    }

    /// Up to `limit` history entries, newest first
    pub fn history(&self, limit: usize) -> Vec<AnalysisHistoryEntry> {
        self.history.lock().map(|h| h.recent(limit)).unwrap_or_default()
    }

    /// Scan one page. A call while another scan is running is a no-op
    /// returning `AlreadyRunning`.
    pub async fn run<D: DocumentQuery + ?Sized>(&self, page: &D) -> ScanOutcome {
        let Some(guard) = self.begin() else {
            info!("Scan already running; ignoring start request");
            return ScanOutcome::AlreadyRunning;
        };
        info!("Scan started: {}", page.document_url());

        let (outcome, next) = match self.execute(page).await {
            Ok(Some(report)) => {
                info!("Scan completed: score {} ({})", report.score, report.grade);
                (ScanOutcome::Completed(Box::new(report)), ScanState::Completed)
            }
            Ok(None) => {
                warn!("Scan cancelled; partial results discarded");
                (ScanOutcome::Cancelled, ScanState::Cancelled)
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                (ScanOutcome::Failed(e), ScanState::Failed)
            }
        };

        guard.finish(next);
        outcome
    }

    fn begin(&self) -> Option<RunGuard<'_>> {
        let mut state = self.state.lock().ok()?;
        if *state == ScanState::Running {
            return None;
        }
        *state = ScanState::Running;
        self.context.reset();
        Some(RunGuard { coordinator: self, finished: false })
    }

    fn settle(&self, next: ScanState) {
        self.context.reset();
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// `Ok(None)` means the scan was cancelled at a checkpoint.
    async fn execute<D: DocumentQuery + ?Sized>(&self, page: &D) -> Result<Option<ScanReport>> {
        let Inventory { queue, videos, containers } = discover(page)?;
        info!(
            "Discovered {} images/backgrounds, {} videos, {} containers",
            queue.len(),
            videos.len(),
            containers.len()
        );

        let Some(resolved) = self.resolve_all(queue).await else {
            return Ok(None);
        };

        let mut measured = Vec::new();
        let mut unmeasured = Vec::new();
        for (asset, size) in resolved {
            match size {
                Some(len) => measured.push(self.classify(asset, len)),
                None => unmeasured.push(asset.locator),
            }
        }

        let mut attributions = Vec::new();
        if self.config.analyze_containers {
            for container in &containers {
                if self.context.is_cancelled() {
                    return Ok(None);
                }
                attributions.push(self.matcher.identify_source(&container.id).await);
            }
        }
        if self.context.is_cancelled() {
            return Ok(None);
        }

        let breakdown = score(&measured, &videos);
        let mut report = ScanReport::new(page.document_url(), breakdown, &measured, &videos);
        report.unmeasured = unmeasured;
        report.vendor_attributions = attributions;

        self.record(&report)?;
        Ok(Some(report))
    }

    /// Resolve sizes with at most `probe_concurrency` probes in flight.
    /// Results come back in queue order; `None` if cancelled.
    async fn resolve_all(&self, queue: Vec<Asset>) -> Option<Vec<(Asset, Option<u64>)>> {
        let total = queue.len();
        let limit = self.config.probe_concurrency.max(1);
        let resolver = &self.resolver;
        let context = &self.context;

        let mut results = stream::iter(queue)
            .map(|asset| async move {
                let size = if context.is_cancelled() { None } else { resolver.resolve_size(&asset.locator).await };
                (asset, size)
            })
            .buffered(limit);

        let mut out = Vec::with_capacity(total);
        loop {
            if self.context.is_cancelled() {
                return None;
            }
            let Some((asset, size)) = results.next().await else { break };
            if let Some(cb) = &self.on_progress {
                cb(&ScanProgress { done: out.len() + 1, total, locator: asset.locator.clone(), byte_size: size });
            }
            out.push((asset, size));
        }
        Some(out)
    }

    fn classify(&self, asset: Asset, byte_size: u64) -> ClassifiedAsset {
        let mut c = ClassifiedAsset::new(asset, byte_size);
        c.recommendations =
            recommend(&c.asset, byte_size, &image_format(&c.asset.locator), &self.config.format_support);
        c
    }

    fn record(&self, report: &ScanReport) -> Result<()> {
        let entry = AnalysisHistoryEntry {
            timestamp: Utc::now(),
            score: report.score,
            asset_count: report.assets.len(),
            video_count: report.videos.len(),
        };
        self.history
            .lock()
            .map_err(|_| Error::HistoryError("history lock poisoned".to_string()))?
            .append(entry)
    }

    /// Score a single page block on its own. Unresolved assets are skipped;
    /// scan state and history are untouched.
    pub async fn analyze_block<D: DocumentQuery + ?Sized>(&self, page: &D, block: &PageBlock) -> Result<BlockAnalysis> {
        let assets = AssetDirectory::new(page)?.images_in_block(block);
        let limit = self.config.probe_concurrency.max(1);
        let resolver = &self.resolver;

        let resolved: Vec<(Asset, Option<u64>)> = stream::iter(assets)
            .map(|asset| async move {
                let size = resolver.resolve_size(&asset.locator).await;
                (asset, size)
            })
            .buffered(limit)
            .collect()
            .await;

        let measured: Vec<ClassifiedAsset> = resolved
            .into_iter()
            .filter_map(|(asset, size)| size.map(|len| self.classify(asset, len)))
            .collect();
        let breakdown = score(&measured, &[]);

        Ok(BlockAnalysis {
            block_id: block.id.clone(),
            block_name: block.name.clone(),
            block_kind: block.kind,
            assets: measured.iter().map(AssetReport::from).collect(),
            score: breakdown.score,
            grade: breakdown.grade,
            breakdown,
        })
    }

    /// Attribute the containers of a page without scanning its assets
    pub async fn analyze_containers<D: DocumentQuery + ?Sized>(&self, page: &D) -> Result<Vec<GtmSourceAttribution>> {
        let containers = AssetDirectory::new(page)?.discover_containers();
        let mut out = Vec::with_capacity(containers.len());
        for c in &containers {
            out.push(self.matcher.identify_source(&c.id).await);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{OptimizationLevel, KIB};
    use crate::dom::{Dimensions, ElementSnapshot, PageSnapshot, Rect};
    use crate::fingerprint::{ContainerSource, PlatformProfile};
    use crate::resolver::RetryPolicy;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fixed sizes per locator with an optional per-call delay
    struct TableProbe {
        sizes: HashMap<String, u64>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl TableProbe {
        fn new(sizes: &[(&str, u64)], delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                sizes: sizes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ResourceProbe for TableProbe {
        async fn probe(&self, locator: &str) -> Option<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.sizes.get(locator).copied()
        }

        async fn fetch_len(&self, _locator: &str) -> Option<u64> {
            None
        }
    }

    struct StaticSource(&'static str);

    #[async_trait]
    impl ContainerSource for StaticSource {
        async fn fetch_container(&self, _id: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig { retry: RetryPolicy { max_attempts: 1, delay_ms: 0 }, ..Default::default() }
    }

    fn coordinator(probe: Arc<TableProbe>) -> ScanCoordinator {
        let matcher = VendorFingerprintMatcher::new(PlatformProfile::default()).unwrap();
        ScanCoordinator::new(config(), probe, matcher, AnalysisHistory::new())
    }

    fn img(page: &mut PageSnapshot, parent: Option<crate::dom::ElementId>, src: &str) {
        let mut el = ElementSnapshot::new("img");
        el.attributes.insert("src".into(), src.into());
        el.parent = parent;
        el.rect = Some(Rect::sized(600.0, 400.0));
        el.natural = Some(Dimensions::new(1800, 1200));
        page.push(el);
    }

    fn page_with_hero() -> PageSnapshot {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        let body = page.push(ElementSnapshot::new("body"));
        img(&mut page, Some(body), "/hero.jpg");
        img(&mut page, Some(body), "/missing.jpg");
        let mut video = ElementSnapshot::new("video");
        video.attributes.insert("src".into(), "/promo.mp4".into());
        video.parent = Some(body);
        page.push(video);
        page
    }

    #[tokio::test]
    async fn completed_scan_scores_measured_assets_and_records_history() {
        let probe = TableProbe::new(&[("https://shop.example.com/hero.jpg", 600 * KIB)], 0);
        let coord = coordinator(probe);

        let outcome = coord.run(&page_with_hero()).await;
        let report = outcome.report().expect("completed");

        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.assets[0].level, OptimizationLevel::Critical);
        assert_eq!(report.assets[0].recommendations.len(), 5);
        assert_eq!(report.score, 79);
        assert_eq!(report.unmeasured, vec!["https://shop.example.com/missing.jpg".to_string()]);
        assert_eq!(report.videos.len(), 1);
        assert!(report.vendor_attributions.is_empty());

        assert_eq!(coord.state(), ScanState::Completed);
        let history = coord.history(20);
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].score, history[0].asset_count, history[0].video_count), (79, 1, 1));
        assert!(coord.reset());
        assert_eq!(coord.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn cancelled_scan_discards_results() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        let body = page.push(ElementSnapshot::new("body"));
        for i in 0..5 {
            img(&mut page, Some(body), &format!("/p{}.jpg", i));
        }
        let probe = TableProbe::new(&[], 100);
        let coord = Arc::new(coordinator(probe.clone()));

        let runner = coord.clone();
        let handle = tokio::spawn(async move { runner.run(&page).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coord.state(), ScanState::Running);
        coord.cancel();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert_eq!(coord.state(), ScanState::Cancelled);
        assert!(coord.history(20).is_empty());
        // the in-flight probe finished; nothing after the checkpoint started
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(coord.reset());
        assert_eq!(coord.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn start_while_running_is_a_no_op() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        img(&mut page, None, "/slow.jpg");
        let probe = TableProbe::new(&[("https://shop.example.com/slow.jpg", 10)], 80);
        let coord = Arc::new(coordinator(probe));

        let runner = coord.clone();
        let first_page = page.clone();
        let first = tokio::spawn(async move { runner.run(&first_page).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(coord.run(&page).await, ScanOutcome::AlreadyRunning));
        assert!(!coord.reset());
        assert!(matches!(first.await.unwrap(), ScanOutcome::Completed(_)));
        assert_eq!(coord.history(20).len(), 1);
    }

    #[tokio::test]
    async fn discovery_failure_is_reported_without_history() {
        let probe = TableProbe::new(&[], 0);
        let coord = coordinator(probe);
        let page = PageSnapshot::new("not a url");

        assert!(matches!(coord.run(&page).await, ScanOutcome::Failed(Error::DiscoveryError(_))));
        assert_eq!(coord.state(), ScanState::Failed);
        assert!(coord.history(20).is_empty());

        // a later scan is allowed
        let ok = PageSnapshot::new("https://ok.example.com/");
        assert!(matches!(coord.run(&ok).await, ScanOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn parallel_probing_keeps_discovery_order() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        let body = page.push(ElementSnapshot::new("body"));
        let sizes: Vec<(String, u64)> =
            (0..6).map(|i| (format!("https://shop.example.com/{}.png", i), (i + 1) * 100 * KIB)).collect();
        for i in 0..6 {
            img(&mut page, Some(body), &format!("/{}.png", i));
        }
        let table: Vec<(&str, u64)> = sizes.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let probe = TableProbe::new(&table, 10);
        let matcher = VendorFingerprintMatcher::new(PlatformProfile::default()).unwrap();
        let cfg = AnalyzerConfig { probe_concurrency: 4, ..config() };
        let coord = ScanCoordinator::new(cfg, probe, matcher, AnalysisHistory::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let coord = coord.with_progress(Arc::new(move |p: &ScanProgress| sink.lock().unwrap().push(p.done)));

        let outcome = coord.run(&page).await;
        let report = outcome.report().unwrap();
        let locators: Vec<_> = report.assets.iter().map(|a| a.locator.clone()).collect();
        let expected: Vec<_> = sizes.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(locators, expected);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn containers_are_attributed() {
        let mut page = page_with_hero();
        let mut script = ElementSnapshot::new("script");
        script
            .attributes
            .insert("src".into(), "https://www.googletagmanager.com/gtm.js?id=GTM-ABC123".into());
        page.push(script);

        let probe = TableProbe::new(&[], 0);
        let matcher = VendorFingerprintMatcher::new(PlatformProfile::default())
            .unwrap()
            .with_source(Arc::new(StaticSource("cdn.callrail.com/swap.js")), RetryPolicy::default());
        let coord = ScanCoordinator::new(config(), probe, matcher, AnalysisHistory::new());

        let outcome = coord.run(&page).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.vendor_attributions.len(), 1);
        assert_eq!(report.vendor_attributions[0].container_id, "GTM-ABC123");
        assert_eq!(report.vendor_attributions[0].source, "Third-Party: CallRail");

        let only = coord.analyze_containers(&page).await.unwrap();
        assert_eq!(only, report.vendor_attributions);
    }

    #[tokio::test]
    async fn block_analysis_leaves_state_alone() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        let body = page.push(ElementSnapshot::new("body"));
        let mut section = ElementSnapshot::new("div");
        section.attributes.insert("id".into(), "block1".into());
        section.parent = Some(body);
        let section = page.push(section);
        img(&mut page, Some(section), "/in.jpg");
        img(&mut page, Some(body), "/out.jpg");

        let probe = TableProbe::new(
            &[("https://shop.example.com/in.jpg", 250 * KIB), ("https://shop.example.com/out.jpg", 900 * KIB)],
            0,
        );
        let coord = coordinator(probe);
        let blocks = AssetDirectory::new(&page).unwrap().discover_blocks();
        assert_eq!(blocks.len(), 1);

        let analysis = coord.analyze_block(&page, &blocks[0]).await.unwrap();
        assert_eq!(analysis.block_id, "block1");
        assert_eq!(analysis.assets.len(), 1);
        // warning 8, lazy 2, responsive 1, oversized 3
        assert_eq!(analysis.score, 86);
        assert_eq!(coord.state(), ScanState::Idle);
        assert!(coord.history(20).is_empty());
    }

    /// Container source that answers after a delay
    struct SlowSource(Duration);

    #[async_trait]
    impl ContainerSource for SlowSource {
        async fn fetch_container(&self, _id: &str) -> Option<String> {
            tokio::time::sleep(self.0).await;
            Some("cdn.callrail.com/swap.js".to_string())
        }
    }

    #[tokio::test]
    async fn dropped_scan_does_not_stay_running() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        img(&mut page, None, "/slow.jpg");
        let probe = TableProbe::new(&[("https://shop.example.com/slow.jpg", 10)], 200);
        let coord = coordinator(probe);

        let timed_out = tokio::time::timeout(Duration::from_millis(30), coord.run(&page)).await;
        assert!(timed_out.is_err());
        assert_eq!(coord.state(), ScanState::Failed);
        assert!(coord.history(20).is_empty());

        let empty = PageSnapshot::new("https://shop.example.com/empty");
        assert!(matches!(coord.run(&empty).await, ScanOutcome::Completed(_)));
        assert!(coord.reset());
        assert_eq!(coord.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn history_write_failure_fails_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = AnalysisHistory::load(&path).unwrap();
        // a directory where the log file should go makes every write fail
        std::fs::create_dir(&path).unwrap();

        let probe = TableProbe::new(&[("https://shop.example.com/hero.jpg", 600 * KIB)], 0);
        let matcher = VendorFingerprintMatcher::new(PlatformProfile::default()).unwrap();
        let coord = ScanCoordinator::new(config(), probe, matcher, history);

        let outcome = coord.run(&page_with_hero()).await;
        assert!(matches!(outcome, ScanOutcome::Failed(Error::HistoryError(_))));
        assert_eq!(coord.state(), ScanState::Failed);
        assert!(coord.history(20).is_empty());
    }

    #[tokio::test]
    async fn cancel_during_container_attribution() {
        let mut page = PageSnapshot::new("https://shop.example.com/");
        for id in ["GTM-AAA1", "GTM-BBB2"] {
            let mut script = ElementSnapshot::new("script");
            script
                .attributes
                .insert("src".into(), format!("https://www.googletagmanager.com/gtm.js?id={}", id));
            page.push(script);
        }
        let probe = TableProbe::new(&[], 0);
        let matcher = VendorFingerprintMatcher::new(PlatformProfile::default())
            .unwrap()
            .with_source(Arc::new(SlowSource(Duration::from_millis(150))), RetryPolicy::default());
        let coord = Arc::new(ScanCoordinator::new(config(), probe, matcher, AnalysisHistory::new()));

        let runner = coord.clone();
        let handle = tokio::spawn(async move { runner.run(&page).await });
        tokio::time::sleep(Duration::from_millis(40)).await;
        coord.cancel();

        assert!(matches!(handle.await.unwrap(), ScanOutcome::Cancelled));
        assert_eq!(coord.state(), ScanState::Cancelled);
        assert!(coord.history(20).is_empty());
    }
}
