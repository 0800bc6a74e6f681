use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pagelens::classify::format_bytes;
use pagelens::history::DISPLAY_LIMIT;
use pagelens::{AnalysisHistory, AnalyzerConfig, PageLoader, PageSnapshot, ScanCoordinator, ScanOutcome, ScanReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pagelens", version, about = "Media weight and tag-manager audit for web pages")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// History file (overrides the configuration)
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a page's images, backgrounds and videos
    Scan {
        url: String,
        /// Use a recorded snapshot (JSON) instead of fetching the page
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Skip tag-manager container attribution
        #[arg(long)]
        no_containers: bool,
        /// Size probes in flight
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Attribute one tag-manager container
    Gtm { container_id: String },
    /// Show recent scans
    History {
        #[arg(long, default_value_t = DISPLAY_LIMIT)]
        limit: usize,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    tracing_subscriber::registry().with(filter).with(stderr_layer).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::from_json_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(path) = &cli.history {
        config.history_path = Some(path.clone());
    }
    Ok(config)
}

fn print_summary(report: &ScanReport) {
    let b = &report.breakdown;
    println!("{}", report.url);
    println!("Score: {} ({})", report.score, report.grade);
    println!(
        "Assets: {} measured, {} unmeasured, {} hidden; {} videos ({} autoplay)",
        report.assets.len(),
        report.unmeasured.len(),
        report.hidden.len(),
        report.videos.len(),
        b.autoplay_videos
    );
    println!(
        "Critical {} / Warning {} / Notice {}; total {}",
        b.critical_images,
        b.warning_images,
        b.notice_images,
        format_bytes(b.total_size)
    );
    for asset in report.assets.iter().filter(|a| !a.recommendations.is_empty()) {
        println!("\n[{}] {} ({})", asset.level, asset.locator, format_bytes(asset.byte_size));
        for rec in &asset.recommendations {
            println!("  - {} [{}]", rec.message, rec.impact);
        }
    }
    for gtm in &report.vendor_attributions {
        println!("\n{}: {} ({}%)", gtm.container_id, gtm.source, gtm.confidence);
        for line in &gtm.evidence {
            println!("  - {}", line);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Scan { url, snapshot, json, no_containers, concurrency } => {
            if no_containers {
                config.analyze_containers = false;
            }
            if let Some(n) = concurrency {
                config.probe_concurrency = n;
            }
            config.validate()?;

            let page = match snapshot {
                Some(path) => {
                    let mut page = PageSnapshot::from_json_file(&path)?;
                    if page.url.is_empty() {
                        page.url = url.clone();
                    }
                    page
                }
                None => PageLoader::new(&config)?.load(&url).await?,
            };

            let coordinator = Arc::new(ScanCoordinator::from_config(config)?);
            let on_signal = coordinator.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            match coordinator.run(&page).await {
                ScanOutcome::Completed(report) => {
                    if json {
                        println!("{}", report.to_json_pretty()?);
                    } else {
                        print_summary(&report);
                    }
                }
                ScanOutcome::Cancelled => bail!("scan cancelled"),
                ScanOutcome::Failed(e) => return Err(e).context("scan failed"),
                ScanOutcome::AlreadyRunning => bail!("a scan is already running"),
            }
        }
        Command::Gtm { container_id } => {
            let coordinator = ScanCoordinator::from_config(config)?;
            let attribution = coordinator.matcher().identify_source(&container_id).await;
            println!("{}", serde_json::to_string_pretty(&attribution)?);
        }
        Command::History { limit } => {
            let Some(path) = config.history_path else {
                bail!("no history file configured (use --history or history_path)");
            };
            let history = AnalysisHistory::load(&path)?;
            for entry in history.recent(limit) {
                println!(
                    "{}  score {:>3}  assets {:>3}  videos {:>2}",
                    entry.timestamp.to_rfc3339(),
                    entry.score,
                    entry.asset_count,
                    entry.video_count
                );
            }
        }
    }
    Ok(())
}
