use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trendbot::analytics::{EmergenceDetector, ScoreEngine};
use trendbot::config::Config;
use trendbot::error::{Error, Result, TrendbotErrorTrait};
use trendbot::metrics;
use trendbot::models::Platform;
use trendbot::notifications::{format_emerging_row, NotificationDispatcher, Notifier};
use trendbot::scheduler::{Pipeline, PollingScheduler};
use trendbot::storage::open_store;
use trendbot::utils::{clean_text, format_duration};

#[derive(Parser)]
#[command(
    name = "trendbot",
    version,
    about = "Social media trend monitor with emerging-topic alerts",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll sources and send alerts until interrupted
    Run {
        /// Write Prometheus metrics to this file every minute and on exit
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Fetch once from every source and test the notification channels
    Check,

    /// Show the highest scoring topics from the store
    Top {
        /// Platform to show (twitter, reddit); all when omitted
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Look-back window in hours
        #[arg(long, default_value = "24")]
        hours: u32,

        /// Maximum number of topics
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Also send the list as a trend alert
        #[arg(long, default_value = "false")]
        notify: bool,
    },

    /// Run emergence detection over the stored observations
    Emerging {
        /// Send an alert for the detected topics
        #[arg(long, default_value = "false")]
        notify: bool,
    },

    /// Send a test message through every channel
    TestNotify,
}

const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        tracing::error!(
            error = %e,
            category = %e.category(),
            recoverable = e.is_recoverable(),
            "trendbot failed"
        );
        return Err(e.into());
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config =
        Config::load(cli.config.as_deref()).map_err(|e| Error::config(format!("{e:#}")))?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!("trendbot starting");

    match cli.command {
        Commands::Run { metrics_file } => run(config, metrics_file).await,
        Commands::Check => check(config).await,
        Commands::Top {
            platform,
            hours,
            limit,
            notify,
        } => {
            tracing::info!(platform = ?platform, hours, limit, notify, "Starting top command");
            top(config, platform, hours, limit, notify).await
        }
        Commands::Emerging { notify } => emerging(config, notify).await,
        Commands::TestNotify => test_notify(config).await,
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("trendbot=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("trendbot={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| Error::with_source("Failed to initialise logging", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .map_err(|e| Error::with_source("Failed to initialise logging", e))?;
        }
    }

    Ok(())
}

fn build_scheduler(config: &Config) -> Result<PollingScheduler> {
    let store = open_store(&config.database)
        .with_context(|| format!("Failed to open store at {}", config.database.path.display()))?;
    let notifier = Arc::new(NotificationDispatcher::from_config(config)?);
    Ok(PollingScheduler::from_config(config, store, notifier)?)
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = open_store(&config.database)?;
    let notifier = Arc::new(NotificationDispatcher::from_config(config)?);
    let detector = EmergenceDetector::new(ScoreEngine::new(config.scoring));
    Ok(Pipeline::new(store, notifier, detector, config.scheduler.clone()))
}

async fn run(config: Config, metrics_file: Option<PathBuf>) -> Result<()> {
    let scheduler = build_scheduler(&config)?;
    let handle = scheduler.handle();
    let started = std::time::Instant::now();

    tracing::info!(
        sources = ?scheduler.source_names(),
        twitter_interval_mins = config.scheduler.twitter_interval_mins,
        reddit_interval_mins = config.scheduler.reddit_interval_mins,
        summary_hour = config.scheduler.summary_hour,
        "Scheduler configured"
    );

    let exporter = metrics_file.clone().map(|path| tokio::spawn(export_metrics_loop(path)));

    let run = scheduler.run_until(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!(
                "Shutdown signal received, finishing current cycles (Ctrl-C again to exit now)"
            ),
            Err(e) => tracing::error!("Failed to wait for Ctrl+C: {}", e),
        }
    });
    tokio::pin!(run);

    let outcome = tokio::select! {
        result = &mut run => result.map_err(Error::from),
        _ = async {
            for _ in 0..2 {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        } => Err(Error::other("Forced exit before running cycles finished")),
    };

    if let Some(exporter) = exporter {
        exporter.abort();
    }
    if let Some(path) = &metrics_file {
        write_metrics(path);
    }
    outcome?;

    tracing::info!(uptime = %format_duration(started.elapsed()), "Monitoring finished");
    let tasks = handle.context().tasks();
    for task in &tasks {
        tracing::info!(task = %task.name, runs = task.runs, "Task summary");
    }
    Ok(())
}

async fn export_metrics_loop(path: PathBuf) {
    let mut ticker = tokio::time::interval(METRICS_EXPORT_INTERVAL);
    loop {
        ticker.tick().await;
        write_metrics(&path);
    }
}

fn write_metrics(path: &Path) {
    if let Err(e) = metrics::export_to_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to export metrics");
    }
}

async fn check(config: Config) -> Result<()> {
    let scheduler = build_scheduler(&config)?;
    let report = scheduler.run_single_check().await;

    for source in &report.sources {
        match &source.result {
            Ok(count) => println!("✅ {}: {} items", source.name, count),
            Err(e) => println!("❌ {}: {}", source.name, e),
        }
    }
    let status = if report.notifier_connected { "✅" } else { "❌" };
    println!("{status} notifications");

    if !report.all_ok() {
        return Err(Error::other("Single check failed"));
    }
    Ok(())
}

async fn top(
    config: Config,
    platform: Option<Platform>,
    hours: u32,
    limit: usize,
    notify: bool,
) -> Result<()> {
    let pipeline = build_pipeline(&config)?;
    let platforms = match platform {
        Some(p) => vec![p],
        None => Platform::all(),
    };

    for platform in platforms {
        let trends = pipeline.store().read_top(Some(platform), hours, limit).await?;
        println!("{} (last {}h)", platform.display_name(), hours);
        if trends.is_empty() {
            println!("  no data");
            continue;
        }
        for (i, trend) in trends.iter().enumerate() {
            println!(
                "  {}. {}  score={} mentions={}",
                i + 1,
                clean_text(&trend.topic, 60),
                trend.max_score,
                trend.mentions
            );
        }

        if notify {
            let dispatcher = NotificationDispatcher::from_config(&config)?;
            if !dispatcher.send_trend_alert(platform, &trends).await {
                tracing::warn!(platform = %platform, "Trend alert was not delivered");
            }
        }
    }
    Ok(())
}

async fn emerging(config: Config, notify: bool) -> Result<()> {
    let pipeline = build_pipeline(&config)?;

    if notify {
        let alerted = pipeline.notify_emerging_once().await;
        println!("Alerted on {} emerging topics", alerted.len());
        return Ok(());
    }

    let trends = pipeline.detect_emerging().await?;
    if trends.is_empty() {
        println!("No emerging trends");
    }
    for trend in &trends {
        println!("{}", format_emerging_row(trend));
    }
    Ok(())
}

async fn test_notify(config: Config) -> Result<()> {
    let dispatcher = NotificationDispatcher::from_config(&config)?;
    if dispatcher.channel_count() == 0 {
        return Err(Error::config("No notification channels configured"));
    }

    if dispatcher.test_connection().await {
        println!("✅ Test message sent");
        Ok(())
    } else {
        Err(Error::other("No channel accepted the test message"))
    }
}
