//! gaugewatch binary
//!
//! Runs the watch pipeline and serves its gauges over HTTP.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gaugewatch::config::MonitorConfig;
use gaugewatch::{
    load_config, parse_duration, AppConfig, AppState, GaugeSink, MemoryGauge, PrometheusGauge,
    WatchService, WebConfig, DEFAULT_HOST, DEFAULT_WEB_PORT,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "gaugewatch")]
#[command(about = "Publish values scraped from command output as Prometheus gauges")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Periodically runs the configured commands, parses their output \
into records and exposes the selected cells as labeled gauges")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Disable logging
    #[arg(short, long, global = true, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watch loop and the web server
    Run(RunArgs),

    /// Load and validate a configuration file
    Check(ConfigArgs),

    /// Run a single cycle and print what it produced
    Pull(PullArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config_file: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Web server bind address
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Time between cycle starts, e.g. 500ms, 1s, 2m
    #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
    refresh_period: Duration,

    /// Abort in-flight monitor updates on shutdown
    #[arg(long)]
    no_drain: bool,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct PullArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let result = match &cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Check(args) => check_command(args),
        Commands::Pull(args) => pull_command(args).await,
    };

    if let Err(e) = &result {
        error!("gaugewatch failed: {:#}", e);
    }
    result
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.quiet => EnvFilter::new("off"),
        Err(_) => {
            let level = if cli.debug {
                "debug"
            } else if cli.verbose {
                "info"
            } else {
                "warn"
            };
            EnvFilter::new(level)
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn load_validated(path: &Path) -> anyhow::Result<AppConfig> {
    let config = load_config(path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

async fn run_command(args: &RunArgs) -> anyhow::Result<()> {
    let config = Arc::new(load_validated(&args.config.config_file)?);

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install the Prometheus recorder")?;

    let service = WatchService::from_config(&config, |monitor: &MonitorConfig| -> Arc<dyn GaugeSink> {
        let label_names = monitor.value.labels.iter().map(|l| l.header.clone()).collect();
        Arc::new(PrometheusGauge::register(&monitor.id, &monitor.title, label_names))
    })
    .with_drain_on_shutdown(!args.no_drain);

    let web_config = WebConfig::new(&args.host, args.port).with_cors(!args.no_cors);
    let state = AppState::new(Arc::clone(&config), service.subscribe()).with_prometheus(handle);

    info!("Configuration:");
    info!("  - Sources: {}", config.sources.len());
    info!("  - Monitors: {}", config.monitors.len());
    info!("  - Refresh period: {:?}", args.refresh_period);
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = stop_tx.send(true);
    });

    let watch_loop = service.run(args.refresh_period, stopped(stop_rx.clone()));
    let server = gaugewatch::start_web_server(web_config, state, stopped(stop_rx));
    futures_util::future::try_join(watch_loop, server).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves once a stop has been signalled or the signalling side is gone.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn check_command(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = load_validated(&args.config_file)?;

    println!("{}: OK", args.config_file.display());
    println!("  Sources:");
    for source in &config.sources {
        let records: Vec<&str> = source.output.records.iter().map(|r| r.id.as_str()).collect();
        println!(
            "    {} ({:?}, timeout {:?}): {}",
            source.id,
            source.output.parser,
            source.timeout,
            records.join(", ")
        );
    }
    println!("  Monitors:");
    for monitor in &config.monitors {
        println!(
            "    {} <- {}/{}[{}]",
            monitor.id, monitor.value.source_id, monitor.value.record_id, monitor.value.header
        );
    }
    println!("  Graphs: {}", config.graphs.len());
    Ok(())
}

async fn pull_command(args: &PullArgs) -> anyhow::Result<()> {
    let config = load_validated(&args.config.config_file)?;

    let mut gauges: BTreeMap<String, Arc<MemoryGauge>> = BTreeMap::new();
    let service = WatchService::from_config(&config, |monitor: &MonitorConfig| -> Arc<dyn GaugeSink> {
        let gauge = Arc::new(MemoryGauge::new());
        gauges.insert(monitor.id.clone(), Arc::clone(&gauge));
        gauge
    });

    let (snapshot, _) = service.refresh_once().await;
    if snapshot.is_empty() && !config.sources.is_empty() {
        bail!("no source produced any records");
    }

    match args.format {
        OutputFormat::Json => {
            let metrics: BTreeMap<&str, Vec<serde_json::Value>> = service
                .monitors()
                .iter()
                .map(|monitor| {
                    let values = gauges
                        .get(monitor.id())
                        .map(|gauge| gauge.values())
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(labels, value)| serde_json::json!({ "labels": labels, "value": value }))
                        .collect();
                    (monitor.id(), values)
                })
                .collect();
            let output = serde_json::json!({ "snapshot": snapshot.as_ref(), "metrics": metrics });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Pretty => {
            println!(
                "Snapshot ({})",
                snapshot.captured_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
            for source_id in snapshot.source_ids() {
                let records = snapshot
                    .source(source_id)
                    .ok_or_else(|| anyhow!("source {} vanished from the snapshot", source_id))?;
                for (record_id, rows) in records {
                    println!("  {}/{}: {} rows", source_id, record_id, rows.len());
                }
            }
            println!();
            for monitor in service.monitors() {
                let names = monitor.rule().label_names();
                let Some(gauge) = gauges.get(monitor.id()) else {
                    continue;
                };
                for (labels, value) in gauge.values() {
                    let pairs: Vec<String> = names
                        .iter()
                        .zip(&labels)
                        .map(|(name, label)| format!("{}=\"{}\"", name, label))
                        .collect();
                    println!("{}{{{}}} {}", monitor.id(), pairs.join(","), value);
                }
            }
        }
    }

    Ok(())
}
