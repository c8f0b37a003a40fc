//! Pulse monitor - Entry Point
//!
//! Follows one live-update endpoint until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live-update stream monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any connections)
    pulse_stream::init_crypto();

    let args = Args::parse();

    pulse_telemetry::init_logging()?;

    info!("Starting pulse monitor v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > PULSE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PULSE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = pulse_monitor::MonitorConfig::from_file(&config_path)?;
    info!(
        endpoint = %config.endpoint,
        fallback = config.fallback_url.is_some(),
        "Configuration loaded"
    );

    let monitor = pulse_monitor::Monitor::new(config)?;
    let summary = monitor
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(
        status = %summary.final_status,
        transport_updates = summary.stats.transport_updates,
        fallback_updates = summary.stats.fallback_updates,
        feed_len = summary.feed_len,
        "Monitor stopped"
    );

    if args.print_metrics {
        println!("{}", pulse_telemetry::Metrics::gather_text()?);
    }

    Ok(())
}
