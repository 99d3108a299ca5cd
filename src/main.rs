//! govwatch - notify on new governance proposals across validator nodes.
//!
//! Usage:
//!   govwatch -n INJECTIVE 127.23.25.25 1317 -n BAND_PROTOCOL 235.26.35.65 1318
//!   govwatch --config govwatch.toml --once
//!   govwatch -n LOCAL 127.0.0.1 1317 --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use govwatch::config::Config;
use govwatch::node::RestNodeClient;
use govwatch::notify::{DiscordWebhook, LogSink, Notifier, WebhookSink};
use govwatch::poller::Poller;
use govwatch::proposal::Normalizer;
use govwatch::watermark::{FileWatermarkStore, Watermark};

#[derive(Debug, Parser)]
#[command(name = "govwatch", version, about = "Webhook alerts for new governance proposals in voting period")]
struct Cli {
    /// Node to watch, repeatable: -n LABEL HOST PORT
    #[arg(
        short = 'n',
        long = "node",
        num_args = 3,
        value_names = ["LABEL", "HOST", "PORT"],
        action = clap::ArgAction::Append
    )]
    nodes: Vec<String>,

    /// Config file (defaults apply when it does not exist).
    #[arg(long, env = "GOVWATCH_CONFIG", default_value = "govwatch.toml")]
    config: PathBuf,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log notifications instead of posting them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        Config::from_env()
    };
    config.add_cli_nodes(&cli.nodes)?;
    if cli.dry_run {
        config.notifier.dry_run = true;
    }

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("govwatch v{} starting", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    if config.nodes.is_empty() {
        warn!("no nodes configured - cycles will be no-ops (pass -n LABEL HOST PORT)");
    }
    for node in &config.nodes {
        info!(node = %node.label, url = %node.base_url(), "watching node");
    }

    // --- Sink ---
    let sink: Arc<dyn WebhookSink> = if config.notifier.dry_run {
        info!("dry-run mode - notifications are logged, not sent");
        Arc::new(LogSink)
    } else {
        Arc::new(DiscordWebhook::new(
            config.notifier.webhook_url.clone(),
            Duration::from_secs(config.notifier.timeout_secs),
        ))
    };
    let notifier = Notifier::new(
        sink,
        config.notifier.mention().map(str::to_string),
        config.notifier.max_message_len,
    );

    // --- Watermark ---
    let store = Arc::new(FileWatermarkStore::new(config.watermark.path.clone()));
    let watermark = Watermark::restore(store.as_ref());

    let api = Arc::new(RestNodeClient::new(
        Duration::from_secs(config.poller.probe_timeout_secs),
        Duration::from_secs(config.poller.fetch_timeout_secs),
    ));

    let poller = Poller::new(
        config.nodes.clone(),
        api,
        Normalizer::new(config.notifier.include_upgrade_info),
        notifier,
        store,
        config.poller.clone(),
    );

    let result = if cli.once {
        poller.run_cycle(watermark).await.map(|_| ())
    } else {
        info!(interval_secs = config.poller.interval_secs, "entering poll loop");
        poller.run_forever(watermark).await
    };

    if let Err(e) = result {
        error!(error = %e, "fatal");
        eprintln!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
