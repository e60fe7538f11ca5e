//! Zoo dispatcher - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use zoo_common::logging::{init_logging, LogConfig, LogLevel};

use zoo_dispatcher::broker::AmqpBroker;
use zoo_dispatcher::{Dispatcher, Publisher, ZooConfig};

#[derive(Parser, Debug)]
#[command(name = "zoo-dispatcher")]
#[command(author, version, about = "Distributed file-analysis dispatcher")]
struct Cli {
    /// Path to a TOML configuration file (defaults apply when omitted)
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::with_prefix("zoo-dispatcher");
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    log_config.filter_directives = Some("lapin=warn,hyper=warn,reqwest=warn".to_string());
    // environment variables take precedence
    let log_config = log_config.overlay_env()?;
    init_logging(&log_config)?;

    info!("Starting zoo dispatcher");

    let config = ZooConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        server = %config.rabbit.host.server,
        port = config.rabbit.host.port,
        workqueue = %config.rabbit.workqueue.name,
        prefetch = config.limits.prefetch,
        "Configuration loaded"
    );

    // an unreachable broker at startup is unrecoverable; the non-zero exit
    // code comes from the propagated error
    let broker = AmqpBroker::connect(&config.rabbit, config.limits.prefetch)
        .await
        .context("Failed to establish broker connection")?;

    let deliveries = broker
        .consume(
            &config.rabbit.workqueue.name,
            config.limits.prefetch as usize,
        )
        .await
        .context("Failed to start consuming the work queue")?;

    let channel: Arc<dyn zoo_dispatcher::broker::BrokerChannel> = Arc::new(broker);
    let publisher = Publisher::new(
        channel.clone(),
        config.requeue_key.clone(),
        config.misbehave_key.clone(),
    );
    let dispatcher = Dispatcher::new(channel, publisher, &config);

    info!("Dispatcher running");

    tokio::select! {
        result = dispatcher.run(deliveries) => {
            result.context("Dispatcher stopped unexpectedly")?;
        },
        () = shutdown_signal() => {
            info!("Shutdown signal received");
        },
    }

    info!("Dispatcher shut down");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
