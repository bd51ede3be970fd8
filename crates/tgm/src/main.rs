use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tgm_bridge::{BridgeClient, BridgeConfig};
use tgm_core::{
    client::{port::RemoteClient, throttled::ThrottledClient},
    config::Config,
    pipeline::ChannelFetcher,
    poller::{Poller, PollerConfig},
    ratelimit::WindowLimiter,
    retry::RetryPolicy,
    service::MonitorService,
    store::PostStore,
    supervisor::ClientSupervisor,
};
use tgm_store::SqliteStore;

#[derive(Parser)]
#[command(name = "tgm", about = "Telegram channel monitor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run the background poller (default)
    Serve,
    /// Check that each channel resolves and can be read, then exit
    Verify {
        #[arg(required = true)]
        channels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tgm_core::logging::init("tgm")?;
    let cli = Cli::parse();
    let cfg = Config::load().context("loading configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let store = SqliteStore::open(&cfg.db_path)
                .await
                .context("opening database")?;
            let service = build_service(&cfg, Arc::new(store)).await?;
            serve(&cfg, service).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { channels } => {
            // Nothing is persisted here.
            let store = SqliteStore::in_memory().await?;
            let service = build_service(&cfg, Arc::new(store)).await?;
            verify(&service, &channels).await
        }
    }
}

async fn build_service(
    cfg: &Config,
    store: Arc<dyn PostStore>,
) -> anyhow::Result<Arc<MonitorService>> {
    let bridge: Arc<dyn RemoteClient> =
        Arc::new(BridgeClient::new(BridgeConfig::from_config(cfg))?);
    let limiter = Arc::new(WindowLimiter::new(cfg.window_config()));
    let client: Arc<dyn RemoteClient> = Arc::new(ThrottledClient::new(bridge, limiter));

    let supervisor = Arc::new(ClientSupervisor::new(client.clone(), cfg.session_file.clone()));
    supervisor
        .start()
        .await
        .context("starting the Telegram client")?;

    let fetcher = ChannelFetcher::new(client, RetryPolicy::flood_control(), cfg.pacing());
    Ok(Arc::new(MonitorService::new(supervisor, fetcher, store)))
}

async fn serve(cfg: &Config, service: Arc<MonitorService>) -> anyhow::Result<()> {
    let poller = cfg.poll_enabled.then(|| {
        Poller::new(
            service.clone(),
            PollerConfig {
                interval: cfg.poll_interval,
                limit: cfg.poll_limit,
                seed_channels: cfg.monitor_channels.clone(),
            },
        )
    });
    if let Some(p) = &poller {
        p.start().await;
    }

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "HTTP API listening");

    let served = axum::serve(listener, tgm_http::router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(p) = &poller {
        p.stop().await;
    }
    if let Err(e) = service.supervisor().stop().await {
        warn!(error = %e, "Client shutdown failed");
    }
    served.context("HTTP server failed")
}

async fn verify(service: &MonitorService, channels: &[String]) -> anyhow::Result<ExitCode> {
    let checks = service.verify_access(channels).await?;
    for c in &checks {
        if c.ok {
            println!("ok    {}  {}", c.channel, c.title.as_deref().unwrap_or(""));
        } else {
            let reason = c.detail.as_deref().unwrap_or("unavailable");
            println!("FAIL  {}  {}", c.channel, reason);
        }
    }

    if let Err(e) = service.supervisor().stop().await {
        warn!(error = %e, "Client shutdown failed");
    }
    if checks.iter().any(|c| c.ok) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
