use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coliseum_dashboard::agents::{AgentsView, PipelineHeader};
use coliseum_dashboard::config::Config;
use coliseum_dashboard::opportunity::{DetailView, FeedView};
use coliseum_dashboard::pipeline::RunControl;
use coliseum_dashboard::portfolio::{AccountView, PortfolioTotals};
use coliseum_dashboard::resource::ResourceKind;
use coliseum_dashboard::server;
use coliseum_dashboard::session::{Dashboard, Panel};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "coliseum-dash", about = "Coliseum dashboard: keeps backend panels fresh and serves them to the view")]
struct Cli {
    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,

    /// Load every panel once, print them as JSON, then exit
    #[arg(long)]
    once: bool,

    /// Override the view API port
    #[arg(long)]
    port: Option<u16>,

    /// Ask the backend for one pipeline run after the first load
    #[arg(long)]
    run_pipeline: bool,
}

/// Everything `--once` prints.
#[derive(Serialize)]
struct Report {
    header: Panel<PipelineHeader>,
    portfolio: Panel<PortfolioTotals>,
    opportunities: Panel<FeedView>,
    detail: Panel<DetailView>,
    agents: Panel<AgentsView>,
    account: Panel<AccountView>,
    pipeline: Panel<RunControl>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::from_env_file(cli.config_file.as_deref())?;
    if let Some(port) = cli.port {
        cfg.listen_port = port;
    }

    info!("══════════════════════════════════════════════════════");
    info!("  COLISEUM DASHBOARD v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend: {} | Portfolio: {}", cfg.api_base, cfg.portfolio_paths.join(" → "));
    info!(
        "  Timeout: {}s | Retry limit: {} | Dedupe: {}ms",
        cfg.request_timeout_secs, cfg.retry_limit, cfg.dedupe_window_ms
    );
    for kind in ResourceKind::ALL {
        info!("  Refresh {:<20} every {:?}", kind.env_suffix(), cfg.refresh.interval_for(kind));
    }
    info!("══════════════════════════════════════════════════════");

    let dashboard = Arc::new(Dashboard::new(cfg.clone())?);
    let first_load = Duration::from_secs(cfg.request_timeout_secs.saturating_mul(2).max(5));
    if dashboard.wait_until_loaded(first_load).await {
        info!("All panels loaded");
    } else {
        warn!("Some panels still loading after {:?}", first_load);
    }

    if cli.run_pipeline {
        match dashboard.run_pipeline().await {
            Ok(()) => info!("Pipeline run started"),
            Err(e) => warn!("Pipeline not started: {e}"),
        }
    }

    if cli.once {
        let report = Report {
            header: dashboard.header(),
            portfolio: dashboard.portfolio(),
            opportunities: dashboard.opportunities(None),
            detail: dashboard.detail(),
            agents: dashboard.agents(),
            account: dashboard.account(),
            pipeline: dashboard.pipeline(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let app = server::router(dashboard);
    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.listen_port));
    info!("View API listening on http://{addr}");
    info!("Routes:");
    for route in server::ROUTES {
        info!("  {route}");
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("STOP SIGNAL (Ctrl+C)");
        })
        .await
        .context("View API server")?;

    info!("Dashboard stopped");
    Ok(())
}
