//! Service runtime binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                 bootstrap                     │
//!                 │   metrics ─▶ logger ─▶ AppContext ─▶ bind fn   │
//!                 │                                    │          │
//!                 │                  ┌─────────────────┴───────┐  │
//!                 │                  ▼                         ▼  │
//!   Client ───────┼──▶ service listener          monitoring listener ◀── Scraper
//!                 │   (app routes, ping,        (index, metrics, pprof,│
//!                 │    status)                   ip, ping, status)     │
//!                 │                                                   │
//!                 │   SIGINT/SIGTERM ─▶ cancel ─▶ drain ─▶ "stopped"  │
//!                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use service_runtime::config::{self, AppConfig};
use service_runtime::http::{self, RequestContext, Route};
use service_runtime::lifecycle::bootstrap::{self, with_logging_config, with_metrics_config};
use service_runtime::{AppContext, BoxError};

#[derive(Parser)]
#[command(name = "service-runtime")]
#[command(about = "HTTP service with a separate monitoring listener", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    let options = [
        with_logging_config(config.logging.clone()),
        with_metrics_config(config.metrics.clone()),
    ];

    bootstrap::bootstrap(move |ctx, _logger, _metrics| bind(ctx, config), options).await?;
    Ok(())
}

async fn bind(ctx: AppContext, config: AppConfig) -> Result<(), BoxError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-runtime starting");

    let service = http::start(&ctx, &app_routes, config.service.to_options()?)?;
    tracing::info!(address = %service.local_addr(), "Service listener ready");

    if let Some(monitoring) = &config.monitoring {
        let monitor = http::start(&ctx, &http::NoopBinder, monitoring.to_options()?)?;
        tracing::info!(address = %monitor.local_addr(), "Monitoring listener ready");
    }
    Ok(())
}

fn app_routes(_ctx: &AppContext) -> Vec<Route> {
    vec![Route::get("/hello", hello).with_description("Greets the caller")]
}

async fn hello(request: RequestContext) -> String {
    tracing::info!("Saying hello");
    format!("hello, request {}\n", request.request_id())
}
