//! Agentic Web Scraper server
//!
//! Entry point: parses flags, loads layered configuration and runs the
//! selected channel (stdio by default, `--sse` for HTTP, `--cli` for the
//! interactive console).

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;

use agentic_web_scraper::config::{AppConfig, Cli, Mode};
use agentic_web_scraper::{ServerContext, console, telemetry, tools, transport};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = AppConfig::from_cli(&cli).context("failed to load configuration")?;
    telemetry::init(&settings.logging)?;

    let mode = cli.mode();
    info!(
        name: "server.starting",
        mode = ?mode,
        version = env!("CARGO_PKG_VERSION"),
        "Starting agentic web scraper"
    );

    let ctx = ServerContext::from_config(settings)?;
    let dispatcher = tools::dispatcher(&ctx)?;

    let outcome = match mode {
        Mode::Stdio => transport::stdio(dispatcher)
            .run()
            .await
            .map(|_| ())
            .context("stdio channel failed"),
        Mode::Sse => transport::serve(dispatcher, &ctx.settings.server).await,
        Mode::Console => console::stdio(dispatcher)
            .run()
            .await
            .context("console failed"),
    };

    ctx.shutdown();
    outcome
}
