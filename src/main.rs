//! ArbWatch - arbitrage signal detection and shadow execution
//! Sense -> Analyze Routes -> Risk Sandbox -> Schedule, on an adaptive timer.
//! Nothing here places real orders: every trade is a paper trade.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbwatch_backend::{api, ArbitrageAgent, EngineConfig, SchedulerLoop};

#[derive(Parser, Debug)]
#[command(name = "arbwatch")]
#[command(about = "Arbitrage signal detection and shadow execution engine")]
struct Args {
    /// TOML engine config; defaults to $ARBWATCH_CONFIG or ./arbwatch.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Override the SQLite event store path
    #[arg(long)]
    db_path: Option<String>,

    /// Start the scheduler immediately
    #[arg(long, env = "ARBWATCH_AUTOSTART")]
    autostart: bool,

    /// Start on the live price sources
    #[arg(long)]
    live: bool,

    /// Write the effective config to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let config = build_config(&args)?;

    if let Some(path) = &args.dump_config {
        config
            .save(path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!("Config written to {}", path.display());
        return Ok(());
    }

    info!(
        environment = ?config.environment,
        pairs = config.pairs.len(),
        sources = config.sources.len(),
        db_path = %config.db_path,
        "🚀 ArbWatch starting"
    );

    let agent = Arc::new(ArbitrageAgent::from_config(config).context("failed to build agent")?);
    let scheduler = Arc::new(SchedulerLoop::new(agent));

    if args.autostart {
        scheduler.start().context("failed to start scheduler")?;
    }

    let app = api::create_router(scheduler.clone());
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.stop();
    info!("👋 ArbWatch stopped");
    Ok(())
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => EngineConfig::from_env(),
    };

    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.clone();
    }
    if args.live {
        config.live_source_enabled = true;
    }
    config.validate().context("invalid engine config")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbwatch_backend=debug,arbwatch=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
