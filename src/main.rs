use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod args;
mod auth;
mod cfg;
mod diff;
mod job;
mod notify;
mod sheets;
mod state;
mod transform;

#[cfg(test)]
mod test_support;

use args::Args;
use cfg::Cfg;
use job::Pipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Values from a local .env file; the real environment still wins.
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting client_watch");

    // Load configuration
    let cfg = Cfg::load(args)?;
    let one_shot = cfg.is_one_shot();

    let pipeline = Pipeline::new(cfg).await?;

    if one_shot {
        info!("Running once and exiting");
        let outcome = pipeline.run_cycle().await?;
        info!("Cycle finished: {:?}", outcome);
    } else {
        pipeline.run_forever().await;
    }

    info!("client_watch completed successfully");
    Ok(())
}

/// `RUST_LOG` takes precedence over `--log-level` when set.
fn init_logging(level: &str) -> Result<()> {
    let filter = match level {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
