//! Endocrine broker gate
//!
//! Runs the gate on the in-process engine with deny-all access control:
//! - Strict YAML config (path from argv, default `endocrine.yaml`)
//! - CA fingerprint logged once ready
//! - Ctrl-C triggers an orderly shutdown, final metrics are logged

use tracing_subscriber::{fmt, EnvFilter};

use endocrine_broker::engine::MemoryEngineFactory;
use endocrine_broker::{config, EndocrineSystem, SystemOptions};
use endocrine_core::error::{EndocrineError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "endocrine.yaml".to_owned());
    let cfg = config::load_from_file(&path)?;

    tracing::info!(port = cfg.broker.port, config = %path, "endocrine starting");
    let factory = MemoryEngineFactory::new();
    let system = EndocrineSystem::start(SystemOptions::new(cfg), &factory)?;

    let info = system.ready().await?;
    tracing::info!(fingerprint = %info.fingerprint, port = info.port, "CA fingerprint");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| EndocrineError::Io(format!("signal handler failed: {e}")))?;
    tracing::info!("shutdown requested");
    system.shutdown().await?;
    tracing::info!("final metrics\n{}", system.render_metrics());
    Ok(())
}
