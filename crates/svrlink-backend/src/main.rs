//! Backend process entry point
//!
//! Run with:
//! ```bash
//! cargo run -p svrlink-backend -- app.json
//! ```
//!
//! The configuration file path may also come from `SVRLINK_CONFIG`.

use svrlink_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Backend failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Load configuration first; its log section drives the subscriber.
    let path = svrlink_backend::lifecycle::config_path();
    let config = AppConfig::load(&path).map_err(|e| {
        eprintln!("Failed to load configuration from {}: {e}", path.display());
        e
    })?;

    let tracing_config = TracingConfig {
        level: config.log.level.clone(),
        json: config.log.json,
        ..TracingConfig::default()
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    info!(
        path = %path.display(),
        server_id = config.server_id,
        server_type = config.server_type,
        "Configuration loaded"
    );

    svrlink_backend::run(config).await
}
