//! glow-daemon — entry point.
//!
//! ```text
//! glow-daemon                  Run in the foreground
//! glow-daemon --config <path>  Load a custom config TOML
//! glow-daemon --gen-config     Write the default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use glow_core::UsbTransport;
use glow_daemon::config::GlowConfig;
use glow_daemon::service::GlowService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "glow-daemon", about = "Ambient LED daemon")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "glow.toml")]
    config: PathBuf,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        GlowConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = GlowConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("glow-daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("capture backend: {}", config.capture.backend);
    info!("capture interval: {} ms", config.capture.interval_ms);
    info!("regions: {}", config.regions().len());

    let mut service = GlowService::new(config, UsbTransport::new());
    service.run().await;

    Ok(())
}
