//! framedump-server — entry point.
//!
//! ```text
//! framedump-server <port>                   Serve on <port>
//! framedump-server <port> --config <path>   Load a custom config TOML
//! framedump-server --gen-config             Write default config to stdout
//! ```

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use framedump_core::Hal;

use crate::config::ServerConfig;
use crate::server::StreamServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "framedump-server",
    about = "Stream server for dumping the capture board's audio/video data"
)]
struct Cli {
    /// TCP port to listen on.
    #[arg(required_unless_present = "gen_config")]
    port: Option<u16>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framedump-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    let Some(port) = cli.port else {
        // clap enforces the argument otherwise
        eprintln!("error: missing <PORT>");
        std::process::exit(2);
    };

    // Load config.
    let config = ServerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framedump-server v{}", env!("CARGO_PKG_VERSION"));
    info!("port: {port}");
    info!("memory device: {}", config.capture.mem_device.display());

    // Map the board registers once for the whole process.
    let board = Arc::new(Hal::open(&config.capture.mem_device)?);

    let server = StreamServer::new(config, port, board);
    let stop = server.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("ctrl-c received — shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    server.run().await?;

    Ok(())
}
