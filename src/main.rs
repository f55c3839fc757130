//! passthrough: interactive client and echo server for user-defined
//! message framing.
//!
//! Features:
//! - Passthrough and length-prefixed framings
//! - Retrying client tasks with keep-alive connection reuse
//! - Multi-threaded mio echo server
//! - Configuration via CLI arguments or TOML file

use passthrough::config::{Config, Framing, Mode};
use passthrough::protocols::{LengthPrefixedMessage, PassthroughMessage};
use passthrough::{console, runtime};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout belongs to the console
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        mode = ?config.mode,
        framing = ?config.framing,
        host = %config.host,
        port = config.port,
        "Starting passthrough"
    );

    match config.mode {
        Mode::Server => run_server(&config),
        Mode::Client => run_client(&config),
    }
}

/// Run the echo server (blocks until every worker exits)
fn run_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match config.framing {
        Framing::Passthrough => runtime::run::<PassthroughMessage>(config)?,
        Framing::LengthPrefixed => runtime::run::<LengthPrefixedMessage>(config)?,
    }
    Ok(())
}

/// Run the interactive console on a single-threaded tokio runtime
fn run_client(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match config.framing {
            Framing::Passthrough => console::run::<PassthroughMessage>(config).await,
            Framing::LengthPrefixed => console::run::<LengthPrefixedMessage>(config).await,
        }
    })?;
    Ok(())
}
