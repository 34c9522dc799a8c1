//! Write-guarded JSON mock REST server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ tower-http stack ──▶ write guard ──▶ REST handlers ──▶ store ──▶ db.json
//!                     (request id, trace,   (rate check,    (collections,    (RwLock'd
//!                      CORS, no-cache,       catalog cap)    singulars)       document)
//!                      limits, timeout)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mock_catalog_server::config::{loader::PORT_ENV, resolve_config, Overrides};
use mock_catalog_server::lifecycle::startup;
use mock_catalog_server::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "mock-catalog-server")]
#[command(about = "JSON-backed mock REST API with write rate limiting and a catalog record cap")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON document to serve
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Reload the document when it changes on disk
    #[arg(short, long)]
    watch: bool,

    /// Never write changes back to the document
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = Overrides {
        port: cli.port,
        db_path: cli.db,
        watch: cli.watch,
        in_memory: cli.in_memory,
    };
    let port_env = std::env::var(PORT_ENV).ok();

    let config = match resolve_config(cli.config.as_deref(), port_env.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("mock-catalog-server v{} starting", env!("CARGO_PKG_VERSION"));

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
