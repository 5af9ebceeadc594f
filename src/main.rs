//! clipshare server binary.
//!
//! ```text
//!   client ──▶ net (listeners, TLS) ──▶ http (dispatch) ──▶ routing
//!                                           │
//!                     security (rate limit, auth) ◀──┘
//!                                           │
//!                                           ▼
//!                                  store (entries, streams)
//!                                           ▲
//!                     janitor (expiry, counters) ──┘
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use clipshare::config::loader::load_config;
use clipshare::config::validation::validate_config;
use clipshare::error::StartupError;
use clipshare::lifecycle::{signals, startup, Shutdown};
use clipshare::observability::{logging, metrics};
use clipshare::security::Key;
use clipshare::{HttpServer, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "clipshare", version, about = "Temporary file and clipboard sharing server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server.
    Serve {
        /// TOML config file. Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Plain HTTP listen address, overrides the config file.
        #[arg(long)]
        listen_http: Option<String>,

        /// HTTPS listen address, overrides the config file.
        #[arg(long)]
        listen_https: Option<String>,

        /// Storage directory, overrides the config file.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Derive an `auth.key` value from a password read on stdin.
    Keygen,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Serve {
            config,
            listen_http,
            listen_https,
            dir,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(addr) = listen_http {
                config.listener.http = Some(addr);
            }
            if let Some(addr) = listen_https {
                config.listener.https = Some(addr);
            }
            if let Some(dir) = dir {
                config.storage.dir = dir;
            }
            serve(config).await?;
        }
        Command::Keygen => keygen()?,
    }
    Ok(())
}

async fn serve(config: ServerConfig) -> Result<(), StartupError> {
    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "clipshare starting");

    validate_config(&config).map_err(StartupError::Config)?;
    startup::prepare_storage_dir(&config.storage.dir)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    server.run(shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn keygen() -> Result<(), Box<dyn std::error::Error>> {
    eprint!("Password: ");
    let mut password = String::new();
    std::io::stdin().lock().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err("empty password".into());
    }
    println!("{}", Key::generate(password.as_bytes()).encode());
    Ok(())
}
