use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use relaychat::config::RelayConfig;
use relaychat::llm_interaction::{ProbeOutcome, UpstreamClient};
use relaychat::web_server;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the chat web server.
    Start {
        #[arg(long, env = "RELAYCHAT_HOST", default_value = "0.0.0.0", help = "Address to bind.")]
        host: IpAddr,
        #[arg(long, env = "RELAYCHAT_PORT", default_value_t = 5000, help = "Port for the web server.")]
        port: u16,
    },
    /// Send a small request to the completion API to check the API key.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=relaychat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaychat=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::default();

    match cli.command {
        Commands::Start { host, port } => {
            if !config.has_api_key() {
                warn!("OPENROUTER_API_KEY is not set; chat requests will be rejected upstream");
            }
            info!(
                model = %config.model,
                api_url = %config.api_url,
                upload_dir = %config.upload_dir.display(),
                max_body_bytes = config.max_body_bytes,
                max_history = ?config.max_history,
                "Starting relaychat"
            );

            web_server::start_web_server(SocketAddr::new(host, port), config)
                .await
                .context("Web server failed")?;
            info!("Shutdown complete.");
        }
        Commands::Check => {
            let upstream = UpstreamClient::new(&config)?;
            match upstream.probe().await.context("API probe failed")? {
                ProbeOutcome::Valid => println!("API key is valid"),
                ProbeOutcome::Rejected { status, body } => {
                    error!(status, "API key check failed");
                    println!("API key check failed (HTTP {}): {}", status, body);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
