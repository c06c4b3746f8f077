use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "lanbeacon",
    version,
    about = "Zero-configuration service discovery and registry for local networks",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery node and the HTTP API until Ctrl+C
    Serve {
        /// TOML config file (environment variables are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// HTTP API bind host
        #[arg(long)]
        api_host: Option<String>,

        /// HTTP API bind port
        #[arg(long)]
        api_port: Option<u16>,
    },

    /// List active interfaces and their broadcast addresses
    Interfaces,

    /// Send a single descriptor on every active interface and exit
    Announce {
        /// TOML config file (environment variables are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Announce departure (STOPPING) instead of presence
        #[arg(long, default_value = "false")]
        stopping: bool,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 3)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            config,
            api_host,
            api_port,
        } => {
            tracing::info!(config = ?config, "Starting serve command");
            commands::serve(commands::ServeParams {
                config,
                api_host,
                api_port,
            })
            .await?;
        }

        Commands::Interfaces => {
            commands::interfaces()?;
        }

        Commands::Announce { config, stopping } => {
            tracing::info!(config = ?config, stopping, "Starting announce command");
            commands::announce(config, stopping).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("lanbeacon=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lanbeacon=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
