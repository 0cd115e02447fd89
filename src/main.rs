//! Sheetwise CLI entry point

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "sheetwise")]
#[command(about = "Token-metered AI analysis service for spreadsheet data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides SHEETWISE_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides SHEETWISE_HOST)
        #[arg(long)]
        host: Option<String>,
    },
    /// List the token accounts stored in the data directory
    Accounts,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // RUST_LOG wins over the default filter
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sheetwise={log_level},tower_http={log_level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            tracing::info!("Sheetwise v{}", env!("CARGO_PKG_VERSION"));
            commands::serve(host, port).await
        }
        Commands::Accounts => commands::accounts(),
        Commands::Version => {
            println!("Sheetwise v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
