//! The cuemark binary: first-boot setup and the long-running daemon.

use clap::{Parser, Subcommand};
use cuemark_service::error::{ErrorKind, Result};
use cuemark_service::{Config, Service};
use exn::ResultExt;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Marker management for a media server library.
#[derive(Parser)]
#[command(name = "cuemark", about = "Marker management for a media server library")]
struct Cli {
    /// Path to the config file.
    #[arg(long, env = "CUEMARK_CONFIG", default_value = "cuemark.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// First-boot setup: write the default config file and exit.
    Init,
    /// Run the service until interrupted.
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init => {
            let config = Config::write_default(&cli.config)?;
            println!("Wrote {}", cli.config.display());
            println!();
            println!("Point databasePath at the media server's library database");
            println!("(currently: {:?}) and start the daemon:", config.database_path);
            println!("  cuemark --config {} daemon", cli.config.display());
            Ok(())
        },
        Commands::Daemon => {
            let config = Config::load(&cli.config)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.env_filter().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let service = Service::start(config).await?;
            tracing::info!("cuemark is running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.or_raise(|| ErrorKind::Io)?;
            service.shutdown().await;
            Ok(())
        },
    }
}
