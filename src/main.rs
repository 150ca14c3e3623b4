use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pairapi::auth::IdentityVerifier;
use pairapi::config::{Config, StoreBackend};
use pairapi::logging::init_tracing;
use pairapi::server::{PairServer, build_router, open_stores};

#[derive(Parser, Debug)]
#[command(name = "pairapi")]
#[command(about = "Authenticated pairing handshake service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the API server (default if no subcommand given)
    Serve {
        /// Override the listen address from PAIR_BIND_ADDR
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.env_file {
        Some(path) => Config::from_env_file(path)?,
        None => Config::from_env()?,
    };
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Migrate => migrate(&config).await,
        Command::Serve { bind } => {
            if let Some(addr) = bind {
                config.bind_addr = addr;
            }
            serve(config).await
        }
    }
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    if config.store.backend != StoreBackend::Postgres {
        anyhow::bail!("migrate requires PAIR_STORE=postgres and DATABASE_URL");
    }
    // Opening the postgres store applies pending migrations.
    open_stores(&config.store)
        .await
        .context("failed to apply migrations")?;
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let verifier =
        IdentityVerifier::new(&config.auth).context("failed to load token verification key")?;
    let stores = open_stores(&config.store)
        .await
        .context("failed to open store")?;

    let (router, engine) = build_router(&config, verifier, stores);
    let sweeper = engine.spawn_sweeper(config.sweep_interval);

    let mut server = PairServer::new(config.bind_addr, router);
    server.start().await.context("failed to start server")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C");

    sweeper.abort();
    server.shutdown().await;
    Ok(())
}
