mod config;
mod migrate;
mod seed;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Dossier workflow and inter-agency exchange engine.
#[derive(Parser)]
#[command(name = "docket", version, about = "Dossier workflow and inter-agency exchange engine")]
struct Cli {
    /// Path to a TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP exchange server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// JSON fixture files loaded into the in-memory store at startup
        #[arg()]
        seeds: Vec<PathBuf>,
    },

    /// Align legacy-shaped cases with the live task graph
    MigrateCirculations {
        /// JSON fixture files loaded into the in-memory store first
        #[arg()]
        seeds: Vec<PathBuf>,
        /// Restrict the run to these case ids (repeatable)
        #[arg(long = "case")]
        cases: Vec<String>,
        /// Discard the whole batch when any case fails
        #[arg(long)]
        rollback: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine_config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(1);
        }
    };

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    match cli.command {
        Commands::Serve { port, seeds } => {
            if let Err(e) = rt.block_on(serve::start_server(port, engine_config, seeds)) {
                eprintln!("server error: {}", e);
                process::exit(1);
            }
        }
        Commands::MigrateCirculations {
            seeds,
            cases,
            rollback,
        } => {
            if let Err(e) = rt.block_on(migrate::cmd_migrate(engine_config, seeds, cases, rollback))
            {
                eprintln!("migration error: {}", e);
                process::exit(1);
            }
        }
    }
}
