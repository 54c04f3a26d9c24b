mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "concord",
    about = "Concept and sync engine: serve, inspect and validate a concord app",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        long,
        global = true,
        env = "CONCORD_CONFIG",
        default_value = concord_core::config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, short = 'j', global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Validate the configuration and every installed sync
    Check,

    /// List installed syncs
    Syncs,

    /// List registered concepts and their actions
    Concepts,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&cli.config, cli.json),
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Check => cmd::check::run(&cli.config, cli.json),
        Commands::Syncs => cmd::syncs::run(&cli.config, cli.json),
        Commands::Concepts => cmd::concepts::run(&cli.config, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
