mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "labrig",
    about = "Lab provisioning server: serialized infrastructure workflows with live logs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Server config file; missing files fall back to defaults plus environment
    #[arg(long, global = true, env = "LABRIG_CONFIG", default_value = labrig_core::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the deployment reaper
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
