use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    delete::{run_delete, DeleteArgs},
    search::{run_search, SearchArgs},
};
use config::{FileConfig, ServerConfig};
use tracing_subscriber::EnvFilter;
use yansi::{Condition, Paint};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    /// The host of the GeoRocket server
    #[arg(long, env = "GEOROCKET_HOST", global = true)]
    host: Option<String>,

    /// The port of the GeoRocket server
    #[arg(long, env = "GEOROCKET_PORT", global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Delete(DeleteArgs),
    Search(SearchArgs),
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server = ServerConfig::resolve(cli.host, cli.port, FileConfig::load_default()?);
    match cli.command {
        Commands::Delete(args) => run_delete(args, &server).await,
        Commands::Search(args) => run_search(args, &server).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!(
                "{}",
                format!("Error: {err:#}").red().whenever(Condition::from(|| {
                    Condition::stderr_is_tty() && Condition::clicolor() && Condition::no_color()
                }))
            );
            ExitCode::FAILURE
        }
    }
}
