//! OpenPasture - daily grazing-plan decision engine

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

use commands::{init_command, run_command, show_command, status_command};

/// OpenPasture - rotational grazing planner for your terminal
#[derive(Parser)]
#[command(name = "openpasture")]
#[command(about = "Daily grazing-plan decision engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and the farm data directory
    Init,
    /// Generate today's grazing plan for a farm
    Run {
        /// Farm identifier
        #[arg(short, long)]
        farm: String,
        /// Display name used in the brief (defaults to the farm id)
        #[arg(short, long)]
        name: Option<String>,
        /// Paddock the herd currently occupies
        #[arg(short, long)]
        paddock: Option<String>,
        /// Plan date (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show the plan recorded for a farm and date
    Show {
        /// Farm identifier
        #[arg(short, long)]
        farm: String,
        /// Plan date (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Show configuration and provider readiness
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Run { verbose: true, .. }) {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt::init();
    }

    match cli.command {
        Commands::Init => {
            if let Err(e) = init_command().await {
                error!("Init failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Run {
            farm,
            name,
            paddock,
            date,
            verbose: _,
        } => {
            if let Err(e) = run_command(farm, name, paddock, date).await {
                error!("Run failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Show { farm, date } => {
            if let Err(e) = show_command(farm, date).await {
                error!("Show failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Status => {
            if let Err(e) = status_command().await {
                error!("Status failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}
