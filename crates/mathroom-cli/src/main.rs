//! mathroom CLI - interactive practice sessions and room maintenance.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "mathroom", version, about = "Adaptive math practice with resumable rooms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume a practice session
    Play {
        /// Grade to practise (1-12); not needed when joining a room
        #[arg(long)]
        grade: Option<u8>,

        /// Join an existing room by code (e.g. PI-SUM-42)
        #[arg(long, conflicts_with = "new")]
        room: Option<String>,

        /// Always start a fresh room
        #[arg(long)]
        new: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the stored state of a room
    Show {
        /// Room code
        #[arg(long)]
        room: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate question bank TOML files
    Validate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Create starter config and example question bank
    Init,
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mathroom=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Play {
            grade,
            room,
            new,
            config,
        } => commands::play::execute(grade, room, new, config).await,
        Commands::Show { room, config } => commands::show::execute(room, config).await,
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
