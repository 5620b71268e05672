mod board_cmd;
mod level_cmd;
mod snapshot_cmd;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use voxrank_config::VoxrankConfig;

#[derive(Parser)]
#[command(name = "voxrank")]
#[command(about = "VoxRank — voice participation credit runtime")]
#[command(version)]
struct Cli {
    /// Config file path (overrides VOXRANK_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a leaderboard window as JSON
    Board {
        /// weekly | monthly | lifetime | host-weekly | host-monthly | host-lifetime
        window: String,
        /// Entries to show (defaults to the configured board limit)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Past week to rank instead of the current one; accepts
        /// `YYYY-Www` or any date inside the week
        #[arg(short, long)]
        week: Option<String>,
    },
    /// Print store period keys and row counts as JSON
    Snapshot,
    /// Print the level curve position for a lifetime XP total
    Level {
        /// Lifetime XP
        xp: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    logging::init_logger(&config.log_dir, &config.log_level);

    match cli.command {
        Commands::Board {
            window,
            limit,
            week,
        } => board_cmd::run(&config, &window, limit, week.as_deref()),
        Commands::Snapshot => snapshot_cmd::run(&config),
        Commands::Level { xp } => level_cmd::run(xp),
    }
}

fn load_config(path: Option<&Path>) -> Result<VoxrankConfig> {
    match path {
        Some(path) => voxrank_config::load_config(path),
        None => voxrank_config::load_or_default(),
    }
}
