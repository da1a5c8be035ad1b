mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sandcheck-cli")]
#[command(about = "Sandcheck CLI - Verify submissions and manage challenge definitions", long_about = None)]
struct Cli {
    /// Extra challenge definitions (defaults to SANDCHECK_CHALLENGES, then config/challenges.json)
    #[arg(long, global = true)]
    challenges: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a source file against a challenge
    Verify {
        /// Challenge id (e.g., two-sum, toggle-switch)
        #[arg(short, long)]
        challenge: String,

        /// Path to the submission source
        #[arg(short, long)]
        file: PathBuf,

        /// Print the response as JSON instead of a report
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List registered challenges
    List,

    /// Show one challenge and its checks
    Show {
        /// Challenge id
        #[arg(short, long)]
        challenge: String,
    },

    /// Initialize a project with a starter challenge file
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports and --json output stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify { challenge, file, json } => {
            let engine = commands::load_engine(cli.challenges.as_deref())?;
            let is_correct = commands::verify_file(&engine, &challenge, &file, json).await?;
            if !is_correct {
                std::process::exit(1);
            }
        }
        Commands::List => {
            let engine = commands::load_engine(cli.challenges.as_deref())?;
            commands::list_challenges(&engine);
        }
        Commands::Show { challenge } => {
            let engine = commands::load_engine(cli.challenges.as_deref())?;
            commands::show_challenge(&engine, &challenge)?;
        }
        Commands::Init { path } => {
            commands::init_project(&path).await?;
        }
    }

    Ok(())
}
