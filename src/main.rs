use std::path::PathBuf;

use anyhow::Result;
use chapter_rag::commands::{ask, build_index, chat, embed_corpus, index_corpus, show_status};
use chapter_rag::config::{get_config_dir, run_interactive_config, show_config};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chapter-rag")]
#[command(about = "Question answering over an indexed textbook corpus")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.chapter-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the API endpoint, models and pipeline settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Segment and embed the corpus into the embeddings file
    Embed,
    /// Build the vector index and metadata from the embeddings file
    Build,
    /// Embed the corpus and build the index in one step
    Index {
        /// Only report how many segments would be embedded
        #[arg(long)]
        dry_run: bool,
    },
    /// Show pipeline files and knowledge base statistics
    Status,
    /// Answer a single question
    Ask {
        question: String,
        /// List the retrieved passages with their relevance
        #[arg(long)]
        sources: bool,
    },
    /// Start an interactive question session
    Chat {
        #[arg(long)]
        sources: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Embed => embed_corpus(&config_dir)?,
        Commands::Build => build_index(&config_dir)?,
        Commands::Index { dry_run } => index_corpus(&config_dir, dry_run)?,
        Commands::Status => show_status(&config_dir)?,
        Commands::Ask { question, sources } => ask(&config_dir, &question, sources)?,
        Commands::Chat { sources } => chat(&config_dir, sources)?,
    }

    Ok(())
}
