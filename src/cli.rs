use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Semantic search index over catalog exports", long_about = None)]
pub struct Args {
    /// Path to a YAML config file (created with defaults if missing)
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the index from the product and category exports.
    Build {
        /// Products export file
        #[clap(long)]
        products: Option<PathBuf>,

        /// Categories export file
        #[clap(long)]
        categories: Option<PathBuf>,

        /// Output index file
        #[clap(long)]
        index: Option<PathBuf>,

        /// Embedding model name ("hashing" needs no download)
        #[clap(short, long)]
        model: Option<String>,

        /// Documents embedded per batch
        #[clap(short, long)]
        batch_size: Option<usize>,
    },
    /// Search a previously built index.
    Search {
        /// Free-text query
        query: String,

        /// Number of results
        #[clap(short = 'k', long)]
        limit: Option<usize>,

        /// Index file to search
        #[clap(long)]
        index: Option<PathBuf>,

        /// Embedding model name (must match the one used at build time)
        #[clap(short, long)]
        model: Option<String>,

        /// Print results as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },
    /// Show entry count and layout of a persisted index.
    Status {
        /// Index file to inspect
        #[clap(long)]
        index: Option<PathBuf>,
    },
}
