//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "offerdex",
    version,
    about = "Semantic index and query engine for affiliate product catalogs",
    long_about = "Offerdex ingests an affiliate product catalog into a SQLite store plus a \
                  vector index, and answers semantic similarity queries combined with \
                  relational filters, normalized earnings, and coupon metadata."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/offerdex/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a catalog CSV, rebuilding the store and vector index
    Load {
        /// Path to the catalog CSV export
        source: PathBuf,

        /// Rows per embedding batch (defaults to the configured value)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Search the catalog by semantic similarity
    Query {
        /// Free-text query
        query: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "5")]
        limit: i64,

        /// Keep only results with normalized EPC at or above this value
        #[arg(long)]
        min_epc: Option<f64>,

        /// Keep only results in this exact category
        #[arg(long)]
        category: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List product categories with record counts
    Categories {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show top products by earnings potential
    Top {
        /// Restrict to one category
        #[arg(long)]
        category: Option<String>,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: i64,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate catalog statistics
    Stats {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Serve tool requests as line-delimited JSON on stdin/stdout
    Serve,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Show,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
