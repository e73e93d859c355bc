//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use crate::index::HashAlgorithm;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Find files that already exist in your archives, using reusable CAF indexes
#[derive(Parser, Debug)]
#[command(name = "caf-dupes")]
#[command(version)]
#[command(about = "Indexed duplicate finder with CAF-compatible index files", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a folder and save the result as a CAF file
    Index {
        /// Folder to index
        folder: PathBuf,

        /// Output file (defaults to <folder>_index[_<algorithm>].caf beside the folder)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Hash algorithm (overrides config)
        #[arg(long, value_name = "ALGO", conflicts_with = "no_hash")]
        hash: Option<HashAlgorithm>,

        /// Do not hash contents; match on size and name only
        #[arg(long)]
        no_hash: bool,
    },

    /// Find files under SOURCE that already exist in any DEST folder
    Scan {
        /// Folder whose files are checked
        source: PathBuf,

        /// Destination folders forming the combined index
        #[arg(required = true)]
        destinations: Vec<PathBuf>,

        /// Hash algorithm (overrides config)
        #[arg(long, value_name = "ALGO", conflicts_with = "no_hash")]
        hash: Option<HashAlgorithm>,

        /// Do not hash contents; match on size and name only
        #[arg(long)]
        no_hash: bool,

        /// Neither load nor save destination index files
        #[arg(long)]
        no_reuse: bool,

        /// Rebuild every destination index
        #[arg(long)]
        recreate: bool,

        /// Rebuild this destination's index (can be specified multiple times)
        #[arg(long, value_name = "DEST")]
        rebuild: Vec<PathBuf>,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a single file against an existing index
    Check {
        /// File to look up
        file: PathBuf,

        /// CAF index to look in
        #[arg(short, long, value_name = "CAF")]
        index: PathBuf,

        /// Hash algorithm used when the index was built (overrides config)
        #[arg(long, value_name = "ALGO", conflicts_with = "no_hash")]
        hash: Option<HashAlgorithm>,

        /// Match on size and name only
        #[arg(long)]
        no_hash: bool,
    },

    /// Search the files recorded in an index
    Search {
        /// CAF index to search
        index: PathBuf,

        /// Case-insensitive regular expression matched against file names
        #[arg(long, value_name = "REGEX")]
        name: Option<String>,

        /// Minimum size, e.g. 10MB (or "any")
        #[arg(long, value_name = "SIZE")]
        min_size: Option<String>,

        /// Maximum size, e.g. 2GB (or "any")
        #[arg(long, value_name = "SIZE")]
        max_size: Option<String>,

        /// Modified on or after this date (YYYY-MM-DD, today, yesterday)
        #[arg(long, value_name = "DATE")]
        after: Option<String>,

        /// Modified before this date (dates mean midnight, local time)
        #[arg(long, value_name = "DATE")]
        before: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the index files found in the given (or configured) locations
    Catalog {
        /// Folders to search; defaults to catalog.search_locations
        locations: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the header of an index file
    Info {
        /// CAF index to describe
        index: PathBuf,
    },

    /// Show current configuration
    ShowConfig,

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
