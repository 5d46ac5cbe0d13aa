//! Command-line interface for cohost
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// AI co-host for live streams
#[derive(Parser, Debug)]
#[command(name = "cohost", version, about = "AI co-host for live streams")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join the stream and run until interrupted
    Run {
        /// Stream media URL (overrides stream.url)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Read chat messages from stdin, one `name: text` per line
        #[arg(long)]
        stdin_chat: bool,

        /// Minimum time between replies. Examples: 30s, 2m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        cooldown: Option<u64>,

        /// Pause before a failed run is restarted. Examples: 5s, 1m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        restart_backoff: Option<u64>,

        /// Log replies instead of posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect and edit the fact memory
    Facts {
        #[command(subcommand)]
        action: FactsAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Fact memory actions
#[derive(Subcommand, Debug)]
pub enum FactsAction {
    /// Print the numbered fact listing
    List,
    /// Add facts (duplicates and blanks are skipped)
    Add {
        #[arg(required = true, value_name = "FACT")]
        facts: Vec<String>,
    },
    /// Remove facts by their 1-based listing position
    Remove {
        #[arg(required = true, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        positions: Vec<u64>,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the configuration file path
    Path,
}
