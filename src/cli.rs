//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Taleforge - scene locks, response cache and JSON repair for story generation
#[derive(Parser, Debug)]
#[command(name = "taleforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TALEFORGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "TALEFORGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TALEFORGE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract the JSON payload from a raw model reply
    Sanitize {
        /// File holding the reply (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Parse the result and pretty-print it; fail if it is not JSON
        #[arg(long)]
        parse: bool,
    },

    /// Print the cache key for a request
    Key {
        /// User prompt
        #[arg(long, default_value = "")]
        prompt: String,

        /// System prompt
        #[arg(long, default_value = "")]
        system: String,

        /// Model (defaults to provider.default_model)
        #[arg(long)]
        model: Option<String>,

        /// Provider name (defaults to provider.name)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Print the effective configuration as YAML
    Config,
}
