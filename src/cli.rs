// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `bootdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bootdag",
    version,
    about = "Run a simulated startup task graph under bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Bootdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Bootdag.toml")]
    pub config: String,

    /// Maximum number of tasks running at once; overrides
    /// `[engine].max_concurrency`.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BOOTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
