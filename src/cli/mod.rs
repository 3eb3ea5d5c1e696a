//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for Terminoda.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "terminoda")]
#[command(about = "Terminoda multi-session terminal core")]
#[command(
    long_about = "Routes terminal output, transfer progress and resize acknowledgements for many concurrent remote sessions"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Dry-run mode: show the welcome page and configuration, then exit
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start interactive terminal session
    #[command(hide = true)]
    Interactive,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Run a scripted session against the loopback transport
    Demo,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Interactive
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Reset configuration to defaults
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Check if we're running in interactive mode
    pub fn is_interactive_mode(&self) -> bool {
        matches!(self.command(), Commands::Interactive)
    }

    /// Resolve the log level: verbose flag, then `--log-level`, then the configured level
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }

    /// Check if we're running in dry-run mode
    pub fn is_dry_run_mode(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_interactive() {
        let cli = Cli::parse_from(["terminoda"]);
        assert!(cli.is_interactive_mode());
        assert_eq!(cli.effective_log_level("info"), "info");
    }

    #[test]
    fn verbose_forces_debug() {
        let cli = Cli::parse_from(["terminoda", "-v", "--log-level", "warn"]);
        assert_eq!(cli.effective_log_level("error"), "debug");
    }

    #[test]
    fn configured_level_applies_without_flag() {
        let cli = Cli::parse_from(["terminoda"]);
        assert_eq!(cli.effective_log_level("trace"), "trace");

        let cli = Cli::parse_from(["terminoda", "--log-level", "warn"]);
        assert_eq!(cli.effective_log_level("trace"), "warn");
    }

    #[test]
    fn parses_config_set() {
        let cli = Cli::parse_from(["terminoda", "config", "set", "buffer.scrollback_lines", "500"]);
        match cli.command() {
            Commands::Config {
                action: Some(ConfigAction::Set { key, value }),
            } => {
                assert_eq!(key, "buffer.scrollback_lines");
                assert_eq!(value, "500");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
