//! User Interface module
//!
//! Line-oriented console output for the interactive shell.

/// Rendering of session events as console lines
pub mod cli;

use anyhow::Result;
use colored::Colorize;

use crate::cli::Cli;
use crate::config::Config;

pub use cli::{print_event, render_event};

/// Display the welcome banner
pub fn display_welcome_page() -> Result<()> {
    println!();
    println!("┌─ Terminoda ─────────────────────────────────────────────────────────┐");
    println!("│                                                                     │");
    println!(
        "│   {:<65} │",
        format!("Multi-session terminal core v{}", env!("CARGO_PKG_VERSION"))
    );
    println!("│                                                                     │");
    println!("│   Quick start:                                                      │");
    println!("│   • /open user@host[:port] [name] - Open a session                  │");
    println!("│   • /send <text> - Type into the focused session                    │");
    println!("│   • /ls, /cd, /download, /upload - Browse and transfer files        │");
    println!("│   • /help - List every command                                      │");
    println!("│   • /quit - Exit                                                    │");
    println!("│                                                                     │");
    println!("└─────────────────────────────────────────────────────────────────────┘");
    println!();
    Ok(())
}

/// Display the configuration the process would run with
pub fn display_dry_run(cli: &Cli, config: &Config) -> Result<()> {
    display_welcome_page()?;
    println!("{}", "Dry-run mode configuration:".bold());
    println!("Config file: {}", cli.config_file);
    println!("Log level: {}", cli.effective_log_level(&config.log_level));
    config.display_summary()?;
    Ok(())
}
