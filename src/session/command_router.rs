//! Command Router for interactive command processing

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::ConfigAction;
use crate::output::SearchDirection;
use crate::transport::{DEFAULT_PORT, FileOp};

/// Interactive commands for the terminal session
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveCommand {
    /// Open a session to `user@host[:port]`
    Open {
        username: String,
        host: String,
        port: u16,
        name: Option<String>,
    },
    /// Switch the focused session by list index or id prefix
    Focus { target: String },
    /// Send a line of input to the focused session
    Send { text: String },
    /// Request a new geometry
    Resize { cols: u16, rows: u16 },
    /// Fit the focused session to a pane size in pixels
    Fit { width: u32, height: u32 },
    /// Download a remote file
    Download { remote: String, local: String },
    /// Upload a local file
    Upload { local: String, remote: String },
    /// Cancel the focused session's transfer
    Cancel,
    /// List the current directory, or jump to `path` first
    Ls { path: Option<String> },
    /// Change directory
    Cd { path: String },
    /// Go to the parent directory
    Up,
    /// Mutate a remote file
    FileOp { op: FileOp },
    /// Search the focused session's output; an empty query clears the highlight
    Search {
        query: String,
        direction: SearchDirection,
    },
    /// Clear the focused session's scrollback
    Clear,
    /// List active sessions
    Sessions,
    /// Close the focused session or the one named
    Close { target: Option<String> },
    /// Show connection status and metrics
    Status,
    /// Configuration management
    Config { action: Option<ConfigAction> },
    /// Show help
    Help,
    /// Quit the application
    Quit,
}

/// Command router for processing interactive commands
pub struct CommandRouter {
    /// Command input channel
    command_tx: mpsc::UnboundedSender<InteractiveCommand>,
    /// Command input receiver
    command_rx: Option<mpsc::UnboundedReceiver<InteractiveCommand>>,
}

impl CommandRouter {
    /// Create a new CommandRouter
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Get next command from input
    pub async fn next_command(&mut self) -> Option<InteractiveCommand> {
        if let Some(command_rx) = &mut self.command_rx {
            command_rx.recv().await
        } else {
            None
        }
    }

    /// Get command sender for external use
    pub fn command_sender(&self) -> mpsc::UnboundedSender<InteractiveCommand> {
        self.command_tx.clone()
    }

    /// Parse interactive command from string input
    pub fn parse_interactive_command(input: &str) -> Result<Option<InteractiveCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };
        let parts: Vec<&str> = rest.split_whitespace().collect();

        let command = match head {
            "/open" => {
                let target = parts
                    .first()
                    .ok_or_else(|| anyhow!("Usage: /open <user@host[:port]> [name]"))?;
                let (username, host, port) = parse_target(target)?;
                let name = (parts.len() > 1).then(|| parts[1..].join(" "));
                InteractiveCommand::Open {
                    username,
                    host,
                    port,
                    name,
                }
            }
            "/focus" => match parts.as_slice() {
                [target] => InteractiveCommand::Focus {
                    target: target.to_string(),
                },
                _ => return Err(anyhow!("Usage: /focus <index|id>")),
            },
            "/send" => InteractiveCommand::Send {
                text: rest.to_string(),
            },
            "/resize" => match parts.as_slice() {
                [cols, rows] => InteractiveCommand::Resize {
                    cols: parse_number(cols, "cols")?,
                    rows: parse_number(rows, "rows")?,
                },
                _ => return Err(anyhow!("Usage: /resize <cols> <rows>")),
            },
            "/fit" => match parts.as_slice() {
                [width, height] => InteractiveCommand::Fit {
                    width: parse_number(width, "width")?,
                    height: parse_number(height, "height")?,
                },
                _ => return Err(anyhow!("Usage: /fit <pixel_width> <pixel_height>")),
            },
            "/download" | "/get" => match parts.as_slice() {
                [remote] => InteractiveCommand::Download {
                    remote: remote.to_string(),
                    local: default_local_name(remote),
                },
                [remote, local] => InteractiveCommand::Download {
                    remote: remote.to_string(),
                    local: local.to_string(),
                },
                _ => return Err(anyhow!("Usage: /download <remote> [local]")),
            },
            "/upload" | "/put" => match parts.as_slice() {
                [local, remote] => InteractiveCommand::Upload {
                    local: local.to_string(),
                    remote: remote.to_string(),
                },
                _ => return Err(anyhow!("Usage: /upload <local> <remote>")),
            },
            "/cancel" => InteractiveCommand::Cancel,
            "/ls" => InteractiveCommand::Ls {
                path: parts.first().map(|p| p.to_string()),
            },
            "/cd" => match parts.as_slice() {
                [path] => InteractiveCommand::Cd {
                    path: path.to_string(),
                },
                _ => return Err(anyhow!("Usage: /cd <dir>")),
            },
            "/up" => InteractiveCommand::Up,
            "/mkdir" => match parts.as_slice() {
                [path] => InteractiveCommand::FileOp {
                    op: FileOp::Mkdir {
                        path: path.to_string(),
                    },
                },
                _ => return Err(anyhow!("Usage: /mkdir <path>")),
            },
            "/rm" => match parts.as_slice() {
                [path] => InteractiveCommand::FileOp {
                    op: FileOp::Delete {
                        path: path.to_string(),
                    },
                },
                _ => return Err(anyhow!("Usage: /rm <path>")),
            },
            "/mv" => match parts.as_slice() {
                [from, to] => InteractiveCommand::FileOp {
                    op: FileOp::Rename {
                        from: from.to_string(),
                        to: to.to_string(),
                    },
                },
                _ => return Err(anyhow!("Usage: /mv <from> <to>")),
            },
            "/chmod" => match parts.as_slice() {
                [mode, path] => {
                    let mode = u32::from_str_radix(mode, 8)
                        .map_err(|_| anyhow!("Invalid octal mode: {}", mode))?;
                    InteractiveCommand::FileOp {
                        op: FileOp::Chmod {
                            path: path.to_string(),
                            mode,
                        },
                    }
                }
                _ => return Err(anyhow!("Usage: /chmod <octal-mode> <path>")),
            },
            "/search" | "/find" => {
                let (direction, query) = match parts.first() {
                    Some(&"-b") => (SearchDirection::Previous, rest[2..].trim()),
                    _ => (SearchDirection::Next, rest),
                };
                InteractiveCommand::Search {
                    query: query.to_string(),
                    direction,
                }
            }
            "/clear" => InteractiveCommand::Clear,
            "/sessions" => InteractiveCommand::Sessions,
            "/close" => InteractiveCommand::Close {
                target: parts.first().map(|t| t.to_string()),
            },
            "/status" => InteractiveCommand::Status,
            "/config" => match parts.as_slice() {
                [] => InteractiveCommand::Config { action: None },
                ["show"] => InteractiveCommand::Config {
                    action: Some(ConfigAction::Show),
                },
                ["reset"] => InteractiveCommand::Config {
                    action: Some(ConfigAction::Reset),
                },
                ["set", key, value @ ..] if !value.is_empty() => InteractiveCommand::Config {
                    action: Some(ConfigAction::Set {
                        key: key.to_string(),
                        value: value.join(" "),
                    }),
                },
                _ => return Err(anyhow!("Usage: /config [show|set <key> <value>|reset]")),
            },
            "/help" | "?" => InteractiveCommand::Help,
            "/quit" | "/exit" | "/q" => InteractiveCommand::Quit,
            other => {
                return Err(anyhow!(
                    "Unknown command: {}. Type '/help' for available commands.",
                    other
                ));
            }
        };

        Ok(Some(command))
    }

    /// Interactive command help
    pub fn help_messages() -> &'static [&'static str] {
        &[
            "Terminoda Interactive Commands:",
            "  /open <user@host[:port]> [name] - Open a session and focus it",
            "  /sessions                       - List active sessions",
            "  /focus <index|id>               - Focus another session",
            "  /close [index|id]               - Close the focused or named session",
            "  /send <text>                    - Send a line of input",
            "  /resize <cols> <rows>           - Request a terminal size",
            "  /fit <width> <height>           - Fit the terminal to a pane size in pixels",
            "  /search [-b] <query>            - Find next (or previous with -b) match",
            "  /clear                          - Clear scrollback",
            "  /ls [path]                      - List the current or given directory",
            "  /cd <dir> | /up                 - Change directory",
            "  /mkdir /rm /mv /chmod           - Mutate remote files",
            "  /download <remote> [local]      - Download a file",
            "  /upload <local> <remote>        - Upload a file",
            "  /cancel                         - Cancel the running transfer",
            "  /status                         - Show multiplexer statistics",
            "  /config [show|set|reset]        - Configuration management",
            "  /help                           - Show this help",
            "  /quit                           - Exit the application",
        ]
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_target(target: &str) -> Result<(String, String, u16)> {
    let (username, host_port) = target
        .split_once('@')
        .ok_or_else(|| anyhow!("Expected user@host, got {}", target))?;
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, parse_number(port, "port")?),
        None => (host_port, DEFAULT_PORT),
    };
    if username.is_empty() || host.is_empty() {
        return Err(anyhow!("Expected user@host, got {}", target));
    }
    info!("Parsed session target {}@{}:{}", username, host, port);
    Ok((username.to_string(), host.to_string(), port))
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {}: {}", what, value))
}

fn default_local_name(remote: &str) -> String {
    let name = crate::navigator::path::file_name(remote);
    if name.is_empty() {
        "download".to_string()
    } else {
        name.to_string()
    }
}
