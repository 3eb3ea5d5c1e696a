//! Simple CLI output implementation
//!
//! Turns [`SessionEvent`]s into console lines.

use colored::Colorize;

use crate::session::SessionEvent;
use crate::transfer::{TransferOperation, TransferState};

/// Print an event to stdout
pub fn print_event(event: &SessionEvent) {
    for line in render_event(event) {
        println!("{}", line);
    }
}

/// Format an event as zero or more console lines
pub fn render_event(event: &SessionEvent) -> Vec<String> {
    match event {
        SessionEvent::ShutdownRequested => vec!["Shutting down...".yellow().to_string()],
        SessionEvent::Error { message } => vec![format!("{} {}", "Error:".red().bold(), message)],
        SessionEvent::SessionOpened { session } => vec![format!(
            "{} {} ({}) as {}",
            "Opened".green(),
            session.display_name.bold(),
            session.host_address,
            session.id
        )],
        SessionEvent::SessionClosed {
            session_id,
            last_transfer,
        } => {
            let mut lines = vec![format!("{} session {}", "Closed".yellow(), session_id)];
            if let Some(op) = last_transfer.as_ref().filter(|op| !op.is_terminal()) {
                lines.push(format!("   abandoned transfer {}", describe_transfer(op)));
            }
            lines
        }
        SessionEvent::SessionList { sessions, focused } => {
            if sessions.is_empty() {
                return vec!["📋 No active sessions".to_string()];
            }
            let mut lines = vec!["📋 Active sessions:".to_string()];
            for (i, session) in sessions.iter().enumerate() {
                let marker = if focused.as_ref() == Some(&session.id) {
                    "*"
                } else {
                    " "
                };
                lines.push(format!(
                    "  {}{}. {} ({}) {}",
                    marker,
                    i + 1,
                    session.display_name,
                    session.host_address,
                    session.id
                ));
            }
            lines
        }
        SessionEvent::FocusChanged { session_id } => {
            vec![format!("Focused {}", session_id.to_string().cyan())]
        }
        SessionEvent::OutputAppended { bytes, .. } => String::from_utf8_lossy(bytes)
            .lines()
            .map(|line| line.to_string())
            .collect(),
        SessionEvent::TransferUpdated { operation } => vec![describe_transfer(operation)],
        SessionEvent::GeometryChanged {
            session_id,
            cols,
            rows,
            acknowledged,
        } => {
            let status = if *acknowledged { "acknowledged" } else { "requested" };
            vec![format!("{}: {}x{} {}", session_id, cols, rows, status.dimmed())]
        }
        SessionEvent::DirectoryLoaded { view } => {
            let mut lines = vec![format!("📂 {}", view.current_path.bold())];
            for entry in view.sorted_entries() {
                if entry.is_dir() {
                    lines.push(format!("   {}/", entry.name.blue()));
                } else {
                    lines.push(format!("   {:<32} {:>10}", entry.name, entry.size));
                }
            }
            lines
        }
        SessionEvent::DirectoryError { path, message, .. } => {
            vec![format!("{} {}: {}", "Listing failed".red(), path, message)]
        }
        SessionEvent::FileOpCompleted { description, .. } => {
            vec![format!("{} {}", "✓".green(), description)]
        }
        SessionEvent::SearchResult {
            query,
            location,
            line_text,
            ..
        } => match (location, line_text) {
            (Some(location), Some(text)) => vec![format!(
                "🔍 line {} col {}: {}",
                location.line,
                location.column,
                text.trim_end()
            )],
            (Some(location), None) => {
                vec![format!("🔍 line {} col {}", location.line, location.column)]
            }
            (None, _) if query.is_empty() => vec!["🔍 Search cleared".to_string()],
            (None, _) => vec![format!("🔍 No match for {:?}", query)],
        },
        SessionEvent::StatusInfo { info } => {
            let mut lines = vec![
                "🔍 Terminoda Status:".to_string(),
                format!("   Version: {}", info.version),
                format!("   State: {}", info.state),
                format!("   Active sessions: {}", info.active_sessions),
            ];
            for session in &info.sessions {
                lines.push(format!("     • {}", session));
            }
            lines.push(format!("   Closed sessions: {}", info.closed_sessions));
            lines.push(format!("   Transfers in flight: {}", info.transfers_in_flight));
            lines.push(format!("   Events delivered: {}", info.events_delivered));
            lines.push(format!(
                "   Events routed/dropped: {}/{}",
                info.stats.events_routed, info.stats.events_dropped
            ));
            lines.push(format!(
                "   Transfers started/completed/failed/cancelled: {}/{}/{}/{}",
                info.stats.transfers_started,
                info.stats.transfers_completed,
                info.stats.transfers_failed,
                info.stats.transfers_cancelled
            ));
            lines.push(format!("   Uptime: {}s", info.stats.uptime_secs()));
            lines
        }
        SessionEvent::ConfigInfo { config } => match toml::to_string_pretty(config) {
            Ok(text) => text.lines().map(|line| line.to_string()).collect(),
            Err(e) => vec![format!("{} {}", "Error:".red().bold(), e)],
        },
        SessionEvent::ConfigReset => vec!["Configuration reset to defaults".yellow().to_string()],
        SessionEvent::HelpInfo { lines } => lines.clone(),
    }
}

fn describe_transfer(op: &TransferOperation) -> String {
    let state = match op.state {
        TransferState::Completed => op.state.to_string().green(),
        TransferState::Failed => op.state.to_string().red(),
        TransferState::Cancelled => op.state.to_string().yellow(),
        _ => op.state.to_string().cyan(),
    };
    let progress = match op.fraction() {
        Some(fraction) => format!("{:.0}%", fraction * 100.0),
        None => format!("{} bytes", op.transferred_bytes),
    };
    let mut line = format!(
        "⇅ {} {:?} {} {} [{}]",
        op.id, op.direction, op.remote_path, progress, state
    );
    if let Some(error) = &op.error {
        line.push_str(&format!(" {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionId};

    #[test]
    fn output_is_split_into_lines() {
        let event = SessionEvent::OutputAppended {
            session_id: SessionId::new("s1"),
            bytes: b"one\r\ntwo\n".to_vec(),
        };
        assert_eq!(render_event(&event), vec!["one", "two"]);
    }

    #[test]
    fn session_list_marks_focus() {
        let a = Session::new(SessionId::new("a"), "alpha", "alpha:22");
        let b = Session::new(SessionId::new("b"), "beta", "beta:22");
        let event = SessionEvent::SessionList {
            sessions: vec![a, b],
            focused: Some(SessionId::new("b")),
        };
        let lines = render_event(&event);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("   1. alpha"));
        assert!(lines[2].starts_with("  *2. beta"));
    }

    #[test]
    fn empty_search_reports_cleared() {
        let event = SessionEvent::SearchResult {
            session_id: SessionId::new("s1"),
            query: String::new(),
            location: None,
            line_text: None,
        };
        assert_eq!(render_event(&event), vec!["🔍 Search cleared"]);
    }
}
