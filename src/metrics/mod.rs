//! Metrics collection and monitoring module
//!
//! Counts routed and dropped backend events, session churn and transfer outcomes.
//! Every counter is mirrored to the `metrics` facade so an installed recorder can
//! export it; without a recorder the facade calls are no-ops.

use metrics::increment_counter;
use serde::Serialize;

/// Reason an inbound event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Session unknown, closing or tombstoned
    Unaddressable,
    /// Progress path did not match the tracked transfer
    UnmatchedProgress,
    /// No transfer in progress for the session
    NoTransfer,
    /// Resize acknowledgement older than the newest request
    StaleAck,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Unaddressable => "unaddressable",
            DropReason::UnmatchedProgress => "unmatched_progress",
            DropReason::NoTransfer => "no_transfer",
            DropReason::StaleAck => "stale_ack",
        }
    }
}

/// Snapshot of multiplexer activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiplexerStats {
    pub start_time: u64,
    pub events_routed: u64,
    pub events_dropped: u64,
    pub output_bytes: u64,
    pub unmatched_progress: u64,
    pub stale_acks: u64,
    pub stale_completions: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub transfers_started: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub transfers_cancelled: u64,
    pub commands_processed: u64,
    pub errors_encountered: u64,
}

impl MultiplexerStats {
    pub fn new() -> Self {
        Self {
            start_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
            ..Default::default()
        }
    }

    /// An event reached its consumer
    pub fn record_routed(&mut self, kind: &'static str) {
        self.events_routed += 1;
        increment_counter!("terminoda_events_routed", "kind" => kind);
    }

    pub fn record_output(&mut self, bytes: usize) {
        self.output_bytes += bytes as u64;
    }

    /// An event was discarded before mutating any state
    pub fn record_dropped(&mut self, kind: &'static str, reason: DropReason) {
        self.events_dropped += 1;
        match reason {
            DropReason::UnmatchedProgress => self.unmatched_progress += 1,
            DropReason::StaleAck => self.stale_acks += 1,
            DropReason::Unaddressable | DropReason::NoTransfer => {}
        }
        increment_counter!(
            "terminoda_events_dropped",
            "kind" => kind,
            "reason" => reason.as_str()
        );
    }

    pub fn record_stale_completion(&mut self) {
        self.stale_completions += 1;
        increment_counter!("terminoda_stale_completions");
    }

    pub fn record_session_opened(&mut self) {
        self.sessions_opened += 1;
        increment_counter!("terminoda_sessions_opened");
    }

    pub fn record_session_closed(&mut self) {
        self.sessions_closed += 1;
        increment_counter!("terminoda_sessions_closed");
    }

    pub fn record_transfer_started(&mut self) {
        self.transfers_started += 1;
        increment_counter!("terminoda_transfers", "outcome" => "started");
    }

    pub fn record_transfer_finished(&mut self, success: bool) {
        if success {
            self.transfers_completed += 1;
            increment_counter!("terminoda_transfers", "outcome" => "completed");
        } else {
            self.transfers_failed += 1;
            increment_counter!("terminoda_transfers", "outcome" => "failed");
        }
    }

    pub fn record_transfer_cancelled(&mut self) {
        self.transfers_cancelled += 1;
        increment_counter!("terminoda_transfers", "outcome" => "cancelled");
    }

    pub fn record_command(&mut self) {
        self.commands_processed += 1;
    }

    pub fn record_error(&mut self) {
        self.errors_encountered += 1;
        increment_counter!("terminoda_errors");
    }

    /// Seconds since the stats were created
    pub fn uptime_secs(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        now.saturating_sub(self.start_time) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reasons_feed_specific_counters() {
        let mut stats = MultiplexerStats::new();
        stats.record_dropped("transfer_progress", DropReason::UnmatchedProgress);
        stats.record_dropped("resize_ack", DropReason::StaleAck);
        stats.record_dropped("output", DropReason::Unaddressable);

        assert_eq!(stats.events_dropped, 3);
        assert_eq!(stats.unmatched_progress, 1);
        assert_eq!(stats.stale_acks, 1);
    }

    #[test]
    fn transfer_outcomes_are_counted() {
        let mut stats = MultiplexerStats::new();
        stats.record_transfer_started();
        stats.record_transfer_finished(true);
        stats.record_transfer_started();
        stats.record_transfer_finished(false);
        stats.record_transfer_cancelled();

        assert_eq!(stats.transfers_started, 2);
        assert_eq!(stats.transfers_completed, 1);
        assert_eq!(stats.transfers_failed, 1);
        assert_eq!(stats.transfers_cancelled, 1);
    }

    #[test]
    fn new_stats_have_start_time() {
        let stats = MultiplexerStats::new();
        assert!(stats.start_time > 0);
        assert_eq!(stats.events_routed, 0);
    }
}
