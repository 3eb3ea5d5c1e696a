//! Terminal geometry negotiation
//!
//! Every resize request gets a per-session stamp. The displayed geometry is
//! updated optimistically on request; an acknowledgement is adopted only if its
//! stamp is not older than the newest request (last-write-wins).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{SessionId, SessionRegistry};

/// Font cell metrics used to turn a pixel area into rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminalMetrics {
    pub cell_width: f32,
    pub cell_height: f32,
    /// Inner padding applied on each side of the pane, in pixels
    pub padding: f32,
}

impl Default for TerminalMetrics {
    fn default() -> Self {
        Self {
            cell_width: 9.0,
            cell_height: 18.0,
            padding: 4.0,
        }
    }
}

impl TerminalMetrics {
    /// Columns and rows that fit in the pane, at least 1x1
    pub fn grid_for(&self, pixel_width: u32, pixel_height: u32) -> (u16, u16) {
        let usable_w = (pixel_width as f32 - 2.0 * self.padding).max(0.0);
        let usable_h = (pixel_height as f32 - 2.0 * self.padding).max(0.0);
        let cols = (usable_w / self.cell_width.max(1.0)).floor();
        let rows = (usable_h / self.cell_height.max(1.0)).floor();
        (clamp_dim(cols), clamp_dim(rows))
    }
}

fn clamp_dim(value: f32) -> u16 {
    value.clamp(1.0, u16::MAX as f32) as u16
}

/// Geometry bookkeeping for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeState {
    pub cols: u16,
    pub rows: u16,
    /// Highest stamp issued so far
    pub pending_request_id: u64,
    /// Stamp of the acknowledgement currently reflected in `cols`/`rows`
    pub acknowledged_stamp: Option<u64>,
    pub metrics: TerminalMetrics,
    /// Last pane size given to `fit`
    pub pixel_area: Option<(u32, u32)>,
}

/// A resize that must be sent to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub cols: u16,
    pub rows: u16,
    pub stamp: u64,
}

/// Outcome of an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Adopted,
    Stale,
    NoTarget,
}

pub struct ResizeNegotiator {
    states: HashMap<SessionId, ResizeState>,
    default_size: (u16, u16),
    default_metrics: TerminalMetrics,
}

impl ResizeNegotiator {
    pub fn new(default_cols: u16, default_rows: u16, metrics: TerminalMetrics) -> Self {
        Self {
            states: HashMap::new(),
            default_size: (default_cols.max(1), default_rows.max(1)),
            default_metrics: metrics,
        }
    }

    pub fn allocate(&mut self, id: &SessionId) {
        let (cols, rows) = self.default_size;
        let metrics = self.default_metrics;
        self.states.entry(id.clone()).or_insert(ResizeState {
            cols,
            rows,
            pending_request_id: 0,
            acknowledged_stamp: None,
            metrics,
            pixel_area: None,
        });
    }

    pub fn release(&mut self, id: &SessionId) {
        self.states.remove(id);
    }

    /// Issue a new stamp and show the requested geometry immediately
    pub fn request_resize(&mut self, id: &SessionId, cols: u16, rows: u16) -> Option<ResizeRequest> {
        let state = self.states.get_mut(id)?;
        state.pending_request_id += 1;
        state.cols = cols.max(1);
        state.rows = rows.max(1);
        debug!(
            "Resize #{} for session {}: {}x{}",
            state.pending_request_id, id, state.cols, state.rows
        );
        Some(ResizeRequest {
            cols: state.cols,
            rows: state.rows,
            stamp: state.pending_request_id,
        })
    }

    /// Reconcile a backend acknowledgement
    pub fn on_resize_ack(
        &mut self,
        registry: &SessionRegistry,
        id: &SessionId,
        cols: u16,
        rows: u16,
        stamp: u64,
    ) -> AckOutcome {
        if !registry.is_addressable(id) {
            return AckOutcome::NoTarget;
        }
        let Some(state) = self.states.get_mut(id) else {
            return AckOutcome::NoTarget;
        };
        if stamp < state.pending_request_id {
            debug!(
                "Discarding stale resize ack #{} for session {} (latest #{})",
                stamp, id, state.pending_request_id
            );
            return AckOutcome::Stale;
        }

        state.cols = cols;
        state.rows = rows;
        state.acknowledged_stamp = Some(stamp);
        AckOutcome::Adopted
    }

    /// Recompute geometry for a pane size; `None` when nothing changed
    pub fn fit(&mut self, id: &SessionId, pixel_width: u32, pixel_height: u32) -> Option<ResizeRequest> {
        let state = self.states.get_mut(id)?;
        state.pixel_area = Some((pixel_width, pixel_height));
        let (cols, rows) = state.metrics.grid_for(pixel_width, pixel_height);
        if (cols, rows) == (state.cols, state.rows) {
            return None;
        }
        self.request_resize(id, cols, rows)
    }

    /// Swap the session's cell metrics and refit against the last pane size
    pub fn reconfigure(&mut self, id: &SessionId, metrics: TerminalMetrics) -> Option<ResizeRequest> {
        let state = self.states.get_mut(id)?;
        state.metrics = metrics;
        let (width, height) = state.pixel_area?;
        self.fit(id, width, height)
    }

    /// Metrics applied to sessions allocated from now on
    pub fn set_default_metrics(&mut self, metrics: TerminalMetrics) {
        self.default_metrics = metrics;
    }

    pub fn default_metrics(&self) -> TerminalMetrics {
        self.default_metrics
    }

    pub fn geometry(&self, id: &SessionId) -> Option<(u16, u16)> {
        self.states.get(id).map(|s| (s.cols, s.rows))
    }

    pub fn state(&self, id: &SessionId) -> Option<&ResizeState> {
        self.states.get(id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.states.keys().cloned().collect()
    }
}

impl Default for ResizeNegotiator {
    fn default() -> Self {
        Self::new(80, 24, TerminalMetrics::default())
    }
}
