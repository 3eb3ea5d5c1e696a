//! Output buffer management
//!
//! One [`OutputBuffer`] plus search state per addressable session. Chunks for
//! sessions the registry does not consider addressable are dropped.

pub mod buffer;
pub mod search;

use std::collections::HashMap;

use tracing::debug;

use crate::session::{SessionId, SessionRegistry};

pub use buffer::{BufferLimits, BufferStats, OutputBuffer};
pub use search::{MatchLocation, SearchDirection, SearchOptions, SearchState};

struct SessionOutput {
    buffer: OutputBuffer,
    search: SearchState,
}

/// Owns the output buffers of all live sessions
pub struct OutputBufferManager {
    buffers: HashMap<SessionId, SessionOutput>,
    limits: BufferLimits,
}

impl OutputBufferManager {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            buffers: HashMap::new(),
            limits,
        }
    }

    pub fn allocate(&mut self, id: &SessionId) {
        self.buffers
            .entry(id.clone())
            .or_insert_with(|| SessionOutput {
                buffer: OutputBuffer::new(self.limits),
                search: SearchState::default(),
            });
    }

    pub fn release(&mut self, id: &SessionId) {
        if self.buffers.remove(id).is_some() {
            debug!("Released output buffer for session {}", id);
        }
    }

    /// Append a chunk; returns false when the chunk was dropped
    pub fn on_output(&mut self, registry: &SessionRegistry, id: &SessionId, bytes: &[u8]) -> bool {
        if !registry.is_addressable(id) {
            debug!("Dropping {} output bytes for session {}", bytes.len(), id);
            return false;
        }
        match self.buffers.get_mut(id) {
            Some(output) => {
                output.buffer.append(bytes);
                true
            }
            None => false,
        }
    }

    /// Move the search highlight; `None` for released sessions or no match
    pub fn search(
        &mut self,
        id: &SessionId,
        query: &str,
        direction: SearchDirection,
        options: SearchOptions,
    ) -> Option<MatchLocation> {
        let output = self.buffers.get_mut(id)?;
        let lines = if query.is_empty() {
            Vec::new()
        } else {
            output.buffer.lines()
        };
        output
            .search
            .find(&lines, output.buffer.first_line(), query, direction, options)
    }

    pub fn highlight(&self, id: &SessionId) -> Option<MatchLocation> {
        self.buffers.get(id).and_then(|o| o.search.highlight())
    }

    /// Rendered text of one retained line by absolute index
    pub fn line(&self, id: &SessionId, absolute: u64) -> Option<String> {
        let output = self.buffers.get(id)?;
        let offset = absolute.checked_sub(output.buffer.first_line())?;
        output.buffer.lines().into_iter().nth(offset as usize)
    }

    pub fn rendered_text(&self, id: &SessionId) -> Option<String> {
        self.buffers.get(id).map(|o| o.buffer.rendered_text())
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<Vec<u8>> {
        self.buffers.get(id).map(|o| o.buffer.snapshot())
    }

    /// Clear scrollback and the highlight; the write cursor is kept
    pub fn clear(&mut self, id: &SessionId) -> bool {
        match self.buffers.get_mut(id) {
            Some(output) => {
                output.buffer.clear();
                output.search.clear();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self, id: &SessionId) -> Option<BufferStats> {
        self.buffers.get(id).map(|o| o.buffer.stats())
    }

    /// Apply new limits to every buffer and to future allocations
    pub fn set_limits(&mut self, limits: BufferLimits) {
        self.limits = limits;
        for output in self.buffers.values_mut() {
            output.buffer.set_limits(limits);
        }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for OutputBufferManager {
    fn default() -> Self {
        Self::new(BufferLimits::default())
    }
}
