//! Read-position bookkeeping behind the end-of-stream heuristics.

use crate::constants::ZERO_READ_THRESHOLD;
use crate::io::StreamPosition;

/// Result of the end-of-stream check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EofState {
    Reached,
    NotReached,
    Undetermined,
}

#[derive(Debug, Default)]
pub(crate) struct PositionTrackers {
    /// Set after a seek on compressed input, cleared by the next parse.
    pub is_discontinuous: bool,
    pub contiguous_zero_reads: u32,
    /// Sticky once a read fails.
    pub is_read_failed: bool,
}

impl PositionTrackers {
    pub fn record_read(&mut self, bytes: usize) {
        if bytes == 0 {
            self.contiguous_zero_reads = self.contiguous_zero_reads.saturating_add(1);
        } else {
            self.contiguous_zero_reads = 0;
        }
    }

    pub fn zero_reads_exhausted(&self) -> bool {
        self.contiguous_zero_reads >= ZERO_READ_THRESHOLD
    }

    /// Combines the three signals, in order: a known length, a failed read,
    /// and a run of empty reads.
    pub fn eof(&self, position: Option<StreamPosition>) -> EofState {
        if let Some(StreamPosition {
            position,
            length: Some(length),
        }) = position
        {
            return if position >= length {
                EofState::Reached
            } else {
                EofState::NotReached
            };
        }
        if self.is_read_failed || self.zero_reads_exhausted() {
            return EofState::Reached;
        }
        EofState::Undetermined
    }
}
