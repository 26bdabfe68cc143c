use crate::RowRecord;

/// Lower bound on the flush interval; anything tighter would flush more
/// often than a 60 Hz frame and defeat coalescing.
pub const MIN_FLUSH_INTERVAL_MS: u64 = 16;

/// Default flush interval for live updates.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

/// Buffers a stream of incoming records so they hit the row model as
/// periodic bulk transactions instead of per-record pipeline reruns.
///
/// The batcher owns only the pending buffer and the interval; the owning
/// grid arms the flush deadline on its scheduler when [`push`](Self::push)
/// reports the buffer went non-empty, and drains the buffer into one
/// transaction when the deadline fires.
#[derive(Clone, Debug)]
pub struct UpdateBatcher {
    pending: Vec<RowRecord>,
    interval_ms: u64,
}

impl Default for UpdateBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL_MS)
    }
}

impl UpdateBatcher {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            pending: Vec::new(),
            interval_ms: interval_ms.max(MIN_FLUSH_INTERVAL_MS),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms.max(MIN_FLUSH_INTERVAL_MS);
    }

    /// Queues one incoming record. Returns `true` when this push made the
    /// buffer non-empty, i.e. when a flush should be armed.
    pub fn push(&mut self, record: RowRecord) -> bool {
        self.pending.push(record);
        let armed = self.pending.len() == 1;
        gtrace!(pending = self.pending.len(), "batch push");
        armed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drains the buffer for one bulk transaction.
    pub fn drain(&mut self) -> Vec<RowRecord> {
        core::mem::take(&mut self.pending)
    }
}
