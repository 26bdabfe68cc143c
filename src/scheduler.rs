//! Deferred execution primitives.
//!
//! Everything in the core is synchronous; the only asynchrony is deferred
//! scheduling, driven by the host's clock (`now_ms`) exactly like scroll
//! debouncing. Two primitives exist:
//!
//! - a coalesced paint request: any number of invalidations between two
//!   display refreshes collapse into at most one pending paint;
//! - a delayed flush deadline: a single pending timer, replaced (not
//!   stacked) on rescheduling and cancellable.

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameScheduler {
    paint_pending: bool,
    flush_at: Option<u64>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a paint on the next frame. Idempotent between frames.
    pub fn request_paint(&mut self) {
        self.paint_pending = true;
    }

    pub fn paint_pending(&self) -> bool {
        self.paint_pending
    }

    /// Consumes the pending paint request, if any.
    pub fn take_paint(&mut self) -> bool {
        core::mem::take(&mut self.paint_pending)
    }

    /// Arms (or re-arms) the flush deadline. A pending deadline is replaced.
    pub fn schedule_flush(&mut self, at_ms: u64) {
        self.flush_at = Some(at_ms);
    }

    pub fn flush_scheduled(&self) -> bool {
        self.flush_at.is_some()
    }

    pub fn cancel_flush(&mut self) {
        self.flush_at = None;
    }

    /// Consumes the deadline when it has elapsed.
    pub fn take_due_flush(&mut self, now_ms: u64) -> bool {
        match self.flush_at {
            Some(at) if now_ms >= at => {
                self.flush_at = None;
                true
            }
            _ => false,
        }
    }
}
