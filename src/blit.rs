//! Scroll blit evaluation: decides whether the previous frame's pixels can
//! be translated instead of repainting the whole visible band.

/// Outcome of evaluating a scroll delta against the previous painted frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlitPlan {
    /// Shift the surviving band by `dy` logical pixels (negative = content
    /// moved up) and repaint only the exposed strip of height `exposed_h`.
    /// The strip sits at the top when scrolling up, at the bottom otherwise.
    Reuse { dy: f32, exposed_h: f32 },
    /// No reuse possible; clear and repaint the visible band.
    Repaint,
}

/// A blit is worthwhile only for a pure vertical scroll smaller than the
/// viewport, with untouched horizontal offset and no other pending damage
/// (the caller checks damage; this checks geometry).
pub(crate) fn evaluate(scroll_dx: f32, scroll_dy: i64, viewport_h: f32) -> BlitPlan {
    if scroll_dx != 0.0 || scroll_dy == 0 {
        return BlitPlan::Repaint;
    }
    let magnitude = scroll_dy.unsigned_abs() as f32;
    if magnitude >= viewport_h || viewport_h <= 0.0 {
        return BlitPlan::Repaint;
    }
    // Content moves opposite to the scroll delta.
    BlitPlan::Reuse {
        dy: -(scroll_dy as f32),
        exposed_h: magnitude,
    }
}
