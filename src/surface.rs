/// RGBA color, 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Axis-aligned rectangle in logical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectPx {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RectPx {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersection with another rect; empty rect when disjoint.
    pub fn clipped_to(&self, clip: &RectPx) -> RectPx {
        let x = self.x.max(clip.x);
        let y = self.y.max(clip.y);
        let right = self.right().min(clip.right());
        let bottom = self.bottom().min(clip.bottom());
        RectPx {
            x,
            y,
            w: (right - x).max(0.0),
            h: (bottom - y).max(0.0),
        }
    }
}

/// An immediate-mode 2D raster drawing surface supplied by the host.
///
/// The renderer owns nothing here: the host hands a surface into each paint
/// pass. Coordinates are logical pixels; `scale` reports the device pixel
/// ratio for hosts that rasterize at higher density.
pub trait Surface {
    /// Logical (width, height). A zero-sized surface skips the paint pass.
    fn size(&self) -> (f32, f32);

    fn scale(&self) -> f32 {
        1.0
    }

    fn fill_rect(&mut self, rect: RectPx, color: Color);

    /// Draws `text` with its left edge at `x` and baseline-ish anchor at `y`.
    fn draw_text(&mut self, x: f32, y: f32, text: &str, color: Color);

    /// Measured advance width of `text` in logical pixels.
    fn measure_text(&self, text: &str) -> f32;

    /// Polyline through `points`, used by the mini-chart cell strategy.
    fn draw_polyline(&mut self, points: &[(f32, f32)], color: Color);

    /// Copies previously painted pixels from `src` by `(dx, dy)`. Backs the
    /// scroll blit fast path.
    fn copy_area(&mut self, src: RectPx, dx: f32, dy: f32);
}
