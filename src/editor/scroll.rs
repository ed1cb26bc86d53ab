//! Mid-viewport scrolling for the find/replace host bridge.
//!
//! The host owns the editable text surface. The engine only needs to read and
//! move its selection, read and move its scroll offset, and measure how tall
//! a prefix of the text renders in the editor's font.

/// An editable text surface the find/replace engine can drive.
///
/// Offsets are byte offsets into the text snapshot the engine searched;
/// heights are in the host's vertical units (pixels for most hosts).
pub trait EditorSurface {
    /// Current selection as `(start, end)`; a bare caret has `start == end`.
    fn selection(&self) -> (usize, usize);

    fn set_selection(&mut self, start: usize, end: usize);

    fn scroll_top(&self) -> f32;

    fn set_scroll_top(&mut self, top: f32);

    /// Height of the visible area.
    fn viewport_height(&self) -> f32;

    /// Total rendered height of the text.
    fn content_height(&self) -> f32;

    /// Rendered height of `prefix` laid out with the editor's font metrics.
    fn text_height(&self, prefix: &str) -> f32;
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Monospace layout metrics: a fixed number of columns per visual row and a
/// fixed row height. Long lines soft-wrap at `columns`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub columns: usize,
    pub line_height: f32,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            columns: 80,
            line_height: 20.0,
        }
    }
}

impl TextMetrics {
    pub fn new(columns: usize, line_height: f32) -> Self {
        Self {
            columns: columns.max(1),
            line_height,
        }
    }

    /// Number of visual rows `text` occupies. Empty text occupies none.
    pub fn visual_rows(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let columns = self.columns.max(1);
        text.split('\n')
            .map(|line| line.chars().count().div_ceil(columns).max(1))
            .sum()
    }

    /// Rendered height of `text`.
    pub fn height(&self, text: &str) -> f32 {
        self.visual_rows(text) as f32 * self.line_height
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scrolling
// ─────────────────────────────────────────────────────────────────────────────

/// Largest char boundary of `text` at or below `offset`.
fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Scroll `surface` so that `offset` sits at the vertical middle of the viewport.
///
/// The scroll position is clamped to the scrollable range. Returns the new
/// scroll offset.
pub fn scroll_to_offset(surface: &mut dyn EditorSurface, text: &str, offset: usize) -> f32 {
    let prefix = &text[..floor_char_boundary(text, offset)];
    let viewport = surface.viewport_height();
    let max_top = (surface.content_height() - viewport).max(0.0);

    let top = (surface.text_height(prefix) - viewport / 2.0).clamp(0.0, max_top);
    surface.set_scroll_top(top);
    top
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
