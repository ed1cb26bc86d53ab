//! Live preview module for mdpane
//!
//! This module turns a stream of edits into preview HTML: renders are
//! debounced, only the latest text is ever shown, and a failed render keeps
//! the last good output on screen.

mod scheduler;

pub use scheduler::{PreviewState, PreviewUpdate, RenderScheduler};
