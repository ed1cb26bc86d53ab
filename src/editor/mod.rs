//! Editor module for mdpane
//!
//! This module contains the in-document find/replace engine and the bridge
//! it uses to drive the host's editable text surface.

mod find_replace;
mod scroll;

pub use find_replace::{
    find_all_matches, find_matches, Direction, FindState, FindStatus, Match, MatchReport,
    ReplaceOutcome, SearchOptions,
};
pub use scroll::{scroll_to_offset, EditorSurface, TextMetrics};
