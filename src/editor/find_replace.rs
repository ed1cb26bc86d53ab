//! Find and Replace for mdpane
//!
//! This module provides the search side of the editor pane:
//! - Match computation over a text snapshot (literal or regex queries)
//! - A per-document match cursor that survives between calls
//! - Caret-relative navigation with mid-viewport scrolling
//! - Replace and Replace All with cursor bookkeeping on the new text
//!
//! All offsets are byte offsets into the UTF-8 text the caller passes in.

use log::debug;
use regex::{Regex, RegexBuilder};

use super::scroll::{scroll_to_offset, EditorSurface};
use crate::config::SearchSettings;

// ─────────────────────────────────────────────────────────────────────────────
// Matches
// ─────────────────────────────────────────────────────────────────────────────

/// A non-empty span of the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Byte offset of the first matched byte
    pub index: usize,
    /// Length in bytes
    pub length: usize,
}

impl Match {
    pub fn end(&self) -> usize {
        self.index + self.length
    }
}

/// Matching options beyond the query itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

/// Compile `query` into the regex that implements `options`.
///
/// Returns `None` for an empty query or an invalid pattern.
fn build_regex(query: &str, options: SearchOptions) -> Option<Regex> {
    if query.is_empty() {
        return None;
    }

    let pattern = if options.use_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    let pattern = if options.whole_word {
        format!(r"\b(?:{})\b", pattern)
    } else {
        pattern
    };

    match RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            debug!("Invalid search pattern '{}': {}", query, e);
            None
        }
    }
}

/// Find every match of `query` in `text` under `options`.
///
/// Matches are non-overlapping and ordered left to right. Zero-length regex
/// matches are skipped.
pub fn find_matches(text: &str, query: &str, options: SearchOptions) -> Vec<Match> {
    let Some(re) = build_regex(query, options) else {
        return Vec::new();
    };

    re.find_iter(text)
        .filter(|m| !m.is_empty())
        .map(|m| Match {
            index: m.start(),
            length: m.len(),
        })
        .collect()
}

/// Case-insensitive matches of `query` in `text`.
///
/// With `is_regex` false the query is matched literally.
pub fn find_all_matches(text: &str, query: &str, is_regex: bool) -> Vec<Match> {
    find_matches(
        text,
        query,
        SearchOptions {
            use_regex: is_regex,
            ..SearchOptions::default()
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Where the find state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStatus {
    /// No query has been run
    NoQuery,
    /// The last query found matches and the cursor can move
    HasMatches,
    /// The last query found nothing
    NoMatches,
}

/// Navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Match counter for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// 1-based index of the current match, 0 when there is none
    pub current_match_index: usize,
    pub total_matches: usize,
}

/// Result of a replace call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Text after substitution (unchanged when nothing matched)
    pub text: String,
    /// Number of substitutions made
    pub replaced: usize,
    /// Matches found before substituting
    pub total_matches: usize,
    /// Matches left in the new text
    pub remaining_matches: usize,
    /// 1-based index of the current match in the new text, 0 when there is none
    pub current_match_index: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Find State
// ─────────────────────────────────────────────────────────────────────────────

/// Find/replace state for one document.
///
/// The host keeps one of these per tab so that navigation and replacement
/// agree on the current match without the caller resending it.
#[derive(Debug, Clone, Default)]
pub struct FindState {
    /// Last query searched for
    pub query: String,
    /// Whether the query is a regular expression
    pub use_regex: bool,
    /// Whether search is case-sensitive
    pub case_sensitive: bool,
    /// Whether to match whole words only
    pub whole_word: bool,
    /// Matches of the last query, in text order
    matches: Vec<Match>,
    /// Current match; `None` until navigation picks one
    cursor: Option<usize>,
}

impl FindState {
    /// Create a new FindState.
    pub fn new() -> Self {
        Self::default()
    }

    /// A FindState with the persisted search preferences applied.
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            case_sensitive: settings.case_sensitive,
            whole_word: settings.whole_word,
            ..Self::default()
        }
    }

    fn options(&self) -> SearchOptions {
        SearchOptions {
            use_regex: self.use_regex,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
        }
    }

    pub fn status(&self) -> FindStatus {
        if self.query.is_empty() {
            FindStatus::NoQuery
        } else if self.matches.is_empty() {
            FindStatus::NoMatches
        } else {
            FindStatus::HasMatches
        }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The match under the cursor.
    pub fn current_match(&self) -> Option<Match> {
        self.cursor.and_then(|idx| self.matches.get(idx)).copied()
    }

    pub fn report(&self) -> MatchReport {
        MatchReport {
            current_match_index: self.cursor.map_or(0, |idx| idx + 1),
            total_matches: self.matches.len(),
        }
    }

    /// Forget the query and its matches.
    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.cursor = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a fresh search. The cursor is reset until navigation picks a match.
    pub fn search(&mut self, text: &str, query: &str, use_regex: bool) -> MatchReport {
        self.query = query.to_string();
        self.use_regex = use_regex;
        self.matches = find_matches(text, query, self.options());
        self.cursor = None;

        debug!(
            "Search '{}' (regex: {}) found {} match(es)",
            query,
            use_regex,
            self.matches.len()
        );
        self.report()
    }

    /// Move to the next match relative to the surface's selection, select it,
    /// and scroll it to the middle of the viewport.
    ///
    /// Forward picks the first match starting at or after the selection end;
    /// backward picks the last match ending before the selection start. Both
    /// wrap around. Returns `None` unless the last search found matches.
    pub fn navigate(
        &mut self,
        text: &str,
        direction: Direction,
        surface: &mut dyn EditorSurface,
    ) -> Option<MatchReport> {
        if self.status() != FindStatus::HasMatches {
            return None;
        }

        let (sel_start, sel_end) = surface.selection();
        let last = self.matches.len() - 1;
        let idx = match direction {
            Direction::Forward => self
                .matches
                .iter()
                .position(|m| m.index >= sel_end)
                .unwrap_or(0),
            Direction::Backward => self
                .matches
                .iter()
                .rposition(|m| m.end() < sel_start)
                .unwrap_or(last),
        };

        self.cursor = Some(idx);
        let target = self.matches[idx];
        surface.set_selection(target.index, target.end());
        scroll_to_offset(surface, text, target.index);

        Some(self.report())
    }

    /// Search for `query`, then navigate from the surface's selection.
    pub fn find(
        &mut self,
        text: &str,
        query: &str,
        use_regex: bool,
        direction: Direction,
        surface: &mut dyn EditorSurface,
    ) -> MatchReport {
        let searched = self.search(text, query, use_regex);
        self.navigate(text, direction, surface).unwrap_or(searched)
    }

    /// Advance the cursor to the next match, wrapping.
    ///
    /// Returns the new cursor, or None if there are no matches.
    pub fn next_match(&mut self) -> Option<usize> {
        if self.matches.is_empty() {
            return None;
        }
        let next = match self.cursor {
            Some(idx) => (idx + 1) % self.matches.len(),
            None => 0,
        };
        self.cursor = Some(next);
        Some(next)
    }

    /// Move the cursor to the previous match, wrapping.
    ///
    /// Returns the new cursor, or None if there are no matches.
    pub fn prev_match(&mut self) -> Option<usize> {
        if self.matches.is_empty() {
            return None;
        }
        let prev = match self.cursor {
            Some(0) | None => self.matches.len() - 1,
            Some(idx) => idx - 1,
        };
        self.cursor = Some(prev);
        Some(prev)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replace
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the current match of `find`, or every match when `replace_all`.
    ///
    /// Matches are recomputed on `text` first. `replacement` is inserted
    /// literally. Afterwards matches are recomputed on the new text and the
    /// cursor is clamped into their range.
    pub fn replace(
        &mut self,
        text: &str,
        find: &str,
        replacement: &str,
        use_regex: bool,
        replace_all: bool,
    ) -> ReplaceOutcome {
        self.query = find.to_string();
        self.use_regex = use_regex;
        let options = self.options();

        let found = find_matches(text, find, options);
        let total_matches = found.len();

        let (new_text, replaced) = if found.is_empty() {
            (text.to_string(), 0)
        } else if replace_all {
            (substitute(text, &found, replacement), found.len())
        } else {
            let idx = self.cursor.unwrap_or(0).min(found.len() - 1);
            (substitute(text, &found[idx..=idx], replacement), 1)
        };

        let previous = self.cursor.unwrap_or(0);
        self.matches = find_matches(&new_text, find, options);
        self.cursor = if self.matches.is_empty() {
            None
        } else {
            Some(previous.min(self.matches.len() - 1))
        };

        debug!(
            "Replaced {} of {} match(es) of '{}', {} remaining",
            replaced,
            total_matches,
            find,
            self.matches.len()
        );

        let report = self.report();
        ReplaceOutcome {
            text: new_text,
            replaced,
            total_matches,
            remaining_matches: report.total_matches,
            current_match_index: report.current_match_index,
        }
    }
}

/// Splice `replacement` over each span, using offsets into the original `text`.
fn substitute(text: &str, spans: &[Match], replacement: &str) -> String {
    let mut new_text = String::with_capacity(text.len());
    let mut last_end = 0;

    for span in spans {
        new_text.push_str(&text[last_end..span.index]);
        new_text.push_str(replacement);
        last_end = span.end();
    }

    new_text.push_str(&text[last_end..]);
    new_text
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
