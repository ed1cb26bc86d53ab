//! Debounced live-preview rendering.
//!
//! Every edit submits the current text. A submission waits out the debounce
//! delay and renders only if no newer submission arrived in the meantime. A
//! render that finishes after a newer submission is dropped, so the preview
//! only ever shows the latest text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::config::PreviewSettings;
use crate::error::Error;
use crate::markdown::Pipeline;

/// Outcome of one submission.
#[derive(Debug)]
pub enum PreviewUpdate {
    /// Fresh HTML for the latest text
    Rendered(String),
    /// A newer submission (or a cancel) overtook this one
    Superseded,
    /// The latest text failed to render
    Failed(Error),
}

/// Debounces preview renders for one document.
pub struct RenderScheduler {
    pipeline: Arc<Pipeline>,
    delay: Duration,
    generation: AtomicU64,
}

impl RenderScheduler {
    pub fn new(pipeline: Arc<Pipeline>, delay: Duration) -> Self {
        Self {
            pipeline,
            delay,
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_settings(pipeline: Arc<Pipeline>, settings: &PreviewSettings) -> Self {
        Self::new(pipeline, settings.debounce())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Submit the document's current text for rendering.
    pub async fn submit(&self, markdown: &str) -> PreviewUpdate {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !self.is_current(ticket) {
            debug!("Preview submission {} superseded before rendering", ticket);
            return PreviewUpdate::Superseded;
        }

        let result = self.pipeline.render(markdown).await;
        if !self.is_current(ticket) {
            debug!("Preview submission {} finished stale, dropping it", ticket);
            return PreviewUpdate::Superseded;
        }

        match result {
            Ok(html) => PreviewUpdate::Rendered(html),
            Err(err) => PreviewUpdate::Failed(err),
        }
    }

    /// Supersede every submission still waiting or rendering.
    ///
    /// In-flight diagram calls are not interrupted; their results are dropped.
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preview State
// ─────────────────────────────────────────────────────────────────────────────

/// What the preview pane shows for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewState {
    /// Last successfully rendered HTML
    pub html: String,
    /// Whether `html` lags behind the text because the latest render failed
    pub stale: bool,
    /// Message of the failure that made the preview stale
    pub last_error: Option<String>,
}

impl PreviewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a scheduler update into the preview. Returns whether anything changed.
    ///
    /// A failure keeps the previous HTML on screen.
    pub fn apply(&mut self, update: PreviewUpdate) -> bool {
        match update {
            PreviewUpdate::Rendered(html) => {
                let changed = self.html != html || self.stale;
                self.html = html;
                self.stale = false;
                self.last_error = None;
                changed
            }
            PreviewUpdate::Failed(err) => {
                warn!("Preview render failed, keeping previous output: {}", err);
                self.stale = true;
                self.last_error = Some(err.to_string());
                true
            }
            PreviewUpdate::Superseded => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
