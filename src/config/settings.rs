//! User settings for mdpane
//!
//! This module defines the `Settings` struct that holds all user-configurable
//! options, with serde support for JSON persistence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use crate::markdown::MarkdownOptions;

// ─────────────────────────────────────────────────────────────────────────────
// Diagram Engines
// ─────────────────────────────────────────────────────────────────────────────

/// How to run PlantUML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantUmlSettings {
    /// Java executable used to run the jar
    pub java_path: String,
    /// Location of `plantuml.jar`; PlantUML fences stay code blocks without it
    pub jar_path: Option<PathBuf>,
    /// Per-diagram render budget in milliseconds
    pub timeout_ms: u64,
}

impl Default for PlantUmlSettings {
    fn default() -> Self {
        Self {
            java_path: String::from("java"),
            jar_path: None,
            timeout_ms: 10_000,
        }
    }
}

/// How to run Mermaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MermaidSettings {
    /// mermaid-cli executable
    pub command: String,
    /// Prefix for rendered diagram element ids (`{prefix}-{n}`)
    pub id_prefix: String,
    /// Per-diagram render budget in milliseconds
    pub timeout_ms: u64,
}

impl Default for MermaidSettings {
    fn default() -> Self {
        Self {
            command: String::from("mmdc"),
            id_prefix: String::from("mermaid"),
            timeout_ms: 10_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preview and Search
// ─────────────────────────────────────────────────────────────────────────────

/// Live preview behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Quiet period after the last edit before re-rendering
    pub debounce_ms: u64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

impl PreviewSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Default find options for new documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main Settings Struct
// ─────────────────────────────────────────────────────────────────────────────

/// User settings.
///
/// This struct is serialized to JSON and persisted to the user's config directory.
/// All fields have sensible defaults via the `Default` trait and `#[serde(default)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Markdown dialect and extension toggles
    pub markdown: MarkdownOptions,

    pub plantuml: PlantUmlSettings,

    pub mermaid: MermaidSettings,

    pub preview: PreviewSettings,

    pub search: SearchSettings,
}

impl Settings {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Constants and Sanitization
    // ─────────────────────────────────────────────────────────────────────────

    /// Minimum diagram render timeout.
    pub const MIN_TIMEOUT_MS: u64 = 100;
    /// Maximum diagram render timeout.
    pub const MAX_TIMEOUT_MS: u64 = 120_000;
    /// Maximum preview debounce.
    pub const MAX_DEBOUNCE_MS: u64 = 5_000;

    /// Sanitize settings by clamping values to valid ranges.
    ///
    /// This is useful after loading settings from a file that might have
    /// been manually edited with invalid values.
    pub fn sanitize(&mut self) {
        self.plantuml.timeout_ms = self
            .plantuml
            .timeout_ms
            .clamp(Self::MIN_TIMEOUT_MS, Self::MAX_TIMEOUT_MS);
        self.mermaid.timeout_ms = self
            .mermaid
            .timeout_ms
            .clamp(Self::MIN_TIMEOUT_MS, Self::MAX_TIMEOUT_MS);

        self.preview.debounce_ms = self.preview.debounce_ms.min(Self::MAX_DEBOUNCE_MS);

        if self.plantuml.java_path.trim().is_empty() {
            self.plantuml.java_path = PlantUmlSettings::default().java_path;
        }
        if self.mermaid.command.trim().is_empty() {
            self.mermaid.command = MermaidSettings::default().command;
        }

        // Ids must stay valid in HTML and CSS selectors
        let prefix: String = self
            .mermaid
            .id_prefix
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.mermaid.id_prefix = if prefix.is_empty() {
            MermaidSettings::default().id_prefix
        } else {
            prefix
        };
    }

    /// Load settings and sanitize them to ensure validity.
    ///
    /// This is a convenience method that deserializes and then sanitizes.
    pub fn from_json_sanitized(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
