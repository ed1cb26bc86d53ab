//! mdpane - markdown preview core
//!
//! Renders markdown to sanitized HTML with math spans and PlantUML/Mermaid
//! diagrams resolved through external engines, and provides the per-document
//! find/replace engine of the editor pane.

pub mod config;
pub mod diagram;
pub mod editor;
pub mod error;
pub mod export;
pub mod markdown;
pub mod preview;

pub use error::{Error, Result};
