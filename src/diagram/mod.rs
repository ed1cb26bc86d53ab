//! External diagram renderers
//!
//! Diagram sources are turned into SVG markup by engines that live outside
//! this crate. Each engine sits behind the [`DiagramRenderer`] trait so the
//! markdown pipeline never needs to know whether it talks to a child process,
//! a long-running service, or an in-process library provided by the host.
//!
//! # Architecture
//!
//! - `process.rs` - Piped child process runner with timeout and kill-on-drop
//! - `plantuml.rs` - PlantUML through `java -jar plantuml.jar -pipe`
//! - `mermaid.rs` - Mermaid through the `mmdc` command line tool

mod mermaid;
mod plantuml;
mod process;

pub use mermaid::MermaidCli;
pub use plantuml::PlantUmlProcess;

use futures::future::BoxFuture;

use crate::error::Result;

/// Renders one diagram source to markup.
pub trait DiagramRenderer: Send + Sync {
    /// Diagram language handled by this renderer, used in error messages.
    fn language(&self) -> &'static str;

    /// Render `source` to SVG markup.
    ///
    /// `target_id` is a document-unique identifier for the rendered element;
    /// renderers that emit element ids should use it.
    fn render<'a>(&'a self, target_id: &'a str, source: &'a str) -> BoxFuture<'a, Result<String>>;
}
