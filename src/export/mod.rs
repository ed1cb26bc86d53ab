//! Document Export Module for mdpane
//!
//! Rendered preview HTML can be saved as a standalone HTML file with the
//! stylesheet inlined.

pub mod html;

pub use html::{generate_html_document, title_from_path, write_html_file};
