//! Markdown rendering pipeline
//!
//! Markdown text goes through three stages:
//! - tokenize: registered extensions claim spans first, then comrak parses
//!   the rest into a [`Token`] tree
//! - resolve: every extension token is resolved concurrently (math escaping,
//!   diagram rendering) behind a single join barrier
//! - serialize: the tree is written out as HTML, each token by the extension
//!   that owns it or by the built-in grammar
//!
//! # Example
//! ```ignore
//! use mdpane::markdown::{MarkdownOptions, Pipeline, DiagramBackends};
//!
//! let pipeline = Pipeline::with_backends(MarkdownOptions::default(), DiagramBackends::default());
//! let html = pipeline.render("Energy: $E=mc^2$").await?;
//! ```

mod diagram;
mod extension;
mod lexer;
mod math;
mod parser;
mod pipeline;
mod renderer;
mod token;

pub use diagram::DiagramBlock;
pub use extension::{Extension, Level};
pub use lexer::Lexer;
pub use math::{math_html, BlockMath, InlineMath};
pub use parser::{BuiltinGrammar, MarkdownOptions, BUILTIN};
pub use pipeline::{DiagramBackends, Pipeline};
pub use renderer::{escape_attr, escape_text, safe_url, slugify, Renderer};
pub use token::{
    Alignment, Token, TokenKind, BLOCK_MATH, DIAGRAM_MERMAID, DIAGRAM_PLANTUML, INLINE_MATH,
};
