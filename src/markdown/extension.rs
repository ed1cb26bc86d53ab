//! The pluggable extension interface.
//!
//! An extension is a tokenizer, renderer and resolver for one markdown
//! construct. The pipeline holds an ordered list of extensions and tries them
//! before falling back to the built-in grammar, which implements the same
//! trait.

use futures::future::{self, BoxFuture, FutureExt};

use super::renderer::Renderer;
use super::token::Token;
use crate::error::Result;

/// Where an extension is tried by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Tried at the start of every line outside fenced code
    Block,
    /// Tried at positions reported by [`Extension::start`] inside running text
    Inline,
}

/// A tokenizer + renderer + resolver triple for one markdown construct.
pub trait Extension: Send + Sync {
    /// Unique name; also the name carried by the tokens this extension produces.
    fn name(&self) -> &'static str;

    fn level(&self) -> Level;

    /// Byte offset of the earliest position in `src` where [`tokenize`](Self::tokenize)
    /// could match, or `None` if it cannot match anywhere in `src`.
    fn start(&self, src: &str) -> Option<usize> {
        if src.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    /// Try to match at the very start of `src`.
    ///
    /// The returned token's `raw` must be a non-empty prefix of `src`.
    fn tokenize(&self, src: &str) -> Option<Token>;

    /// Serialize a resolved token. `None` falls back to the token's resolved HTML.
    fn render(&self, token: &Token, _renderer: &Renderer<'_>) -> Option<String> {
        token.resolved_html.clone()
    }

    /// Fill in `token.resolved_html`.
    ///
    /// `ordinal` is the index of this token among all tokens of the same
    /// extension in the document, in depth-first order.
    fn resolve<'a>(&'a self, token: &'a mut Token, ordinal: usize) -> BoxFuture<'a, Result<()>>;
}

/// Resolve future for extensions whose work is purely local.
pub(crate) fn resolved_locally(token: &mut Token, html: String) -> BoxFuture<'static, Result<()>> {
    token.resolved_html = Some(html);
    future::ready(Ok(())).boxed()
}
