//! Inline (`$...$`) and block (`$$...$$`) math extensions.
//!
//! Math is resolved locally: the raw span, delimiters included, is HTML-escaped
//! and any backtick code inside it is rewritten as a no-language code element.
//! Typesetting is left to a client-side math renderer in the preview.

use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;

use super::extension::{resolved_locally, Extension, Level};
use super::lexer::leading_spaces;
use super::renderer::{escape_text, Renderer};
use super::token::{Token, BLOCK_MATH, INLINE_MATH};
use crate::error::Result;

/// `$...$` inside a paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineMath;

/// `$$...$$` starting a line.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMath;

// ─────────────────────────────────────────────────────────────────────────────
// Inline Math
// ─────────────────────────────────────────────────────────────────────────────

impl Extension for InlineMath {
    fn name(&self) -> &'static str {
        INLINE_MATH
    }

    fn level(&self) -> Level {
        Level::Inline
    }

    fn start(&self, src: &str) -> Option<usize> {
        src.find('$')
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        let open = dollar_run(src);
        if open == 0 {
            return None;
        }

        let (close, close_len) = next_dollar_run(src, open)?;
        if close_len != open {
            return None;
        }

        let inner = src[open..close].trim();
        if inner.is_empty() {
            return None;
        }

        let raw = &src[..close + close_len];
        Some(Token::extension(INLINE_MATH, raw, inner))
    }

    fn resolve<'a>(&'a self, token: &'a mut Token, _ordinal: usize) -> BoxFuture<'a, Result<()>> {
        let html = math_html(&token.raw);
        resolved_locally(token, html)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block Math
// ─────────────────────────────────────────────────────────────────────────────

impl Extension for BlockMath {
    fn name(&self) -> &'static str {
        BLOCK_MATH
    }

    fn level(&self) -> Level {
        Level::Block
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        let indent = leading_spaces(src);
        if indent > 3 || !src[indent..].starts_with("$$") {
            return None;
        }

        let body_start = indent + 2;
        let close = find_unescaped(src, body_start, "$$")?;
        let after = close + 2;

        // Nothing but whitespace may follow the closing delimiter on its line.
        let line_end = src[after..]
            .find('\n')
            .map(|i| after + i)
            .unwrap_or(src.len());
        if !src[after..line_end].trim().is_empty() {
            return None;
        }

        let inner = src[body_start..close].trim();
        if inner.is_empty() {
            return None;
        }

        Some(Token::extension(BLOCK_MATH, &src[..line_end], inner))
    }

    fn render(&self, token: &Token, _renderer: &Renderer<'_>) -> Option<String> {
        token
            .resolved_html
            .as_ref()
            .map(|html| format!("<div class=\"math-block\">{}</div>\n", html))
    }

    fn resolve<'a>(&'a self, token: &'a mut Token, _ordinal: usize) -> BoxFuture<'a, Result<()>> {
        let html = math_html(token.raw.trim());
        resolved_locally(token, html)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanning Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn dollar_run(src: &str) -> usize {
    src.bytes().take_while(|b| *b == b'$').count()
}

/// Find the next unescaped `$`-run at or after `from`, without crossing a blank line.
///
/// Returns its offset and length.
fn next_dollar_run(src: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let mut idx = from;

    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'$' => return Some((idx, dollar_run(&src[idx..]))),
            b'\n' => {
                let rest = &src[idx + 1..];
                let next_line = rest.split('\n').next().unwrap_or("");
                if next_line.trim().is_empty() {
                    return None;
                }
                idx += 1;
            }
            _ => idx += 1,
        }
    }
    None
}

/// Offset of the next unescaped `needle` at or after `from`.
fn find_unescaped(src: &str, from: usize, needle: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut idx = from;

    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            idx += 2;
            continue;
        }
        if bytes[idx..].starts_with(needle.as_bytes()) {
            return Some(idx);
        }
        idx += 1;
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

fn backtick_code() -> Option<&'static Regex> {
    static BACKTICK_CODE: OnceLock<Option<Regex>> = OnceLock::new();
    BACKTICK_CODE
        .get_or_init(|| Regex::new(r"`([^`]+)`").ok())
        .as_ref()
}

/// Escape a raw math span and re-escape the backtick code it contains.
pub fn math_html(raw: &str) -> String {
    let escaped = escape_text(raw);
    match backtick_code() {
        Some(re) => re
            .replace_all(&escaped, "<code class=\"language-none\">$1</code>")
            .into_owned(),
        None => escaped,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ─────────────────────────────────────────────────────────────────────────
    // Inline
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_inline_simple() {
        let token = InlineMath.tokenize("$x+y$ rest").unwrap();
        assert_eq!(token.raw, "$x+y$");
        assert_eq!(token.extension_text(), Some("x+y"));
    }

    #[test]
    fn test_inline_trims_inner_text() {
        let token = InlineMath.tokenize("$ a $").unwrap();
        assert_eq!(token.extension_text(), Some("a"));
        assert_eq!(token.raw, "$ a $");
    }

    #[test]
    fn test_inline_double_dollar_run() {
        let token = InlineMath.tokenize("$$a$$ b").unwrap();
        assert_eq!(token.raw, "$$a$$");
    }

    #[test]
    fn test_inline_mismatched_run_is_no_match() {
        assert!(InlineMath.tokenize("$a$$ b").is_none());
    }

    #[test]
    fn test_inline_unterminated() {
        assert!(InlineMath.tokenize("$5 and more").is_none());
    }

    #[test]
    fn test_inline_empty_is_no_match() {
        assert!(InlineMath.tokenize("$ $").is_none());
        assert!(InlineMath.tokenize("$$").is_none());
    }

    #[test]
    fn test_inline_skips_escaped_dollar() {
        let token = InlineMath.tokenize(r"$a \$ b$").unwrap();
        assert_eq!(token.raw, r"$a \$ b$");
    }

    #[test]
    fn test_inline_does_not_cross_blank_line() {
        assert!(InlineMath.tokenize("$a\n\nb$").is_none());
        assert!(InlineMath.tokenize("$a\nb$").is_some());
    }

    #[test]
    fn test_inline_start() {
        assert_eq!(InlineMath.start("cost $x$"), Some(5));
        assert_eq!(InlineMath.start("none"), None);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Block
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_block_multiline() {
        let src = "$$\n\\sum_i x_i\n$$\nafter";
        let token = BlockMath.tokenize(src).unwrap();
        assert_eq!(token.raw, "$$\n\\sum_i x_i\n$$");
        assert_eq!(token.extension_text(), Some("\\sum_i x_i"));
    }

    #[test]
    fn test_block_single_line() {
        let token = BlockMath.tokenize("$$E=mc^2$$  \nnext").unwrap();
        assert_eq!(token.raw, "$$E=mc^2$$  ");
    }

    #[test]
    fn test_block_trailing_text_is_no_match() {
        assert!(BlockMath.tokenize("$$a$$ and more").is_none());
    }

    #[test]
    fn test_block_requires_line_start() {
        assert!(BlockMath.tokenize("    $$a$$").is_none());
        assert!(BlockMath.tokenize("text $$a$$").is_none());
        assert!(BlockMath.tokenize("   $$a$$").is_some());
    }

    #[test]
    fn test_block_unterminated() {
        assert!(BlockMath.tokenize("$$\na\nb\n").is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_math_html_escapes_brackets() {
        assert_eq!(math_html("$a<b>c & d$"), "$a&lt;b&gt;c &amp; d$");
    }

    #[test]
    fn test_math_html_rewrites_backtick_code() {
        assert_eq!(
            math_html("$f(`x<1`)$"),
            "$f(<code class=\"language-none\">x&lt;1</code>)$"
        );
    }

    #[tokio::test]
    async fn test_resolve_fills_html() {
        let mut token = InlineMath.tokenize("$x<y$").unwrap();
        InlineMath.resolve(&mut token, 0).await.unwrap();
        assert_eq!(token.resolved_html.as_deref(), Some("$x&lt;y$"));
    }
}
