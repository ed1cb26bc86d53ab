//! Fenced diagram blocks (```` ```plantuml ```` and ```` ```mermaid ````).
//!
//! The fence body is captured verbatim and handed to a [`DiagramRenderer`]
//! during the resolve pass. The returned markup is trusted and emitted as is,
//! wrapped in a `<pre>` carrying the language as its class.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::debug;

use super::extension::{Extension, Level};
use super::lexer::{line_len, Fence};
use super::renderer::Renderer;
use super::token::{Token, DIAGRAM_MERMAID, DIAGRAM_PLANTUML};
use crate::diagram::DiagramRenderer;
use crate::error::{Error, Result};

/// A fenced code block whose info string names a diagram language.
pub struct DiagramBlock {
    name: &'static str,
    language: &'static str,
    id_prefix: String,
    renderer: Arc<dyn DiagramRenderer>,
}

impl DiagramBlock {
    /// ```` ```plantuml ```` fences.
    pub fn plantuml(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self {
            name: DIAGRAM_PLANTUML,
            language: "plantuml",
            id_prefix: "plantuml".to_string(),
            renderer,
        }
    }

    /// ```` ```mermaid ```` fences; rendered elements get ids `{id_prefix}-{n}`.
    pub fn mermaid(renderer: Arc<dyn DiagramRenderer>, id_prefix: impl Into<String>) -> Self {
        Self {
            name: DIAGRAM_MERMAID,
            language: "mermaid",
            id_prefix: id_prefix.into(),
            renderer,
        }
    }

    /// Render-target id of the `ordinal`-th diagram of this kind.
    pub fn target_id(&self, ordinal: usize) -> String {
        format!("{}-{}", self.id_prefix, ordinal)
    }
}

impl Extension for DiagramBlock {
    fn name(&self) -> &'static str {
        self.name
    }

    fn level(&self) -> Level {
        Level::Block
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        let first = &src[..line_len(src)];
        let (fence, info) = Fence::open(first)?;
        if info != self.language {
            return None;
        }

        let mut body = String::new();
        let mut pos = first.len();

        while pos < src.len() {
            let line = &src[pos..pos + line_len(&src[pos..])];
            if fence.closes(line) {
                if body.trim().is_empty() {
                    return None;
                }
                let raw = src[..pos + line.len()].trim_end_matches('\n');
                return Some(Token::extension(self.name, raw, body));
            }

            // Body lines lose at most the fence's own indentation.
            let strip = line
                .bytes()
                .take(fence.indent)
                .take_while(|b| *b == b' ')
                .count();
            body.push_str(&line[strip..]);
            if !line.ends_with('\n') {
                body.push('\n');
            }
            pos += line.len();
        }

        // Unterminated: leave it to the built-in grammar as an ordinary code block.
        None
    }

    fn render(&self, token: &Token, _renderer: &Renderer<'_>) -> Option<String> {
        token.resolved_html.as_ref().map(|html| format!("{}\n", html))
    }

    fn resolve<'a>(&'a self, token: &'a mut Token, ordinal: usize) -> BoxFuture<'a, Result<()>> {
        async move {
            let source = token.extension_text().unwrap_or_default().to_string();
            let target_id = self.target_id(ordinal);
            debug!("Resolving {} diagram {}", self.language, target_id);

            let markup = self.renderer.render(&target_id, &source).await?;
            if markup.trim().is_empty() {
                return Err(Error::diagram(
                    self.language,
                    format!("renderer returned no markup for {}", target_id),
                ));
            }

            token.resolved_html = Some(format!(
                "<pre class=\"{}\">{}</pre>",
                self.language,
                markup.trim()
            ));
            Ok(())
        }
        .boxed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl DiagramRenderer for Echo {
        fn language(&self) -> &'static str {
            "echo"
        }

        fn render<'a>(&'a self, target_id: &'a str, source: &'a str) -> BoxFuture<'a, Result<String>> {
            let svg = format!("<svg id=\"{}\">{}</svg>", target_id, source.trim());
            async move { Ok(svg) }.boxed()
        }
    }

    struct Blank;

    impl DiagramRenderer for Blank {
        fn language(&self) -> &'static str {
            "blank"
        }

        fn render<'a>(&'a self, _id: &'a str, _source: &'a str) -> BoxFuture<'a, Result<String>> {
            async { Ok("   ".to_string()) }.boxed()
        }
    }

    fn mermaid() -> DiagramBlock {
        DiagramBlock::mermaid(Arc::new(Echo), "mermaid")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tokenize
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_tokenize_backtick_fence() {
        let src = "```mermaid\ngraph TD\n  A-->B\n```\nafter";
        let token = mermaid().tokenize(src).unwrap();
        assert_eq!(token.raw, "```mermaid\ngraph TD\n  A-->B\n```");
        assert_eq!(token.extension_text(), Some("graph TD\n  A-->B\n"));
    }

    #[test]
    fn test_tokenize_tilde_fence_with_longer_close() {
        let src = "~~~plantuml\nA -> B\n~~~~~\n";
        let plantuml = DiagramBlock::plantuml(Arc::new(Echo));
        let token = plantuml.tokenize(src).unwrap();
        assert_eq!(token.extension_name(), Some(DIAGRAM_PLANTUML));
        assert_eq!(token.extension_text(), Some("A -> B\n"));
    }

    #[test]
    fn test_tokenize_strips_fence_indent() {
        let src = "  ```mermaid\n  graph LR\n  ```";
        let token = mermaid().tokenize(src).unwrap();
        assert_eq!(token.extension_text(), Some("graph LR\n"));
    }

    #[test]
    fn test_info_string_must_match_exactly() {
        assert!(mermaid().tokenize("```mermaidx\na\n```").is_none());
        assert!(mermaid().tokenize("```rust\na\n```").is_none());
        assert!(mermaid().tokenize("``` mermaid \na\n```").is_some());
    }

    #[test]
    fn test_unterminated_or_empty_fence_is_no_match() {
        assert!(mermaid().tokenize("```mermaid\ngraph TD\n").is_none());
        assert!(mermaid().tokenize("```mermaid\n   \n```").is_none());
        assert!(mermaid().tokenize("```mermaid\ngraph\n~~~\n").is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolve
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_resolve_wraps_markup_with_target_id() {
        let ext = mermaid();
        let mut token = ext.tokenize("```mermaid\ngraph TD\n```").unwrap();
        ext.resolve(&mut token, 2).await.unwrap();
        assert_eq!(
            token.resolved_html.as_deref(),
            Some("<pre class=\"mermaid\"><svg id=\"mermaid-2\">graph TD</svg></pre>")
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank_markup() {
        let ext = DiagramBlock::plantuml(Arc::new(Blank));
        let mut token = ext.tokenize("```plantuml\nA -> B\n```").unwrap();
        let err = ext.resolve(&mut token, 0).await.unwrap_err();
        assert!(err.is_diagram_failure());
        assert!(token.resolved_html.is_none());
    }
}
