//! The rendering pipeline: tokenize, resolve, serialize.
//!
//! Tokenizing and serializing are synchronous. Resolution is the only stage
//! that suspends: every extension token is dispatched to its extension and
//! all of them are awaited together before anything is serialized.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, info};

use super::diagram::DiagramBlock;
use super::extension::Extension;
use super::lexer::Lexer;
use super::math::{BlockMath, InlineMath};
use super::parser::{BuiltinGrammar, MarkdownOptions};
use super::renderer::Renderer;
use super::token::Token;
use crate::config::Settings;
use crate::diagram::{DiagramRenderer, MermaidCli, PlantUmlProcess};
use crate::error::{Error, Result};

/// Diagram engines available to a pipeline. A missing engine leaves its
/// fences to the built-in grammar as ordinary code blocks.
#[derive(Clone, Default)]
pub struct DiagramBackends {
    pub plantuml: Option<Arc<dyn DiagramRenderer>>,
    pub mermaid: Option<Arc<dyn DiagramRenderer>>,
    /// Prefix for Mermaid render-target ids
    pub mermaid_id_prefix: String,
}

impl DiagramBackends {
    /// Process-backed engines as configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let plantuml = PlantUmlProcess::from_settings(&settings.plantuml)
            .map(|process| Arc::new(process) as Arc<dyn DiagramRenderer>);
        if plantuml.is_none() {
            info!("No PlantUML jar configured; plantuml fences render as code");
        }

        Self {
            plantuml,
            mermaid: Some(Arc::new(MermaidCli::from_settings(&settings.mermaid))),
            mermaid_id_prefix: settings.mermaid.id_prefix.clone(),
        }
    }
}

/// Markdown to sanitized HTML, with an ordered list of extensions tried
/// ahead of the built-in grammar.
pub struct Pipeline {
    grammar: BuiltinGrammar,
    extensions: Vec<Arc<dyn Extension>>,
}

impl Pipeline {
    /// A pipeline with no extensions registered.
    pub fn new(options: MarkdownOptions) -> Self {
        Self {
            grammar: BuiltinGrammar::new(options),
            extensions: Vec::new(),
        }
    }

    /// A pipeline with the math and diagram extensions registered according
    /// to `options`, in the order block math, PlantUML, Mermaid, inline math.
    pub fn with_backends(options: MarkdownOptions, backends: DiagramBackends) -> Self {
        let math = options.math;
        let diagrams = options.diagrams;
        let mut pipeline = Self::new(options);

        if math {
            pipeline = pipeline.with_extension(Arc::new(BlockMath));
        }
        if diagrams {
            if let Some(renderer) = backends.plantuml {
                pipeline = pipeline.with_extension(Arc::new(DiagramBlock::plantuml(renderer)));
            }
            if let Some(renderer) = backends.mermaid {
                let prefix = if backends.mermaid_id_prefix.is_empty() {
                    "mermaid".to_string()
                } else {
                    backends.mermaid_id_prefix
                };
                pipeline =
                    pipeline.with_extension(Arc::new(DiagramBlock::mermaid(renderer, prefix)));
            }
        }
        if math {
            pipeline = pipeline.with_extension(Arc::new(InlineMath));
        }

        pipeline
    }

    /// A pipeline built from user settings with process-backed diagram engines.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_backends(
            settings.markdown.clone(),
            DiagramBackends::from_settings(settings),
        )
    }

    /// Register an extension after the existing ones. An extension with the
    /// same name replaces the earlier registration in place.
    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        match self
            .extensions
            .iter()
            .position(|ext| ext.name() == extension.name())
        {
            Some(idx) => {
                debug!("Replacing extension '{}'", extension.name());
                self.extensions[idx] = extension;
            }
            None => self.extensions.push(extension),
        }
        self
    }

    pub fn options(&self) -> &MarkdownOptions {
        self.grammar.options()
    }

    /// Registered extension names, in the order they are tried.
    pub fn extension_names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    fn extension(&self, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.iter().find(|ext| ext.name() == name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────────

    /// Stage 1: tokenize `markdown` into a document token.
    pub fn tokenize(&self, markdown: &str) -> Result<Token> {
        Lexer::new(&self.extensions, &self.grammar).tokenize(markdown)
    }

    /// Stage 2: resolve every extension token, concurrently, and wait for all
    /// of them. The first failure fails the whole stage.
    pub async fn resolve(&self, document: &mut Token) -> Result<()> {
        let mut pending = Vec::new();
        document.extension_tokens_mut(&mut pending);

        let mut ordinals: HashMap<&'static str, usize> = HashMap::new();
        let mut resolutions = Vec::with_capacity(pending.len());

        for token in pending {
            let Some(name) = token.extension_name() else {
                continue;
            };
            let extension = self
                .extension(name)
                .ok_or(Error::UnknownExtension { name })?;

            let next = ordinals.entry(name).or_insert(0);
            let ordinal = *next;
            *next += 1;

            resolutions.push(extension.resolve(token, ordinal));
        }

        debug!("Resolving {} extension token(s)", resolutions.len());
        try_join_all(resolutions).await?;
        Ok(())
    }

    /// Stage 3: serialize a resolved document.
    pub fn serialize(&self, document: &Token) -> Result<String> {
        Renderer::new(self.grammar.options(), &self.extensions, &self.grammar).render(document)
    }

    /// Render `markdown` to HTML. Any resolution failure rejects the whole
    /// render; no partial HTML is produced.
    pub async fn render(&self, markdown: &str) -> Result<String> {
        let mut document = self.tokenize(markdown)?;
        self.resolve(&mut document).await?;
        self.serialize(&document)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::token::{BLOCK_MATH, DIAGRAM_MERMAID, DIAGRAM_PLANTUML, INLINE_MATH};
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers with a fixed SVG and counts calls.
    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl DiagramRenderer for CountingRenderer {
        fn language(&self) -> &'static str {
            "mock"
        }

        fn render<'a>(&'a self, target_id: &'a str, source: &'a str) -> BoxFuture<'a, Result<String>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(format!(
                    "<svg id=\"{}\"><text>{}</text></svg>",
                    target_id,
                    source.lines().count()
                ))
            }
            .boxed()
        }
    }

    struct FailingRenderer;

    impl DiagramRenderer for FailingRenderer {
        fn language(&self) -> &'static str {
            "mock"
        }

        fn render<'a>(&'a self, _id: &'a str, _source: &'a str) -> BoxFuture<'a, Result<String>> {
            async { Err(Error::diagram("plantuml", "service unreachable")) }.boxed()
        }
    }

    fn pipeline_with(
        plantuml: Arc<dyn DiagramRenderer>,
        mermaid: Arc<dyn DiagramRenderer>,
    ) -> Pipeline {
        Pipeline::with_backends(
            MarkdownOptions::default(),
            DiagramBackends {
                plantuml: Some(plantuml),
                mermaid: Some(mermaid),
                mermaid_id_prefix: "graph".to_string(),
            },
        )
    }

    fn math_only() -> Pipeline {
        Pipeline::with_backends(MarkdownOptions::default(), DiagramBackends::default())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_registration_order() {
        let counter = Arc::new(CountingRenderer::default());
        let pipeline = pipeline_with(counter.clone(), counter);
        assert_eq!(
            pipeline.extension_names(),
            vec![BLOCK_MATH, DIAGRAM_PLANTUML, DIAGRAM_MERMAID, INLINE_MATH]
        );
    }

    #[test]
    fn test_disabled_extensions_are_not_registered() {
        let options = MarkdownOptions {
            math: false,
            diagrams: false,
            ..MarkdownOptions::default()
        };
        let counter = Arc::new(CountingRenderer::default());
        let pipeline = Pipeline::with_backends(
            options,
            DiagramBackends {
                plantuml: Some(counter.clone()),
                mermaid: Some(counter),
                mermaid_id_prefix: String::new(),
            },
        );
        assert!(pipeline.extension_names().is_empty());
    }

    #[test]
    fn test_with_extension_replaces_same_name() {
        let pipeline = Pipeline::new(MarkdownOptions::default())
            .with_extension(Arc::new(InlineMath))
            .with_extension(Arc::new(InlineMath));
        assert_eq!(pipeline.extension_names(), vec![INLINE_MATH]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering properties
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_rendering_is_idempotent() {
        let pipeline = math_only();
        let markdown = "# Title\n\nSome *text* with [a link](http://x).\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let first = pipeline.render(markdown).await.unwrap();
        let second = pipeline.render(markdown).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_inline_math_is_kept_verbatim() {
        let html = math_only().render("Sum $x+y$ done").await.unwrap();
        assert_eq!(html, "<p>Sum $x+y$ done</p>\n");
    }

    #[tokio::test]
    async fn test_inline_math_reescapes_backtick_code() {
        let html = math_only().render("See $`a<b`$ here").await.unwrap();
        assert_eq!(
            html,
            "<p>See $<code class=\"language-none\">a&lt;b</code>$ here</p>\n"
        );
    }

    #[tokio::test]
    async fn test_math_is_not_parsed_as_emphasis() {
        let html = math_only().render("$a*b*c$").await.unwrap();
        assert_eq!(html, "<p>$a*b*c$</p>\n");
    }

    #[tokio::test]
    async fn test_block_math_renders_as_div() {
        let html = math_only()
            .render("Before\n$$\na < b\n$$\nAfter")
            .await
            .unwrap();
        assert_eq!(
            html,
            "<p>Before</p>\n<div class=\"math-block\">$$\na &lt; b\n$$</div>\n<p>After</p>\n"
        );
    }

    #[tokio::test]
    async fn test_math_in_table_cell() {
        let html = math_only()
            .render("| f |\n|---|\n| $x^2$ |")
            .await
            .unwrap();
        assert!(html.contains(">$x^2$</td>"));
    }

    #[tokio::test]
    async fn test_each_diagram_resolved_once() {
        let plantuml = Arc::new(CountingRenderer::default());
        let mermaid = Arc::new(CountingRenderer::default());
        let pipeline = pipeline_with(plantuml.clone(), mermaid.clone());

        let markdown = "```mermaid\ngraph TD\nA-->B\n```\n\ntext\n\n```plantuml\nA -> B\n```\n\n```mermaid\ngraph LR\n```\n";
        let html = pipeline.render(markdown).await.unwrap();

        assert_eq!(plantuml.calls.load(Ordering::SeqCst), 1);
        assert_eq!(mermaid.calls.load(Ordering::SeqCst), 2);
        assert!(html.contains("<pre class=\"mermaid\"><svg id=\"graph-0\"><text>2</text></svg></pre>"));
        assert!(html.contains("<pre class=\"mermaid\"><svg id=\"graph-1\"><text>1</text></svg></pre>"));
        assert!(html.contains("<pre class=\"plantuml\"><svg id=\"plantuml-0\">"));
        assert!(!html.contains("<pre class=\"mermaid\"></pre>"));
        assert!(!html.contains("<pre class=\"plantuml\"></pre>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagrams_resolve_concurrently() {
        let slow = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_secs(1)),
        });
        let pipeline = pipeline_with(slow.clone(), slow.clone());

        let started = tokio::time::Instant::now();
        pipeline
            .render("```plantuml\nA\n```\n\n```mermaid\nB\n```\n\n```mermaid\nC\n```\n")
            .await
            .unwrap();

        assert_eq!(slow.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_diagram_failure_rejects_render() {
        let pipeline = pipeline_with(
            Arc::new(FailingRenderer),
            Arc::new(CountingRenderer::default()),
        );
        let err = pipeline
            .render("# Doc\n\n```plantuml\nA -> B\n```\n")
            .await
            .unwrap_err();
        assert!(err.is_diagram_failure());
        assert!(err.to_string().contains("service unreachable"));
    }

    #[tokio::test]
    async fn test_diagram_without_backend_is_code_block() {
        let html = math_only()
            .render("```mermaid\ngraph TD\n```")
            .await
            .unwrap();
        assert_eq!(
            html,
            "<pre><code class=\"language-mermaid\">graph TD\n</code></pre>\n"
        );
    }

    #[tokio::test]
    async fn test_diagram_inside_list_item() {
        let counter = Arc::new(CountingRenderer::default());
        let pipeline = pipeline_with(counter.clone(), counter.clone());
        let html = pipeline
            .render("- item\n\n  ```mermaid\n  graph TD\n  ```\n")
            .await
            .unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert!(html.contains("<li>"));
        assert!(html.contains("<pre class=\"mermaid\">"));
    }

    #[tokio::test]
    async fn test_diagram_and_math_inside_quotes() {
        let counter = Arc::new(CountingRenderer::default());
        let pipeline = pipeline_with(counter.clone(), counter.clone());
        let html = pipeline
            .render("> ```mermaid\n> graph TD\n> ```\n\n> $$\n> x\n> $$\n")
            .await
            .unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert!(html.contains("<blockquote>\n<pre class=\"mermaid\">"));
        assert!(html.contains("<blockquote>\n<div class=\"math-block\">$$\nx\n$$</div>"));
        assert!(!html.contains("&gt;"));
        assert!(!html.contains("language-mermaid"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dollar signs across blocks
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_dollar_amounts_in_list_render_two_items() {
        let html = math_only().render("- costs $5\n- costs $6\n").await.unwrap();
        assert!(html.contains("<li>costs $5</li>"));
        assert!(html.contains("<li>costs $6</li>"));
    }

    #[tokio::test]
    async fn test_dollar_amounts_in_table_render_two_rows() {
        let html = math_only()
            .render("| p |\n|---|\n| $5 |\n| $6 |\n")
            .await
            .unwrap();
        assert_eq!(html.matches("<td").count(), 2);
        assert!(!html.contains("$5 |"));
    }

    #[tokio::test]
    async fn test_dollar_in_heading_keeps_next_paragraph() {
        let html = math_only()
            .render("# Price $5\nthen $6 later\n")
            .await
            .unwrap();
        assert!(html.contains("Price $5</h1>"));
        assert!(html.contains("<p>then $6 later</p>"));
    }

    #[tokio::test]
    async fn test_dollar_amounts_in_quote_keep_markers_out() {
        let html = math_only().render("> a $5\n> b $6\n").await.unwrap();
        assert!(html.starts_with("<blockquote>"));
        assert!(!html.contains("&gt;"));
        assert!(!html.contains("math"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stage boundaries
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_serialize_before_resolve_fails() {
        let pipeline = math_only();
        let document = pipeline.tokenize("value $x$").unwrap();
        let err = pipeline.serialize(&document).unwrap_err();
        assert!(matches!(err, Error::UnresolvedToken { name: INLINE_MATH }));
    }

    #[tokio::test]
    async fn test_resolve_then_serialize() {
        let pipeline = math_only();
        let mut document = pipeline.tokenize("value $x$").unwrap();
        pipeline.resolve(&mut document).await.unwrap();
        assert_eq!(pipeline.serialize(&document).unwrap(), "<p>value $x$</p>\n");
    }

    #[tokio::test]
    async fn test_resolve_rejects_unregistered_token() {
        let pipeline = Pipeline::new(MarkdownOptions::default());
        let mut document = Token::new(crate::markdown::token::TokenKind::Document, "")
            .with_children(vec![Token::extension(INLINE_MATH, "$x$", "x")]);
        let err = pipeline.resolve(&mut document).await.unwrap_err();
        assert!(matches!(err, Error::UnknownExtension { .. }));
    }
}
