//! HTML serializer for the token tree
//!
//! Extension tokens are serialized by the extension that produced them.
//! Built-in tokens go through [`Renderer::render_builtin`], which applies the
//! preview's overrides for tables, code, links and images and sanitizes text,
//! attributes and URLs on the way out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use super::extension::Extension;
use super::parser::MarkdownOptions;
use super::token::{Alignment, Token, TokenKind};
use crate::error::{Error, Result};

const TABLE_STYLE: &str = "border: 1px solid #ccc; border-collapse: collapse;";
const HEADER_CELL_STYLE: &str =
    "padding: 6px 13px;border-bottom: 2px solid #ebebeb;background-color: #f7f7f7;";
const BODY_CELL_STYLE: &str = "padding: 6px 13px;border-top: 1px solid #ebebeb;";
const NO_LANGUAGE: &str = "language-none";
const RAW_HTML_OMITTED: &str = "<!-- raw HTML omitted -->";

/// Serializes one document. Holds per-render state (heading slugs), so
/// create a fresh renderer for every render.
pub struct Renderer<'a> {
    allow_raw_html: bool,
    extensions: &'a [Arc<dyn Extension>],
    builtin: &'a dyn Extension,
    slugs: RefCell<HashMap<String, usize>>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        options: &MarkdownOptions,
        extensions: &'a [Arc<dyn Extension>],
        builtin: &'a dyn Extension,
    ) -> Self {
        Self {
            allow_raw_html: options.allow_raw_html,
            extensions,
            builtin,
            slugs: RefCell::new(HashMap::new()),
        }
    }

    /// Serialize a fully resolved document.
    ///
    /// # Errors
    ///
    /// - [`Error::UnresolvedToken`] if an extension token has not been resolved
    /// - [`Error::UnknownExtension`] if a token names an unregistered extension
    pub fn render(&self, document: &Token) -> Result<String> {
        self.check(document)?;
        Ok(self.render_token(document))
    }

    fn check(&self, token: &Token) -> Result<()> {
        if let Some(name) = token.extension_name() {
            if self.extension(name).is_none() {
                return Err(Error::UnknownExtension { name });
            }
            if token.resolved_html.is_none() {
                return Err(Error::UnresolvedToken { name });
            }
            return Ok(());
        }
        token.children.iter().try_for_each(|child| self.check(child))
    }

    fn extension(&self, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.iter().find(|ext| ext.name() == name)
    }

    /// Serialize one token, dispatching extension tokens to their extension.
    pub fn render_token(&self, token: &Token) -> String {
        match token.extension_name() {
            Some(name) => self
                .extension(name)
                .and_then(|ext| ext.render(token, self))
                .or_else(|| token.resolved_html.clone())
                .unwrap_or_default(),
            None => self
                .builtin
                .render(token, self)
                .unwrap_or_else(|| self.render_builtin(token)),
        }
    }

    pub fn render_children(&self, token: &Token) -> String {
        token
            .children
            .iter()
            .map(|child| self.render_token(child))
            .collect()
    }

    /// Built-in serialization with the preview's overrides.
    pub fn render_builtin(&self, token: &Token) -> String {
        match &token.kind {
            TokenKind::Document => self.render_children(token),
            TokenKind::Paragraph => format!("<p>{}</p>\n", self.render_children(token)),
            TokenKind::Heading { level } => self.render_heading(token, *level),
            TokenKind::BlockQuote => {
                format!("<blockquote>\n{}</blockquote>\n", self.render_children(token))
            }
            TokenKind::List {
                ordered,
                start,
                tight,
            } => self.render_list(token, *ordered, *start, *tight),
            TokenKind::Item | TokenKind::TaskItem { .. } => self.render_item(token, false),
            TokenKind::CodeBlock { info, literal } => {
                let class = match info.split_whitespace().next() {
                    Some(lang) => format!("language-{}", escape_attr(lang)),
                    None => NO_LANGUAGE.to_string(),
                };
                format!(
                    "<pre><code class=\"{}\">{}</code></pre>\n",
                    class,
                    escape_text(literal)
                )
            }
            TokenKind::HtmlBlock(html) => {
                if self.allow_raw_html {
                    let mut out = html.clone();
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out
                } else {
                    format!("{}\n", RAW_HTML_OMITTED)
                }
            }
            TokenKind::ThematicBreak => "<hr />\n".to_string(),
            TokenKind::Table { .. } => self.render_table(token),
            TokenKind::TableRow { .. } => format!("<tr>\n{}</tr>\n", self.render_children(token)),
            TokenKind::TableCell { header, alignment } => {
                self.render_cell(token, *header, *alignment)
            }

            TokenKind::Text(text) => escape_text(text),
            TokenKind::SoftBreak => "\n".to_string(),
            TokenKind::LineBreak => "<br />\n".to_string(),
            TokenKind::CodeSpan(code) => {
                format!("<code class=\"{}\">{}</code>", NO_LANGUAGE, escape_text(code))
            }
            TokenKind::HtmlInline(html) => {
                if self.allow_raw_html {
                    html.clone()
                } else {
                    RAW_HTML_OMITTED.to_string()
                }
            }
            TokenKind::Emphasis => format!("<em>{}</em>", self.render_children(token)),
            TokenKind::Strong => format!("<strong>{}</strong>", self.render_children(token)),
            TokenKind::Strikethrough => format!("<del>{}</del>", self.render_children(token)),
            TokenKind::Link { url, title } => format!(
                "<a target=\"_blank\" rel=\"noopener noreferrer\" href=\"{}\" title=\"{}\">{}</a>",
                escape_attr(&safe_url(url, false)),
                escape_attr(title),
                self.render_children(token)
            ),
            TokenKind::Image { url, title } => self.render_image(token, url, title),

            TokenKind::Extension { .. } => token.resolved_html.clone().unwrap_or_default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Block helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn render_heading(&self, token: &Token, level: u8) -> String {
        let level = level.clamp(1, 6);
        let slug = self.unique_slug(&token.plain_text());
        let id = if slug.is_empty() {
            String::new()
        } else {
            format!(" id=\"{}\"", escape_attr(&slug))
        };
        format!(
            "<h{level}{id}>{}</h{level}>\n",
            self.render_children(token),
            level = level,
            id = id
        )
    }

    fn unique_slug(&self, text: &str) -> String {
        let base = slugify(text);
        if base.is_empty() {
            return base;
        }
        let mut slugs = self.slugs.borrow_mut();
        let seen = slugs.entry(base.clone()).or_insert(0);
        let slug = if *seen == 0 {
            base
        } else {
            format!("{}-{}", base, seen)
        };
        *seen += 1;
        slug
    }

    fn render_list(&self, token: &Token, ordered: bool, start: usize, tight: bool) -> String {
        let open = match (ordered, start) {
            (false, _) => "<ul>\n".to_string(),
            (true, 1) => "<ol>\n".to_string(),
            (true, n) => format!("<ol start=\"{}\">\n", n),
        };
        let items: String = token
            .children
            .iter()
            .map(|item| self.render_item(item, tight))
            .collect();
        let close = if ordered { "</ol>\n" } else { "</ul>\n" };
        format!("{}{}{}", open, items, close)
    }

    fn render_item(&self, item: &Token, tight: bool) -> String {
        let mut inner = String::new();

        if let TokenKind::TaskItem { checked } = item.kind {
            inner.push_str(if checked {
                "<input type=\"checkbox\" checked=\"\" disabled=\"\" /> "
            } else {
                "<input type=\"checkbox\" disabled=\"\" /> "
            });
        }

        for child in &item.children {
            if tight && matches!(child.kind, TokenKind::Paragraph) {
                inner.push_str(&self.render_children(child));
            } else {
                if !inner.ends_with('\n') {
                    inner.push('\n');
                }
                inner.push_str(&self.render_token(child));
            }
        }

        format!("<li>{}</li>\n", inner)
    }

    fn render_table(&self, token: &Token) -> String {
        let (head, body): (Vec<&Token>, Vec<&Token>) = token
            .children
            .iter()
            .partition(|row| matches!(row.kind, TokenKind::TableRow { header: true }));

        let mut out = format!("<table style=\"{}\">\n", TABLE_STYLE);
        if !head.is_empty() {
            out.push_str("<thead>\n");
            for row in head {
                out.push_str(&self.render_token(row));
            }
            out.push_str("</thead>\n");
        }
        if !body.is_empty() {
            out.push_str("<tbody>\n");
            for row in body {
                out.push_str(&self.render_token(row));
            }
            out.push_str("</tbody>\n");
        }
        out.push_str("</table>\n");
        out
    }

    fn render_cell(&self, token: &Token, header: bool, alignment: Alignment) -> String {
        let content = self.render_children(token);
        if header {
            let align = alignment
                .as_css()
                .map(|a| format!("text-align: {};", a))
                .unwrap_or_default();
            format!(
                "<th style=\"{}{}\">{}</th>\n",
                align, HEADER_CELL_STYLE, content
            )
        } else {
            format!("<td style=\"{}\">{}</td>\n", BODY_CELL_STYLE, content)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inline helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn render_image(&self, token: &Token, url: &str, title: &str) -> String {
        let src = escape_attr(&safe_url(url, true));
        let alt = escape_attr(&token.plain_text());
        let title_attr = if title.is_empty() {
            String::new()
        } else {
            format!(" title=\"{}\"", escape_attr(title))
        };
        let img = format!("<img src=\"{}\" alt=\"{}\"{} />", src, alt, title_attr);

        if is_absolute_http(url) {
            format!(
                "<a target=\"_blank\" rel=\"noopener noreferrer\" href=\"{}\">{}</a>",
                src, img
            )
        } else {
            img
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sanitizing
// ─────────────────────────────────────────────────────────────────────────────

/// Escape text content (`&`, `<`, `>`).
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value (text escapes plus quotes).
pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Blank out URLs with script-capable or local-file schemes.
///
/// `data:` URLs are kept only for images with an image media type.
pub fn safe_url(url: &str, image: bool) -> String {
    let scheme: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    let blocked = scheme.starts_with("javascript:")
        || scheme.starts_with("vbscript:")
        || scheme.starts_with("file:")
        || (scheme.starts_with("data:") && !(image && scheme.starts_with("data:image/")));

    if blocked {
        String::new()
    } else {
        url.to_string()
    }
}

fn is_absolute_http(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// GitHub-style heading anchor.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if ch == ' ' || ch == '-' {
            slug.push('-');
        } else if ch == '_' {
            slug.push('_');
        }
    }
    slug
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parser::BuiltinGrammar;
    use crate::markdown::token::INLINE_MATH;

    fn render_with(options: MarkdownOptions, markdown: &str) -> String {
        let grammar = BuiltinGrammar::new(options.clone());
        let doc = grammar.parse(markdown);
        Renderer::new(&options, &[], &grammar).render(&doc).unwrap()
    }

    fn render(markdown: &str) -> String {
        render_with(MarkdownOptions::default(), markdown)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tables
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_table_styles() {
        let html = render("| A | B |\n|:-:|---|\n| 1 | 2 |");
        assert!(html.contains(
            "<table style=\"border: 1px solid #ccc; border-collapse: collapse;\">"
        ));
        assert!(html.contains(
            "<th style=\"text-align: center;padding: 6px 13px;border-bottom: 2px solid #ebebeb;background-color: #f7f7f7;\">A</th>"
        ));
        assert!(html.contains(
            "<th style=\"padding: 6px 13px;border-bottom: 2px solid #ebebeb;background-color: #f7f7f7;\">B</th>"
        ));
        assert!(html.contains("<td style=\"padding: 6px 13px;border-top: 1px solid #ebebeb;\">1</td>"));
        assert!(html.contains("<thead>") && html.contains("<tbody>"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Code
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_code_block_without_language() {
        let html = render("```\nlet x = 1 < 2;\n```");
        assert_eq!(
            html,
            "<pre><code class=\"language-none\">let x = 1 &lt; 2;\n</code></pre>\n"
        );
    }

    #[test]
    fn test_code_block_with_language() {
        let html = render("```rust title\nfn main() {}\n```");
        assert!(html.starts_with("<pre><code class=\"language-rust\">"));
    }

    #[test]
    fn test_code_span_class() {
        assert_eq!(
            render("use `x`"),
            "<p>use <code class=\"language-none\">x</code></p>\n"
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Links and Images
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_link_opens_externally_with_title() {
        let html = render("[site](https://example.com \"The \\\"Site\\\"\")");
        assert_eq!(
            html,
            "<p><a target=\"_blank\" rel=\"noopener noreferrer\" href=\"https://example.com\" title=\"The &quot;Site&quot;\">site</a></p>\n"
        );
    }

    #[test]
    fn test_remote_image_is_wrapped_in_link() {
        let html = render("![logo](https://example.com/a.png)");
        assert_eq!(
            html,
            "<p><a target=\"_blank\" rel=\"noopener noreferrer\" href=\"https://example.com/a.png\"><img src=\"https://example.com/a.png\" alt=\"logo\" /></a></p>\n"
        );
    }

    #[test]
    fn test_local_image_is_bare() {
        let html = render("![pic](images/a.png \"Caption\")");
        assert_eq!(
            html,
            "<p><img src=\"images/a.png\" alt=\"pic\" title=\"Caption\" /></p>\n"
        );
    }

    #[test]
    fn test_dangerous_urls_are_blanked() {
        let html = render("[x](javascript:alert(1)) ![y](data:text/html;base64,AA)");
        assert!(!html.contains("javascript"));
        assert!(!html.contains("data:text"));
        assert_eq!(safe_url("data:image/png;base64,AA", true), "data:image/png;base64,AA");
        assert_eq!(safe_url("data:image/png;base64,AA", false), "");
        assert_eq!(safe_url(" JavaScript:x", false), "");
        assert_eq!(safe_url("file:///etc/passwd", true), "");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Headings and Lists
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_heading_slugs_are_deduplicated() {
        let html = render("# Intro\n\n## Intro\n\n### Hello, World!");
        assert!(html.contains("<h1 id=\"intro\">Intro</h1>"));
        assert!(html.contains("<h2 id=\"intro-1\">Intro</h2>"));
        assert!(html.contains("<h3 id=\"hello-world\">Hello, World!</h3>"));
    }

    #[test]
    fn test_tight_list_has_no_paragraphs() {
        assert_eq!(render("- a\n- b"), "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n");
    }

    #[test]
    fn test_loose_list_keeps_paragraphs() {
        let html = render("- a\n\n- b");
        assert!(html.contains("<li>\n<p>a</p>\n</li>"));
    }

    #[test]
    fn test_ordered_list_start() {
        assert!(render("3. x\n4. y").starts_with("<ol start=\"3\">"));
        assert!(render("1. x").starts_with("<ol>\n"));
    }

    #[test]
    fn test_task_items_render_checkboxes() {
        let html = render("- [x] done\n- [ ] todo");
        assert!(html.contains("<li><input type=\"checkbox\" checked=\"\" disabled=\"\" /> done</li>"));
        assert!(html.contains("<li><input type=\"checkbox\" disabled=\"\" /> todo</li>"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Raw HTML and escaping
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_raw_html_is_omitted_by_default() {
        let html = render("<div onclick=\"x()\">hi</div>\n\ntext <b>bold</b>");
        assert!(!html.contains("onclick"));
        assert!(!html.contains("<b>"));
        assert!(html.contains(RAW_HTML_OMITTED));
    }

    #[test]
    fn test_raw_html_allowed_when_enabled() {
        let options = MarkdownOptions {
            allow_raw_html: true,
            ..MarkdownOptions::default()
        };
        let html = render_with(options, "text <b>bold</b>");
        assert_eq!(html, "<p>text <b>bold</b></p>\n");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(render("a &amp; 1 \\< 2"), "<p>a &amp; 1 &lt; 2</p>\n");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution checks
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_extension_is_error() {
        let grammar = BuiltinGrammar::default();
        let doc = Token::new(TokenKind::Document, "")
            .with_children(vec![Token::extension(INLINE_MATH, "$x$", "x")]);
        let err = Renderer::new(grammar.options(), &[], &grammar)
            .render(&doc)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownExtension { name: INLINE_MATH }));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("snake_case & more"), "snake_case--more");
        assert_eq!(slugify("!!!"), "");
    }
}
