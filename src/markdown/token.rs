//! Token tree produced by the lexer and consumed by the renderer.
//!
//! Built-in kinds mirror the comrak AST one-to-one. Extension tokens carry
//! the name of the extension that produced them plus an extension-specific
//! text payload (the math expression or the diagram source).

/// Extension token name for `$...$` spans.
pub const INLINE_MATH: &str = "inline-math";
/// Extension token name for `$$...$$` blocks.
pub const BLOCK_MATH: &str = "block-math";
/// Extension token name for ```` ```plantuml ```` fences.
pub const DIAGRAM_PLANTUML: &str = "diagram:plantuml";
/// Extension token name for ```` ```mermaid ```` fences.
pub const DIAGRAM_MERMAID: &str = "diagram:mermaid";

/// Table cell alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    /// CSS `text-align` value, if any alignment was declared.
    pub fn as_css(self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }
}

/// The kind of a token together with its kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ─────────────────────────────────────────────────────────────────────────
    // Block kinds
    // ─────────────────────────────────────────────────────────────────────────
    /// Root document node
    Document,
    /// Paragraph (a "text-block")
    Paragraph,
    /// Heading (1-6)
    Heading { level: u8 },
    /// Block quote (>)
    BlockQuote,
    /// List container
    List {
        ordered: bool,
        start: usize,
        tight: bool,
    },
    /// List item
    Item,
    /// Task list item with its checkbox state
    TaskItem { checked: bool },
    /// Fenced or indented code block
    CodeBlock { info: String, literal: String },
    /// Raw HTML block
    HtmlBlock(String),
    /// Horizontal rule
    ThematicBreak,
    /// Table with per-column alignments
    Table { alignments: Vec<Alignment> },
    /// Table row
    TableRow { header: bool },
    /// Table cell
    TableCell { header: bool, alignment: Alignment },

    // ─────────────────────────────────────────────────────────────────────────
    // Inline kinds
    // ─────────────────────────────────────────────────────────────────────────
    Text(String),
    SoftBreak,
    LineBreak,
    /// Inline code span
    CodeSpan(String),
    HtmlInline(String),
    Emphasis,
    Strong,
    Strikethrough,
    Link { url: String, title: String },
    Image { url: String, title: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Extension kinds
    // ─────────────────────────────────────────────────────────────────────────
    /// Token produced by a registered extension
    Extension { name: &'static str, text: String },
}

/// A parsed unit of markdown structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text this token was produced from
    pub raw: String,
    pub children: Vec<Token>,
    /// Filled in by the resolve pass; always `None` for built-in kinds
    pub resolved_html: Option<String>,
    /// 1-based start line (0 when unknown)
    pub start_line: usize,
    /// 1-based end line (0 when unknown)
    pub end_line: usize,
}

impl Token {
    /// Create a token with no children and no source position.
    pub fn new(kind: TokenKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            children: Vec::new(),
            resolved_html: None,
            start_line: 0,
            end_line: 0,
        }
    }

    /// Create an extension token.
    pub fn extension(name: &'static str, raw: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            TokenKind::Extension {
                name,
                text: text.into(),
            },
            raw,
        )
    }

    /// Attach source lines.
    pub fn with_lines(mut self, start_line: usize, end_line: usize) -> Self {
        self.start_line = start_line;
        self.end_line = end_line;
        self
    }

    /// Attach children.
    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    /// The extension name, if this is an extension token.
    pub fn extension_name(&self) -> Option<&'static str> {
        match &self.kind {
            TokenKind::Extension { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The extension payload text, if this is an extension token.
    pub fn extension_text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Extension { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Whether this token still waits for the resolve pass.
    pub fn is_unresolved(&self) -> bool {
        self.extension_name().is_some() && self.resolved_html.is_none()
    }

    /// Concatenated plain text of this token and its descendants.
    ///
    /// Used for heading slugs and image alt text.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            TokenKind::Text(text) | TokenKind::CodeSpan(text) => out.push_str(text),
            TokenKind::SoftBreak | TokenKind::LineBreak => out.push(' '),
            TokenKind::Extension { text, .. } => out.push_str(text),
            _ => {
                for child in &self.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Visit every extension token depth-first, parents before children.
    pub fn extension_tokens_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Token>) {
        if self.extension_name().is_some() {
            out.push(self);
            return;
        }
        for child in self.children.iter_mut() {
            child.extension_tokens_mut(out);
        }
    }

    /// Count of extension tokens in this subtree.
    pub fn extension_count(&self) -> usize {
        if self.extension_name().is_some() {
            return 1;
        }
        self.children.iter().map(Token::extension_count).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_token_starts_unresolved() {
        let token = Token::extension(INLINE_MATH, "$x$", "x");
        assert_eq!(token.extension_name(), Some(INLINE_MATH));
        assert_eq!(token.extension_text(), Some("x"));
        assert!(token.is_unresolved());
    }

    #[test]
    fn test_builtin_token_never_unresolved() {
        let token = Token::new(TokenKind::Paragraph, "hello");
        assert!(!token.is_unresolved());
        assert_eq!(token.extension_name(), None);
    }

    #[test]
    fn test_plain_text_flattens_children() {
        let token = Token::new(TokenKind::Heading { level: 1 }, "# Hello *World*").with_children(
            vec![
                Token::new(TokenKind::Text("Hello ".into()), "Hello "),
                Token::new(TokenKind::Emphasis, "*World*").with_children(vec![Token::new(
                    TokenKind::Text("World".into()),
                    "World",
                )]),
            ],
        );
        assert_eq!(token.plain_text(), "Hello World");
    }

    #[test]
    fn test_extension_tokens_mut_depth_first() {
        let mut doc = Token::new(TokenKind::Document, "").with_children(vec![
            Token::extension(BLOCK_MATH, "$$a$$", "a"),
            Token::new(TokenKind::Paragraph, "").with_children(vec![
                Token::new(TokenKind::Text("x ".into()), "x "),
                Token::extension(INLINE_MATH, "$b$", "b"),
            ]),
            Token::extension(DIAGRAM_MERMAID, "```mermaid", "graph TD"),
        ]);

        assert_eq!(doc.extension_count(), 3);

        let mut found = Vec::new();
        doc.extension_tokens_mut(&mut found);
        let names: Vec<_> = found.iter().map(|t| t.extension_name()).collect();
        assert_eq!(
            names,
            vec![Some(BLOCK_MATH), Some(INLINE_MATH), Some(DIAGRAM_MERMAID)]
        );
    }

    #[test]
    fn test_alignment_css() {
        assert_eq!(Alignment::None.as_css(), None);
        assert_eq!(Alignment::Center.as_css(), Some("center"));
    }
}
