//! Built-in grammar backed by comrak
//!
//! This module wraps comrak's parser and converts its arena AST into the
//! owned [`Token`] tree used by the rest of the pipeline. While converting,
//! placeholders left by the lexer are turned back into extension tokens.

use std::ops::Range;

use comrak::{
    nodes::{AstNode, ListType, NodeValue, Sourcepos, TableAlignment},
    parse_document, Arena, Options,
};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use super::extension::{Extension, Level};
use super::lexer::{LineMap, PlaceholderTable};
use super::renderer::Renderer;
use super::token::{Alignment, Token, TokenKind};
use crate::error::Result;

/// Name under which the built-in grammar is known.
pub const BUILTIN: &str = "builtin";

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration options for markdown parsing and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Enable GitHub Flavored Markdown tables
    pub tables: bool,
    /// Enable strikethrough syntax (~~text~~)
    pub strikethrough: bool,
    /// Enable autolink URLs and emails
    pub autolink: bool,
    /// Enable task lists (- [ ] and - [x])
    pub tasklist: bool,
    /// Pass raw HTML through instead of replacing it with a comment
    pub allow_raw_html: bool,
    /// Register the `$` / `$$` math extensions
    pub math: bool,
    /// Register the PlantUML and Mermaid fence extensions
    pub diagrams: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            autolink: true,
            tasklist: true,
            allow_raw_html: false,
            math: true,
            diagrams: true,
        }
    }
}

impl MarkdownOptions {
    /// Convert to comrak Options.
    fn to_comrak_options(&self) -> Options<'static> {
        let mut options = Options::default();

        options.extension.strikethrough = self.strikethrough;
        options.extension.table = self.tables;
        options.extension.autolink = self.autolink;
        options.extension.tasklist = self.tasklist;
        options.extension.footnotes = false;
        options.extension.front_matter_delimiter = None;
        options.extension.header_ids = None;

        // HTML is produced by our own renderer; this only mirrors the setting.
        options.render.unsafe_ = self.allow_raw_html;

        options
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in Grammar
// ─────────────────────────────────────────────────────────────────────────────

/// CommonMark + GFM grammar; the fallback behind every registered extension.
#[derive(Debug, Clone, Default)]
pub struct BuiltinGrammar {
    options: MarkdownOptions,
}

impl BuiltinGrammar {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MarkdownOptions {
        &self.options
    }

    /// Parse markdown with no extensions involved.
    pub fn parse(&self, markdown: &str) -> Token {
        self.parse_substituted(markdown, &PlaceholderTable::default(), &LineMap::default())
    }

    /// Parse lexer output, splitting placeholders back into extension tokens.
    pub(crate) fn parse_substituted(
        &self,
        source: &str,
        table: &PlaceholderTable,
        lines: &LineMap,
    ) -> Token {
        let arena = Arena::new();
        let comrak_options = self.options.to_comrak_options();
        let root = parse_document(&arena, source, &comrak_options);

        let converter = Converter {
            source_lines: source.split_inclusive('\n').collect(),
            table,
            lines,
        };

        let mut converted = converter.convert(root);
        match converted.len() {
            1 => converted.remove(0),
            _ => Token::new(TokenKind::Document, source).with_children(converted),
        }
    }

    /// Byte ranges of `source` that hold inline content, in source order.
    ///
    /// Paragraphs and headings contribute their lines (setext underlines
    /// excluded), table rows contribute one range per cell. A range never
    /// spans two blocks, and inside a block quote it never spans two lines.
    pub(crate) fn inline_regions(&self, source: &str) -> Vec<Range<usize>> {
        let arena = Arena::new();
        let comrak_options = self.options.to_comrak_options();
        let root = parse_document(&arena, source, &comrak_options);

        let mut offset = 0;
        let lines: Vec<(usize, &str)> = source
            .split_inclusive('\n')
            .map(|line| {
                let start = offset;
                offset += line.len();
                (start, line.trim_end_matches('\n'))
            })
            .collect();

        let mut regions = Vec::new();
        collect_regions(root, false, &lines, &mut regions);
        regions.sort_by_key(|region| region.start);

        let mut end = 0;
        regions.retain(|region| {
            let keep = region.start >= end && !region.is_empty();
            if keep {
                end = region.end;
            }
            keep
        });
        regions
    }
}

impl Extension for BuiltinGrammar {
    fn name(&self) -> &'static str {
        BUILTIN
    }

    fn level(&self) -> Level {
        Level::Block
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        Some(self.parse(src))
    }

    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String> {
        Some(renderer.render_builtin(token))
    }

    fn resolve<'a>(&'a self, _token: &'a mut Token, _ordinal: usize) -> BoxFuture<'a, Result<()>> {
        future::ready(Ok(())).boxed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Conversion
// ─────────────────────────────────────────────────────────────────────────────

struct Converter<'s> {
    source_lines: Vec<&'s str>,
    table: &'s PlaceholderTable,
    lines: &'s LineMap,
}

impl Converter<'_> {
    /// Convert a comrak node; text nodes may expand into several tokens.
    fn convert<'a>(&self, node: &'a AstNode<'a>) -> Vec<Token> {
        let ast = node.data.borrow();
        let sourcepos = ast.sourcepos;

        if let NodeValue::Text(text) = &ast.value {
            return self.split_text(text, sourcepos);
        }

        if let NodeValue::Paragraph = ast.value {
            if let Some(block) = self.lone_block_placeholder(node) {
                return vec![block];
            }
        }

        let kind = match self.convert_value(&ast.value) {
            Some(kind) => kind,
            // Unsupported container: keep its content.
            None => return node.children().flat_map(|child| self.convert(child)).collect(),
        };

        let mut children: Vec<Token> = node
            .children()
            .flat_map(|child| self.convert(child))
            .collect();

        if let TokenKind::Table { alignments } = &kind {
            mark_table_cells(&mut children, alignments);
        }

        vec![Token::new(kind, self.raw_span(sourcepos))
            .with_lines(
                self.lines.original(sourcepos.start.line),
                self.lines.original(sourcepos.end.line),
            )
            .with_children(children)]
    }

    /// Convert a comrak NodeValue to our TokenKind; `None` for unsupported nodes.
    fn convert_value(&self, value: &NodeValue) -> Option<TokenKind> {
        let kind = match value {
            NodeValue::Document => TokenKind::Document,
            NodeValue::BlockQuote => TokenKind::BlockQuote,
            NodeValue::List(list) => TokenKind::List {
                ordered: list.list_type == ListType::Ordered,
                start: list.start,
                tight: list.tight,
            },
            NodeValue::Item(_) => TokenKind::Item,
            NodeValue::TaskItem(symbol) => TokenKind::TaskItem {
                checked: symbol.is_some(),
            },
            NodeValue::CodeBlock(code) => TokenKind::CodeBlock {
                info: self.table.restore(&code.info),
                literal: self.table.restore(&code.literal),
            },
            NodeValue::HtmlBlock(html) => TokenKind::HtmlBlock(self.table.restore(&html.literal)),
            NodeValue::Paragraph => TokenKind::Paragraph,
            NodeValue::Heading(heading) => TokenKind::Heading {
                level: heading.level,
            },
            NodeValue::ThematicBreak => TokenKind::ThematicBreak,
            NodeValue::Table(table) => TokenKind::Table {
                alignments: table.alignments.iter().map(|a| convert_alignment(*a)).collect(),
            },
            NodeValue::TableRow(header) => TokenKind::TableRow { header: *header },
            NodeValue::TableCell => TokenKind::TableCell {
                header: false,
                alignment: Alignment::None,
            },
            NodeValue::SoftBreak => TokenKind::SoftBreak,
            NodeValue::LineBreak => TokenKind::LineBreak,
            NodeValue::Code(code) => TokenKind::CodeSpan(self.table.restore(&code.literal)),
            NodeValue::HtmlInline(html) => TokenKind::HtmlInline(self.table.restore(html)),
            NodeValue::Emph => TokenKind::Emphasis,
            NodeValue::Strong => TokenKind::Strong,
            NodeValue::Strikethrough => TokenKind::Strikethrough,
            NodeValue::Link(link) => TokenKind::Link {
                url: self.table.restore(&link.url),
                title: self.table.restore(&link.title),
            },
            NodeValue::Image(image) => TokenKind::Image {
                url: self.table.restore(&image.url),
                title: self.table.restore(&image.title),
            },
            _ => return None,
        };
        Some(kind)
    }

    /// Split a text node at placeholders.
    fn split_text(&self, text: &str, sourcepos: Sourcepos) -> Vec<Token> {
        let start = self.lines.original(sourcepos.start.line);
        let end = self.lines.original(sourcepos.end.line);

        self.table
            .split(text)
            .into_iter()
            .filter_map(|part| match part {
                Ok(plain) => Some(
                    Token::new(TokenKind::Text(plain.to_string()), plain).with_lines(start, end),
                ),
                Err(index) => self.table.get(index).cloned(),
            })
            .collect()
    }

    /// A paragraph holding nothing but one block placeholder is that block.
    fn lone_block_placeholder<'a>(&self, node: &'a AstNode<'a>) -> Option<Token> {
        let mut children = node.children();
        let only = children.next()?;
        if children.next().is_some() {
            return None;
        }

        let ast = only.data.borrow();
        let NodeValue::Text(text) = &ast.value else {
            return None;
        };

        let parts = self.table.split(text.trim());
        let block = match parts.as_slice() {
            [Err(index)] if self.table.is_block(*index) => self.table.get(*index).cloned(),
            _ => None,
        };
        block
    }

    /// Source text covered by `sourcepos`, with placeholders restored.
    fn raw_span(&self, sourcepos: Sourcepos) -> String {
        let (start, end) = (sourcepos.start, sourcepos.end);
        if start.line == 0 || end.line < start.line || start.line > self.source_lines.len() {
            return String::new();
        }

        let last = end.line.min(self.source_lines.len());
        let mut raw = String::new();
        for line_no in start.line..=last {
            let line = self.source_lines[line_no - 1];
            let from = if line_no == start.line {
                start.column.saturating_sub(1)
            } else {
                0
            };
            let to = if line_no == end.line {
                end.column.min(line.len())
            } else {
                line.len()
            };
            match line.get(from..to.max(from)) {
                Some(slice) => raw.push_str(slice),
                None => raw.push_str(line),
            }
        }

        self.table.restore(raw.trim_end_matches('\n'))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inline Regions
// ─────────────────────────────────────────────────────────────────────────────

fn collect_regions<'a>(
    node: &'a AstNode<'a>,
    quoted: bool,
    lines: &[(usize, &str)],
    out: &mut Vec<Range<usize>>,
) {
    let ast = node.data.borrow();
    let (first, last) = (ast.sourcepos.start.line, ast.sourcepos.end.line);
    let known = first >= 1 && first <= last && last <= lines.len();

    match &ast.value {
        NodeValue::Paragraph | NodeValue::Heading(_) if known => {
            let content: Vec<usize> = (first..=last)
                .filter(|&n| !is_setext_underline(&ast.value, n == last && n > first, lines[n - 1].1))
                .collect();
            push_lines(&content, quoted, lines, out);
        }
        NodeValue::TableRow(_) if known => {
            for n in first..=last {
                push_cells(lines[n - 1], out);
            }
        }
        NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableRow(_) => {}
        NodeValue::BlockQuote => {
            for child in node.children() {
                collect_regions(child, true, lines, out);
            }
        }
        _ => {
            for child in node.children() {
                collect_regions(child, quoted, lines, out);
            }
        }
    }
}

/// Whether `line`, the last line of a multi-line heading, is its setext underline.
fn is_setext_underline(value: &NodeValue, last_of_many: bool, line: &str) -> bool {
    let NodeValue::Heading(heading) = value else {
        return false;
    };
    if !heading.setext || !last_of_many {
        return false;
    }
    let marks = line.trim_start_matches([' ', '>']).trim_end();
    !marks.is_empty() && (marks.bytes().all(|b| b == b'=') || marks.bytes().all(|b| b == b'-'))
}

/// Push consecutive line numbers as one range, or one range per line when `split`.
fn push_lines(numbers: &[usize], split: bool, lines: &[(usize, &str)], out: &mut Vec<Range<usize>>) {
    let span = |n: usize| {
        let (start, text) = lines[n - 1];
        start..start + text.len()
    };

    if split {
        out.extend(numbers.iter().map(|&n| span(n)));
        return;
    }
    if let (Some(&first), Some(&last)) = (numbers.first(), numbers.last()) {
        out.push(span(first).start..span(last).end);
    }
}

/// One range per table cell of a row line, split at unescaped pipes.
fn push_cells((start, line): (usize, &str), out: &mut Vec<Range<usize>>) {
    let bytes = line.as_bytes();
    let mut cell = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'|' => {
                out.push(start + cell..start + idx);
                idx += 1;
                cell = idx;
            }
            _ => idx += 1,
        }
    }
    out.push(start + cell..start + bytes.len());
}

fn convert_alignment(align: TableAlignment) -> Alignment {
    match align {
        TableAlignment::None => Alignment::None,
        TableAlignment::Left => Alignment::Left,
        TableAlignment::Center => Alignment::Center,
        TableAlignment::Right => Alignment::Right,
    }
}

/// Copy the row's header flag and the column alignment onto every cell.
fn mark_table_cells(rows: &mut [Token], alignments: &[Alignment]) {
    for row in rows.iter_mut() {
        let header = matches!(row.kind, TokenKind::TableRow { header: true });
        for (column, cell) in row.children.iter_mut().enumerate() {
            if let TokenKind::TableCell { .. } = cell.kind {
                cell.kind = TokenKind::TableCell {
                    header,
                    alignment: alignments.get(column).copied().unwrap_or_default(),
                };
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
