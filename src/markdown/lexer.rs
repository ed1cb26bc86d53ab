//! Extension-first scanning.
//!
//! Registered extensions get the first look at the input. Every span they
//! claim is cut out of the source and replaced by a placeholder made of two
//! private-use characters around the token's index. The substituted source is
//! then handed to the built-in grammar, which splits the placeholders back out
//! into extension tokens while converting the comrak AST.
//!
//! Block extensions are tried at every line start outside fenced code, and
//! again inside block quotes and list items with the container prefix
//! stripped. Inline extensions are tried only inside the inline content the
//! built-in grammar finds (paragraphs, headings, table cells) at the offsets
//! their `start()` reports, skipping backslash escapes, code spans, raw tags
//! and placeholders.

use std::sync::Arc;

use log::debug;

use super::extension::{Extension, Level};
use super::parser::BuiltinGrammar;
use super::token::Token;
use crate::error::{Error, Result};

/// Opens a placeholder.
pub(crate) const PLACEHOLDER_OPEN: char = '\u{E000}';
/// Closes a placeholder.
pub(crate) const PLACEHOLDER_CLOSE: char = '\u{E001}';

// ─────────────────────────────────────────────────────────────────────────────
// Placeholder Table
// ─────────────────────────────────────────────────────────────────────────────

/// Extension tokens cut out of the source, indexed by placeholder number.
#[derive(Debug, Default)]
pub(crate) struct PlaceholderTable {
    tokens: Vec<(Token, Level)>,
}

impl PlaceholderTable {
    /// Store a token and return the placeholder text standing in for it.
    fn insert(&mut self, token: Token, level: Level) -> String {
        let index = self.tokens.len();
        self.tokens.push((token, level));
        format!("{}{}{}", PLACEHOLDER_OPEN, index, PLACEHOLDER_CLOSE)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index).map(|(token, _)| token)
    }

    /// Whether the placeholder at `index` stands for a block-level token.
    pub(crate) fn is_block(&self, index: usize) -> bool {
        matches!(self.tokens.get(index), Some((_, Level::Block)))
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Move the source lines of every token from `from` on down by `offset`.
    fn shift_lines(&mut self, from: usize, offset: usize) {
        for (token, _) in self.tokens.iter_mut().skip(from) {
            token.start_line += offset;
            token.end_line += offset;
        }
    }

    /// Split `text` at placeholders.
    ///
    /// Plain runs come back as `Ok(&str)`, placeholders as `Err(index)`.
    /// Malformed or unknown placeholders stay in the plain runs.
    pub(crate) fn split<'t>(&self, text: &'t str) -> Vec<std::result::Result<&'t str, usize>> {
        let mut parts = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find(PLACEHOLDER_OPEN) {
            let after = &rest[open + PLACEHOLDER_OPEN.len_utf8()..];
            let parsed = after.find(PLACEHOLDER_CLOSE).and_then(|close| {
                after[..close]
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index < self.tokens.len())
                    .map(|index| (index, close))
            });

            match parsed {
                Some((index, close)) => {
                    if open > 0 {
                        parts.push(Ok(&rest[..open]));
                    }
                    parts.push(Err(index));
                    rest = &after[close + PLACEHOLDER_CLOSE.len_utf8()..];
                }
                None => {
                    let keep = open + PLACEHOLDER_OPEN.len_utf8();
                    parts.push(Ok(&rest[..keep]));
                    rest = &rest[keep..];
                }
            }
        }

        if !rest.is_empty() {
            parts.push(Ok(rest));
        }
        parts
    }

    /// Replace every placeholder in `text` with the raw source it stands for.
    pub(crate) fn restore(&self, text: &str) -> String {
        if !text.contains(PLACEHOLDER_OPEN) {
            return text.to_string();
        }
        self.split(text)
            .into_iter()
            .map(|part| match part {
                Ok(plain) => plain,
                Err(index) => self.tokens[index].0.raw.as_str(),
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Line Bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Output buffer that remembers which input line each output line came from.
#[derive(Debug)]
struct Rewriter {
    out: String,
    /// `lines[n]` is the input line of output line `n + 1`
    lines: Vec<usize>,
}

impl Rewriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            lines: vec![1],
        }
    }

    /// Copy input text that begins on input line `line`.
    fn copy(&mut self, text: &str, line: usize) {
        let mut current = line;
        for ch in text.chars() {
            if ch == '\n' {
                current += 1;
                self.lines.push(current);
            }
        }
        self.out.push_str(text);
    }

    /// Emit generated text; every line it opens maps to `line`.
    fn synthetic(&mut self, text: &str, line: usize) {
        for ch in text.chars() {
            if ch == '\n' {
                self.lines.push(line);
            }
        }
        self.out.push_str(text);
    }

    /// Emit the output of a nested pass over a container body of `count` input
    /// lines beginning on input line `line`.
    ///
    /// `first` prefixes the first output line and `rest` every other one;
    /// blank lines keep only the non-space part of `rest`.
    fn nested(&mut self, out: &str, lines: &[usize], line: usize, count: usize, first: &str, rest: &str) {
        let total = out.split_inclusive('\n').count();
        for (idx, text) in out.split_inclusive('\n').enumerate() {
            let prefix = if idx == 0 { first } else { rest };
            if text.trim().is_empty() {
                self.out.push_str(rest.trim_end());
                self.out.push_str(text);
            } else {
                self.out.push_str(prefix);
                self.out.push_str(text);
            }
            if text.ends_with('\n') {
                let next = if idx + 1 == total {
                    line + count
                } else {
                    lines.get(idx + 1).map_or(line + count, |l| line - 1 + l)
                };
                self.lines.push(next);
            }
        }
    }

    /// Whether the output currently ends with a blank line (or is empty).
    fn at_blank_line(&self) -> bool {
        let body = self.out.strip_suffix('\n').unwrap_or(&self.out);
        if body.is_empty() {
            return true;
        }
        match body.rfind('\n') {
            Some(idx) => body[idx + 1..].trim().is_empty(),
            None => body.trim().is_empty(),
        }
    }
}

/// Maps lines of the substituted source back to lines of the original input.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineMap {
    lines: Vec<usize>,
}

impl LineMap {
    /// Original line for a 1-based line of the substituted source.
    pub(crate) fn original(&self, line: usize) -> usize {
        if line == 0 {
            return 0;
        }
        self.lines
            .get(line - 1)
            .or_else(|| self.lines.last())
            .copied()
            .unwrap_or(line)
    }

    /// Compose two passes: `outer` lines point into `inner` output.
    fn compose(inner: &[usize], outer: &[usize]) -> Self {
        let lines = outer
            .iter()
            .map(|&l| inner.get(l.saturating_sub(1)).copied().unwrap_or(l))
            .collect();
        Self { lines }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fences
// ─────────────────────────────────────────────────────────────────────────────

/// An open fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fence {
    pub ch: char,
    pub len: usize,
    pub indent: usize,
}

impl Fence {
    /// Recognize an opening fence line; returns the fence and its info string.
    pub(crate) fn open(line: &str) -> Option<(Fence, &str)> {
        let line = line.trim_end_matches(['\n', '\r']);
        let indent = leading_spaces(line);
        if indent > 3 {
            return None;
        }
        let rest = &line[indent..];
        let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = rest.chars().take_while(|c| *c == ch).count();
        if len < 3 {
            return None;
        }
        let info = &rest[len..];
        if ch == '`' && info.contains('`') {
            return None;
        }
        Some((Fence { ch, len, indent }, info.trim()))
    }

    /// Whether `line` closes this fence.
    pub(crate) fn closes(&self, line: &str) -> bool {
        let line = line.trim_end_matches(['\n', '\r']);
        let indent = leading_spaces(line);
        if indent > 3 {
            return false;
        }
        let rest = &line[indent..];
        let run = rest.chars().take_while(|c| *c == self.ch).count();
        run >= self.len && rest[run * self.ch.len_utf8()..].trim().is_empty()
    }
}

pub(crate) fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ').count()
}

/// Length in bytes of the line starting at the beginning of `src`, including its newline.
pub(crate) fn line_len(src: &str) -> usize {
    src.find('\n').map(|i| i + 1).unwrap_or(src.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexer
// ─────────────────────────────────────────────────────────────────────────────

/// Runs extensions ahead of the built-in grammar.
pub struct Lexer<'a> {
    extensions: &'a [Arc<dyn Extension>],
    grammar: &'a BuiltinGrammar,
}

impl<'a> Lexer<'a> {
    pub fn new(extensions: &'a [Arc<dyn Extension>], grammar: &'a BuiltinGrammar) -> Self {
        Self {
            extensions,
            grammar,
        }
    }

    /// Tokenize `markdown` into a document token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tokenize`] if an extension produces a token that does not
    /// describe a non-empty prefix of the input it was given.
    pub fn tokenize(&self, markdown: &str) -> Result<Token> {
        let source = normalize(markdown);
        let mut table = PlaceholderTable::default();

        let (blocks, block_lines) = self.block_pass(&source, &mut table)?;
        let block_map = LineMap { lines: block_lines };
        let (inlines, inline_lines) = self.inline_pass(&blocks, &block_map, &mut table)?;
        let line_map = LineMap::compose(&block_map.lines, &inline_lines);

        debug!(
            "Lexed {} bytes with {} extension token(s)",
            source.len(),
            table.len()
        );

        Ok(self.grammar.parse_substituted(&inlines, &table, &line_map))
    }

    fn block_pass(&self, src: &str, table: &mut PlaceholderTable) -> Result<(String, Vec<usize>)> {
        let mut rw = Rewriter::new();
        let mut fence: Option<Fence> = None;
        let mut pos = 0;
        let mut line = 1;

        while pos < src.len() {
            let rest = &src[pos..];
            let current = &rest[..line_len(rest)];

            if let Some(open) = fence {
                if open.closes(current) {
                    fence = None;
                }
                rw.copy(current, line);
                pos += current.len();
                line += 1;
                continue;
            }

            if let Some(token) = self.match_at(Level::Block, rest)? {
                let newlines = token.raw.matches('\n').count();
                let indent = &rest[..leading_spaces(rest).min(3)];
                let consumed = token.raw.len();

                if !rw.at_blank_line() {
                    rw.synthetic("\n", line);
                }
                let placeholder = table.insert(token.with_lines(line, line + newlines), Level::Block);
                rw.synthetic(&format!("{}{}\n", indent, placeholder), line);

                pos += consumed;
                line += newlines;
                if src[pos..].starts_with('\n') {
                    pos += 1;
                    line += 1;
                }
                if pos < src.len() {
                    rw.synthetic("\n", line);
                }
                continue;
            }

            if let Some(run) = ContainerRun::at(rest) {
                let before = table.len();
                let (inner, inner_lines) = self.block_pass(&run.body, table)?;

                if table.len() > before {
                    table.shift_lines(before, line - 1);
                    rw.nested(&inner, &inner_lines, line, run.lines, &run.first, &run.rest);
                    if ends_with_placeholder(&inner) && continues_lazily(&rest[run.text.len()..]) {
                        rw.synthetic("\n", line + run.lines);
                    }
                } else {
                    rw.copy(run.text, line);
                }
                pos += run.text.len();
                line += run.lines;
                continue;
            }

            if let Some((open, _)) = Fence::open(current) {
                fence = Some(open);
            }
            rw.copy(current, line);
            pos += current.len();
            line += 1;
        }

        Ok((rw.out, rw.lines))
    }

    fn inline_pass(
        &self,
        src: &str,
        block_map: &LineMap,
        table: &mut PlaceholderTable,
    ) -> Result<(String, Vec<usize>)> {
        let inline: Vec<&Arc<dyn Extension>> = self
            .extensions
            .iter()
            .filter(|ext| ext.level() == Level::Inline)
            .collect();

        let mut rw = Rewriter::new();
        if inline.is_empty() {
            rw.copy(src, 1);
            return Ok((rw.out, rw.lines));
        }

        let mut copied = 0;
        let mut line = 1;

        for region in self.grammar.inline_regions(src) {
            let gap = &src[copied..region.start];
            rw.copy(gap, line);
            line += gap.matches('\n').count();

            let text = &src[region.clone()];
            let segment = Segment {
                text,
                first_line: line,
            };
            self.scan_inline(segment, &inline, block_map, &mut rw, table)?;
            line += text.matches('\n').count();
            copied = region.end;
        }

        rw.copy(&src[copied..], line);
        Ok((rw.out, rw.lines))
    }

    /// Substitute inline extension spans in one run of inline content.
    fn scan_inline(
        &self,
        segment: Segment<'_>,
        inline: &[&Arc<dyn Extension>],
        block_map: &LineMap,
        rw: &mut Rewriter,
        table: &mut PlaceholderTable,
    ) -> Result<()> {
        let text = segment.text;
        // Cached absolute offsets from each extension's `start()`; usize::MAX
        // means the extension cannot match anywhere in the rest of `text`.
        let mut next_start = vec![0usize; inline.len()];
        let mut stale = vec![true; inline.len()];

        let mut copied = 0;
        let mut line = segment.first_line;
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let ch = match rest.chars().next() {
                Some(ch) => ch,
                None => break,
            };

            let skip = match ch {
                '\\' => rest.chars().nth(1).map_or(1, |c| 1 + c.len_utf8()),
                '`' => code_span_len(rest),
                '<' => tag_len(rest),
                PLACEHOLDER_OPEN => rest
                    .find(PLACEHOLDER_CLOSE)
                    .map_or(ch.len_utf8(), |i| i + PLACEHOLDER_CLOSE.len_utf8()),
                _ => 0,
            };
            if skip > 0 {
                pos += skip;
                continue;
            }

            let mut matched = None;
            for (k, ext) in inline.iter().enumerate() {
                if stale[k] || (next_start[k] != usize::MAX && next_start[k] < pos) {
                    next_start[k] = ext.start(rest).map_or(usize::MAX, |off| pos + off);
                    stale[k] = false;
                }
                if next_start[k] != pos {
                    continue;
                }
                match ext.tokenize(rest) {
                    Some(token) => {
                        matched = Some(validate(ext.as_ref(), token, rest)?);
                        break;
                    }
                    None => stale[k] = true,
                }
            }

            match matched {
                Some(token) => {
                    let before = &text[copied..pos];
                    rw.copy(before, line);
                    line += before.matches('\n').count();

                    let consumed = token.raw.len();
                    let newlines = token.raw.matches('\n').count();
                    let placeholder = table.insert(
                        token.with_lines(
                            block_map.original(line),
                            block_map.original(line + newlines),
                        ),
                        Level::Inline,
                    );
                    rw.synthetic(&placeholder, line);
                    line += newlines;

                    pos += consumed;
                    copied = pos;
                    for flag in stale.iter_mut() {
                        *flag = true;
                    }
                }
                None => {
                    // Re-query extensions that just failed from the next char on.
                    for (k, ext) in inline.iter().enumerate() {
                        if stale[k] {
                            let from = pos + ch.len_utf8();
                            next_start[k] = ext.start(&text[from..]).map_or(usize::MAX, |off| from + off);
                            stale[k] = false;
                        }
                    }
                    pos += ch.len_utf8();
                }
            }
        }

        rw.copy(&text[copied..], line);
        Ok(())
    }

    fn match_at(&self, level: Level, src: &str) -> Result<Option<Token>> {
        for ext in self.extensions.iter().filter(|ext| ext.level() == level) {
            if let Some(token) = ext.tokenize(src) {
                return validate(ext.as_ref(), token, src).map(Some);
            }
        }
        Ok(None)
    }
}

/// A run of inline content, starting on `first_line` of the block pass output.
struct Segment<'s> {
    text: &'s str,
    first_line: usize,
}

/// Reject tokens that would stall the scanner or do not belong to their extension.
fn validate(ext: &dyn Extension, token: Token, src: &str) -> Result<Token> {
    if token.raw.is_empty() {
        return Err(Error::Tokenize {
            extension: ext.name(),
            message: "matched an empty span".to_string(),
        });
    }
    if !src.starts_with(&token.raw) {
        return Err(Error::Tokenize {
            extension: ext.name(),
            message: "token source is not a prefix of the input".to_string(),
        });
    }
    if token.extension_name() != Some(ext.name()) {
        return Err(Error::Tokenize {
            extension: ext.name(),
            message: "token is not tagged with the extension's name".to_string(),
        });
    }
    Ok(token)
}

// ─────────────────────────────────────────────────────────────────────────────
// Containers
// ─────────────────────────────────────────────────────────────────────────────

/// A block quote or list item whose content is lexed again with its prefix stripped.
#[derive(Debug)]
struct ContainerRun<'s> {
    /// Source lines covered by the container
    text: &'s str,
    lines: usize,
    /// Content with the container prefix removed from every line
    body: String,
    /// Prefix restored on the first output line
    first: String,
    /// Prefix restored on every other output line
    rest: String,
}

impl<'s> ContainerRun<'s> {
    /// Recognize a container starting at the beginning of `src`.
    ///
    /// A quote runs while lines keep their `>` marker. A list item runs while
    /// lines are blank or indented to its content column; trailing blank lines
    /// are left out.
    fn at(src: &'s str) -> Option<Self> {
        let first = &src[..line_len(src)];

        if quote_marker(first).is_some() {
            let mut body = String::new();
            let mut end = 0;
            let mut lines = 0;
            while end < src.len() {
                let current = &src[end..end + line_len(&src[end..])];
                let Some(strip) = quote_marker(current) else {
                    break;
                };
                body.push_str(&current[strip..]);
                end += current.len();
                lines += 1;
            }
            return Some(Self {
                text: &src[..end],
                lines,
                body,
                first: "> ".to_string(),
                rest: "> ".to_string(),
            });
        }

        let width = list_marker(first)?;
        let mut body = first[width..].to_string();
        let mut end = first.len();
        let mut lines = 1;
        let mut scan = end;
        let mut blanks = 0;

        while scan < src.len() {
            let current = &src[scan..scan + line_len(&src[scan..])];
            scan += current.len();
            if current.trim().is_empty() {
                blanks += 1;
                continue;
            }
            if leading_spaces(current) < width {
                break;
            }
            for _ in 0..blanks {
                body.push('\n');
            }
            body.push_str(&current[width..]);
            lines += blanks + 1;
            blanks = 0;
            end = scan;
        }

        Some(Self {
            text: &src[..end],
            lines,
            body,
            first: first[..width].to_string(),
            rest: " ".repeat(width),
        })
    }
}

/// Length of a block quote marker (`>` and one optional space) opening `line`.
fn quote_marker(line: &str) -> Option<usize> {
    let indent = leading_spaces(line);
    if indent > 3 || !line[indent..].starts_with('>') {
        return None;
    }
    let marker = indent + 1;
    Some(if line[marker..].starts_with(' ') {
        marker + 1
    } else {
        marker
    })
}

/// Content column of a list item opening `line` (`-`, `+`, `*`, `1.` or `1)`).
fn list_marker(line: &str) -> Option<usize> {
    let line = line.trim_end_matches(['\n', '\r']);
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = match rest.bytes().next()? {
        b'-' | b'+' | b'*' => 1,
        b'0'..=b'9' => {
            let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
            if digits > 9 || !matches!(rest.as_bytes().get(digits), Some(b'.' | b')')) {
                return None;
            }
            digits + 1
        }
        _ => return None,
    };

    let content = &rest[marker..];
    let spaces = leading_spaces(content);
    if spaces == 0 || content.trim().is_empty() {
        return None;
    }
    // Five or more spaces start an indented code block after a one-space gap.
    let gap = if spaces > 4 { 1 } else { spaces };
    Some(indent + marker + gap)
}

/// Whether the last line of `out` is a lone placeholder.
fn ends_with_placeholder(out: &str) -> bool {
    out.trim_end().ends_with(PLACEHOLDER_CLOSE)
}

/// Whether `rest` starts with a line that would continue a container's
/// paragraph lazily instead of opening a block of its own.
fn continues_lazily(rest: &str) -> bool {
    let next = &rest[..line_len(rest)];
    !next.trim().is_empty() && quote_marker(next).is_none() && list_marker(next).is_none()
}

/// Normalize line endings and neutralize characters reserved for placeholders.
fn normalize(markdown: &str) -> String {
    markdown
        .replace("\r\n", "\n")
        .replace([PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE], "\u{FFFD}")
}

/// Length of the code span starting at `src` (which begins with a backtick),
/// or of the bare backtick run when the span is never closed.
fn code_span_len(src: &str) -> usize {
    let run = src.bytes().take_while(|b| *b == b'`').count();
    let mut idx = run;
    let bytes = src.as_bytes();

    while idx < bytes.len() {
        if bytes[idx] == b'`' {
            let close = bytes[idx..].iter().take_while(|b| **b == b'`').count();
            if close == run {
                return idx + close;
            }
            idx += close;
        } else {
            idx += 1;
        }
    }
    run
}

/// Length of a raw tag or autolink (`<...>` on one line), or 0 if `src` does not start one.
fn tag_len(src: &str) -> usize {
    let mut chars = src.chars().skip(1);
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!' => {}
        _ => return 0,
    }
    for (idx, ch) in src.char_indices().skip(1) {
        match ch {
            '>' => return idx + 1,
            '<' | '\n' => return 0,
            _ => {}
        }
    }
    0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
