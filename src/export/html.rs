//! HTML Export Generation
//!
//! This module wraps rendered preview HTML into a complete document with
//! inlined CSS for standalone viewing.

use std::path::Path;

use log::info;

use crate::error::{Error, Result};
use crate::markdown::escape_attr;

const DEFAULT_TITLE: &str = "Exported Document";

// ─────────────────────────────────────────────────────────────────────────────
// HTML Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Generate a complete HTML document around an already rendered body.
///
/// # Arguments
///
/// * `body_html` - HTML produced by the rendering pipeline
/// * `title` - Optional document title; escaped before insertion
///
/// # Returns
///
/// A complete HTML document as a string.
pub fn generate_html_document(body_html: &str, title: Option<&str>) -> String {
    let doc_title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="generator" content="mdpane">
    <title>{title}</title>
    <style>
{base_css}
{color_css}
    </style>
</head>
<body>
    <article class="markdown-body">
{body}
    </article>
</body>
</html>
"#,
        title = escape_attr(doc_title),
        base_css = BASE_CSS,
        color_css = COLOR_CSS,
        body = body_html.trim_end(),
    )
}

/// Title for an exported file: its file stem, when it has a usable one.
pub fn title_from_path(path: &Path) -> Option<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
}

/// Write an HTML document to `output_path`.
pub fn write_html_file(output_path: &Path, html: &str) -> Result<()> {
    std::fs::write(output_path, html).map_err(|source| Error::FileWrite {
        path: output_path.to_path_buf(),
        source,
    })?;
    info!("Exported HTML to {}", output_path.display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// CSS
// ─────────────────────────────────────────────────────────────────────────────

/// Base CSS for markdown rendering (layout, typography).
const BASE_CSS: &str = r#"
*, *::before, *::after {
    box-sizing: border-box;
}

body {
    margin: 0;
    padding: 0;
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Noto Sans', Helvetica, Arial, sans-serif;
    font-size: 16px;
    line-height: 1.6;
}

.markdown-body {
    max-width: 900px;
    margin: 0 auto;
    padding: 32px 24px;
}

.markdown-body h1,
.markdown-body h2,
.markdown-body h3,
.markdown-body h4,
.markdown-body h5,
.markdown-body h6 {
    margin-top: 24px;
    margin-bottom: 16px;
    font-weight: 600;
    line-height: 1.25;
}

.markdown-body h1 { font-size: 2em; border-bottom: 1px solid; padding-bottom: 0.3em; }
.markdown-body h2 { font-size: 1.5em; border-bottom: 1px solid; padding-bottom: 0.3em; }
.markdown-body h3 { font-size: 1.25em; }

.markdown-body p,
.markdown-body ul,
.markdown-body ol,
.markdown-body blockquote,
.markdown-body table,
.markdown-body pre {
    margin-top: 0;
    margin-bottom: 16px;
}

.markdown-body ul,
.markdown-body ol {
    padding-left: 2em;
}

.markdown-body li > input[type="checkbox"] {
    margin-right: 0.4em;
}

.markdown-body blockquote {
    padding: 0 1em;
    border-left: 4px solid;
}

.markdown-body code {
    font-family: 'JetBrains Mono', 'Fira Code', 'Consolas', 'Monaco', monospace;
    font-size: 0.9em;
}

.markdown-body pre {
    padding: 16px;
    overflow: auto;
    border-radius: 6px;
    line-height: 1.45;
}

/* Rendered diagrams */
.markdown-body pre.mermaid,
.markdown-body pre.plantuml {
    padding: 0;
    text-align: center;
    background: transparent;
}

.markdown-body pre.mermaid svg,
.markdown-body pre.plantuml svg {
    max-width: 100%;
    height: auto;
}

/* Math is typeset client-side; keep the source readable until then */
.markdown-body .math-block {
    margin-bottom: 16px;
    overflow-x: auto;
    white-space: pre;
    text-align: center;
}

.markdown-body hr {
    height: 2px;
    margin: 24px 0;
    border: none;
}

.markdown-body img {
    max-width: 100%;
    height: auto;
}
"#;

/// Light and dark palettes, chosen by the viewer's color scheme.
const COLOR_CSS: &str = r#"
:root { color-scheme: light dark; }

body { background-color: #ffffff; color: #1f2328; }
.markdown-body a { color: #0969da; }
.markdown-body code, .markdown-body pre { background-color: #f6f8fa; }
.markdown-body blockquote { color: #59636e; border-color: #d1d9e0; }
.markdown-body hr, .markdown-body h1, .markdown-body h2 { border-color: #d1d9e0; background-color: #d1d9e0; }
.markdown-body th, .markdown-body td { border-color: #d1d9e0; }

@media (prefers-color-scheme: dark) {
    body { background-color: #0d1117; color: #e6edf3; }
    .markdown-body a { color: #4493f8; }
    .markdown-body code, .markdown-body pre { background-color: #161b22; }
    .markdown-body blockquote { color: #9198a1; border-color: #3d444d; }
    .markdown-body hr, .markdown-body h1, .markdown-body h2 { border-color: #3d444d; background-color: #3d444d; }
    .markdown-body th, .markdown-body td { border-color: #3d444d; }
}
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
