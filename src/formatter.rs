//! Response Formatter
//!
//! Turns markdown-ish completion output into typed display blocks. Headings
//! (`#`, `##`, `###`) and pipe tables are recognized line by line; everything
//! else is paragraph or list text. Malformed markup is kept as plain text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref INLINE: Regex = Regex::new(
        r"\*\*(?P<strong>.+?)\*\*|__(?P<strong_u>.+?)__|`(?P<code>[^`]+)`|\*(?P<em>[^*\s][^*]*?)\*|\b_(?P<em_u>[^_]+?)_\b"
    )
    .unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n").unwrap();
    static ref LIST_MARKER: Regex = Regex::new(r"^(?:(?P<bullet>[-•*])|(?P<number>\d+)\.)\s+").unwrap();
    static ref SEPARATOR_CELL: Regex = Regex::new(r"^:?-+:?$").unwrap();
}

/// Inline span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    Code(String),
}

pub type Spans = Vec<Inline>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, inlines: Spans },
    Paragraph { inlines: Spans },
    List { ordered: bool, items: Vec<Spans> },
    Table { headers: Vec<Spans>, rows: Vec<Vec<Spans>> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormattedResponse {
    pub blocks: Vec<Block>,
}

/// Parse completion text into display blocks
pub fn format(markdown: &str) -> FormattedResponse {
    let mut blocks = Vec::new();
    let mut text_lines: Vec<&str> = Vec::new();
    let mut table_lines: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('|') {
            flush_text(&mut text_lines, &mut blocks);
            table_lines.push(trimmed);
            continue;
        }
        flush_table(&mut table_lines, &mut blocks);

        if let Some((level, title)) = heading(trimmed) {
            flush_text(&mut text_lines, &mut blocks);
            blocks.push(Block::Heading { level, inlines: parse_inline(title) });
        } else {
            text_lines.push(line);
        }
    }
    flush_text(&mut text_lines, &mut blocks);
    flush_table(&mut table_lines, &mut blocks);

    FormattedResponse { blocks }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 {
        return None;
    }
    let title = line[hashes..].strip_prefix(' ')?.trim();
    if title.is_empty() {
        return None;
    }
    Some((hashes.min(3) as u8, title))
}

fn flush_table(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if lines.is_empty() {
        return;
    }

    let mut parsed = lines
        .drain(..)
        .map(split_cells)
        .filter(|cells| !cells.iter().all(|c| SEPARATOR_CELL.is_match(c)));

    let Some(headers) = parsed.next() else { return };
    let rows = parsed
        .map(|cells| cells.iter().map(|c| parse_inline(c)).collect())
        .collect();

    blocks.push(Block::Table {
        headers: headers.iter().map(|c| parse_inline(c)).collect(),
        rows,
    });
}

fn split_cells(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn flush_text(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join("\n");
    lines.clear();

    for chunk in BLANK_LINES.split(&text) {
        if !chunk.trim().is_empty() {
            push_chunk(chunk, blocks);
        }
    }
}

/// One blank-line-delimited chunk; may mix prose and list lines
fn push_chunk(chunk: &str, blocks: &mut Vec<Block>) {
    let mut prose: Vec<&str> = Vec::new();
    let mut list: Option<(bool, Vec<String>)> = None;

    let flush_prose = |prose: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !prose.is_empty() {
            blocks.push(Block::Paragraph { inlines: parse_inline(&prose.join(" ")) });
            prose.clear();
        }
    };
    let flush_list = |list: &mut Option<(bool, Vec<String>)>, blocks: &mut Vec<Block>| {
        if let Some((ordered, items)) = list.take() {
            blocks.push(Block::List {
                ordered,
                items: items.iter().map(|item| parse_inline(item)).collect(),
            });
        }
    };

    for line in chunk.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(marker) = LIST_MARKER.captures(trimmed) {
            let ordered = marker.name("number").is_some();
            let item = trimmed[marker.get(0).map_or(0, |m| m.end())..].to_string();
            flush_prose(&mut prose, blocks);
            match list.as_mut() {
                Some((current, items)) if *current == ordered => items.push(item),
                _ => {
                    flush_list(&mut list, blocks);
                    list = Some((ordered, vec![item]));
                }
            }
            continue;
        }

        let continuation = line.starts_with(char::is_whitespace);
        match list.as_mut().and_then(|(_, items)| items.last_mut()) {
            Some(last) if continuation => {
                last.push(' ');
                last.push_str(trimmed);
            }
            _ => {
                flush_list(&mut list, blocks);
                prose.push(trimmed);
            }
        }
    }

    flush_prose(&mut prose, blocks);
    flush_list(&mut list, blocks);
}

/// Bold, italic and code spans; unmatched markers stay literal
pub fn parse_inline(text: &str) -> Spans {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in INLINE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(&mut spans, &text[last..whole.start()]);

        let span = if let Some(m) = caps.name("strong").or_else(|| caps.name("strong_u")) {
            Inline::Strong(m.as_str().to_string())
        } else if let Some(m) = caps.name("code") {
            Inline::Code(m.as_str().to_string())
        } else if let Some(m) = caps.name("em").or_else(|| caps.name("em_u")) {
            Inline::Emphasis(m.as_str().to_string())
        } else {
            Inline::Text(whole.as_str().to_string())
        };
        spans.push(span);
        last = whole.end();
    }
    push_text(&mut spans, &text[last..]);
    spans
}

fn push_text(spans: &mut Spans, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(previous)) = spans.last_mut() {
        previous.push_str(text);
    } else {
        spans.push(Inline::Text(text.to_string()));
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn spans_html(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(t) => escape_html(t),
            Inline::Strong(t) => format!("<strong>{}</strong>", escape_html(t)),
            Inline::Emphasis(t) => format!("<em>{}</em>", escape_html(t)),
            Inline::Code(t) => format!("<code>{}</code>", escape_html(t)),
        })
        .collect()
}

impl FormattedResponse {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"formatted-response\">\n");
        for block in &self.blocks {
            match block {
                Block::Heading { level, inlines } => {
                    let class = match level {
                        1 => "response-title",
                        2 => "response-heading",
                        _ => "response-subheading",
                    };
                    html.push_str(&format!(
                        "<h{level} class=\"{class}\">{}</h{level}>\n",
                        spans_html(inlines),
                        level = level,
                        class = class
                    ));
                }
                Block::Paragraph { inlines } => {
                    html.push_str(&format!("<p class=\"response-paragraph\">{}</p>\n", spans_html(inlines)));
                }
                Block::List { ordered, items } => {
                    let tag = if *ordered { "ol" } else { "ul" };
                    html.push_str(&format!("<{} class=\"response-list\">\n", tag));
                    for item in items {
                        html.push_str(&format!("<li>{}</li>\n", spans_html(item)));
                    }
                    html.push_str(&format!("</{}>\n", tag));
                }
                Block::Table { headers, rows } => {
                    html.push_str("<table class=\"data-table\">\n<thead>\n<tr>");
                    for header in headers {
                        html.push_str(&format!("<th>{}</th>", spans_html(header)));
                    }
                    html.push_str("</tr>\n</thead>\n<tbody>\n");
                    for row in rows {
                        html.push_str("<tr>");
                        for cell in row {
                            html.push_str(&format!("<td>{}</td>", spans_html(cell)));
                        }
                        html.push_str("</tr>\n");
                    }
                    html.push_str("</tbody>\n</table>\n");
                }
            }
        }
        html.push_str("</div>");
        html
    }
}
