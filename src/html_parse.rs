//! Lenient HTML reader producing the document model for PDF layout.
//!
//! This is not an HTML5 parser. It walks `quick-xml` events with end-tag
//! checking disabled, so unclosed `<meta>`/`<p>` tags and unquoted
//! attributes are tolerated, and maps the elements the PDF renderer
//! understands onto [`Block`]s. Everything else contributes its text only.

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

use crate::error::Error;
use crate::model::{Block, Cell, Document, Image, Inline, ListItem, Paragraph, ParagraphKind, Run, Table};

// Script and style bodies may contain `<` that would derail the tokenizer.
static RAW_TEXT_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("raw text pattern")
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "figure",
    "figcaption", "address", "dl", "dt", "dd", "details", "summary", "caption", "center", "form",
    "fieldset", "body", "html",
];

pub fn parse(html: &str) -> Result<Document, Error> {
    let html = RAW_TEXT_ELEMENTS.replace_all(html, "");
    let mut reader = Reader::from_str(&html);
    reader.config_mut().check_end_names = false;

    let mut builder = Builder::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = tag_name(&e);
                builder.start(&name, &e);
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    builder.end(&name);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(&e);
                builder.start(&name, &e);
                builder.end(&name);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                builder.end(&name);
            }
            Ok(Event::Text(t)) => builder.text(&decode_entities(&String::from_utf8_lossy(&t))),
            Ok(Event::CData(c)) => builder.text(&String::from_utf8_lossy(&c)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Html(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }
    Ok(builder.finish())
}

fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.html_attributes().flatten().find_map(|attr| {
        attr.key
            .local_name()
            .as_ref()
            .eq_ignore_ascii_case(key.as_bytes())
            .then(|| decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned())
    })
}

/// Decode character references. Unknown named references are kept verbatim.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| entity(&after[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "euro" => '\u{20ac}',
        "yen" => '\u{a5}',
        "pound" => '\u{a3}',
        "times" => '\u{d7}',
        "deg" => '\u{b0}',
        "sect" => '\u{a7}',
        _ => return None,
    };
    Some(c)
}

enum OpenKind {
    Paragraph(ParagraphKind),
    ListItem { ordered: bool, level: u8, label: String },
}

struct Open {
    kind: OpenKind,
    inlines: Vec<Inline>,
}

struct ListState {
    ordered: bool,
    next: u32,
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<Cell>>,
    row: Option<Vec<Cell>>,
    cell: Option<Cell>,
    header_cell: bool,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    current: Option<Open>,
    bold: u32,
    italic: u32,
    underline: u32,
    strike: u32,
    mono: u32,
    links: Vec<Option<String>>,
    lists: Vec<ListState>,
    tables: Vec<TableState>,
    quote_depth: u32,
    pre_depth: u32,
    skip_depth: u32,
    in_title: bool,
    title: String,
    trailing_space: bool,
}

impl Builder {
    fn start(&mut self, name: &str, e: &BytesStart) {
        if name == "title" {
            self.in_title = true;
            return;
        }
        if SKIPPED_ELEMENTS.contains(&name) {
            self.skip_depth += 1;
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<u8>().unwrap_or(1);
                self.open_block(OpenKind::Paragraph(ParagraphKind::Heading(level)));
            }
            "pre" => {
                self.pre_depth += 1;
                self.open_block(OpenKind::Paragraph(ParagraphKind::Preformatted));
            }
            "blockquote" => {
                self.flush();
                self.quote_depth += 1;
            }
            "ul" | "ol" => {
                self.flush();
                let next = attribute(e, "start")
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or(1);
                self.lists.push(ListState { ordered: name == "ol", next });
            }
            "li" => {
                let level = self.lists.len().saturating_sub(1).min(u8::MAX as usize) as u8;
                let (ordered, label) = match self.lists.last_mut() {
                    Some(list) if list.ordered => {
                        let label = format!("{}.", list.next);
                        list.next += 1;
                        (true, label)
                    }
                    _ => (false, "\u{2022}".to_string()),
                };
                self.open_block(OpenKind::ListItem { ordered, level, label });
            }
            "table" => {
                self.flush();
                self.tables.push(TableState::default());
            }
            "tr" => {
                self.close_cell();
                if let Some(table) = self.tables.last_mut() {
                    finish_row(table);
                    table.row = Some(Vec::new());
                }
            }
            "td" | "th" => {
                self.close_cell();
                if let Some(table) = self.tables.last_mut() {
                    if table.row.is_none() {
                        table.row = Some(Vec::new());
                    }
                    table.cell = Some(Vec::new());
                    table.header_cell = name == "th";
                    if table.header_cell {
                        self.bold += 1;
                    }
                }
            }
            "hr" => {
                self.flush();
                self.push_block(Block::Rule);
            }
            "br" => {
                if self.current.is_some() {
                    self.push_inline(Inline::Break);
                    self.trailing_space = true;
                }
            }
            "img" => {
                let src = attribute(e, "src").unwrap_or_default();
                let alt = attribute(e, "alt").unwrap_or_default();
                self.push_inline(Inline::Image(Image { src, alt }));
                self.trailing_space = false;
            }
            "b" | "strong" => self.bold += 1,
            "i" | "em" | "cite" | "var" | "dfn" => self.italic += 1,
            "u" | "ins" => self.underline += 1,
            "s" | "strike" | "del" => self.strike += 1,
            "code" | "kbd" | "samp" | "tt" => self.mono += 1,
            "a" => self.links.push(attribute(e, "href")),
            _ if BLOCK_ELEMENTS.contains(&name) => self.flush(),
            _ => {}
        }
    }

    fn end(&mut self, name: &str) {
        if name == "title" {
            self.in_title = false;
            return;
        }
        if SKIPPED_ELEMENTS.contains(&name) {
            self.skip_depth = self.skip_depth.saturating_sub(1);
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" => self.flush(),
            "pre" => {
                self.flush();
                self.pre_depth = self.pre_depth.saturating_sub(1);
            }
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "td" | "th" => self.close_cell(),
            "tr" => {
                self.close_cell();
                if let Some(table) = self.tables.last_mut() {
                    finish_row(table);
                }
            }
            "table" => {
                self.close_cell();
                if let Some(table) = self.tables.pop() {
                    self.push_block(Block::Table(finish_table(table)));
                }
            }
            "b" | "strong" => self.bold = self.bold.saturating_sub(1),
            "i" | "em" | "cite" | "var" | "dfn" => self.italic = self.italic.saturating_sub(1),
            "u" | "ins" => self.underline = self.underline.saturating_sub(1),
            "s" | "strike" | "del" => self.strike = self.strike.saturating_sub(1),
            "code" | "kbd" | "samp" | "tt" => self.mono = self.mono.saturating_sub(1),
            "a" => {
                self.links.pop();
            }
            _ if BLOCK_ELEMENTS.contains(&name) => self.flush(),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_title {
            self.title.push_str(text);
            return;
        }
        if self.skip_depth > 0 || text.is_empty() {
            return;
        }

        if self.pre_depth > 0 {
            self.ensure_block();
            let mut lines = text.split('\n').peekable();
            while let Some(line) = lines.next() {
                let line = line.trim_end_matches('\r');
                if !line.is_empty() {
                    self.push_run(line.to_string());
                }
                if lines.peek().is_some() {
                    self.push_inline(Inline::Break);
                }
            }
            return;
        }

        let mut collapsed = String::with_capacity(text.len());
        let mut space = self.trailing_space || self.current.as_ref().is_none_or(|o| o.inlines.is_empty());
        for c in text.chars() {
            if c.is_whitespace() && c != '\u{a0}' {
                if !space {
                    collapsed.push(' ');
                    space = true;
                }
            } else {
                collapsed.push(c);
                space = false;
            }
        }
        if collapsed.is_empty() {
            return;
        }
        self.ensure_block();
        self.trailing_space = space;
        self.push_run(collapsed);
    }

    /// Flush the open cell of the innermost table into its row.
    fn close_cell(&mut self) {
        self.flush();
        if let Some(table) = self.tables.last_mut() {
            if table.header_cell {
                table.header_cell = false;
                self.bold = self.bold.saturating_sub(1);
            }
            finish_cell(table);
        }
    }

    fn open_block(&mut self, kind: OpenKind) {
        // `<li><p>text</p></li>`: keep filling the still-empty list item.
        if let (Some(open), OpenKind::Paragraph(ParagraphKind::Normal)) = (&self.current, &kind) {
            if matches!(open.kind, OpenKind::ListItem { .. }) && open.inlines.is_empty() {
                return;
            }
        }
        self.flush();
        self.current = Some(Open { kind, inlines: Vec::new() });
        self.trailing_space = true;
    }

    fn ensure_block(&mut self) {
        if self.current.is_none() {
            let kind = if self.pre_depth > 0 {
                ParagraphKind::Preformatted
            } else {
                ParagraphKind::Normal
            };
            self.current = Some(Open { kind: OpenKind::Paragraph(kind), inlines: Vec::new() });
        }
    }

    fn push_run(&mut self, text: String) {
        let run = Run {
            text,
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
            strike: self.strike > 0,
            monospace: self.mono > 0,
            color: None,
            link: self.links.iter().rev().find_map(|l| l.clone()),
        };
        self.push_inline(Inline::Text(run));
    }

    fn push_inline(&mut self, inline: Inline) {
        self.ensure_block();
        if let Some(open) = self.current.as_mut() {
            open.inlines.push(inline);
        }
    }

    fn push_block(&mut self, block: Block) {
        match self.tables.last_mut().and_then(|t| t.cell.as_mut()) {
            Some(cell) => cell.push(block),
            None => self.blocks.push(block),
        }
    }

    fn flush(&mut self) {
        let Some(mut open) = self.current.take() else {
            return;
        };
        self.trailing_space = true;

        if let Some(Inline::Text(run)) = open.inlines.last_mut() {
            let trimmed = run.text.trim_end_matches(|c: char| c.is_whitespace() && c != '\u{a0}').len();
            run.text.truncate(trimmed);
            if run.text.is_empty() {
                open.inlines.pop();
            }
        }
        while matches!(open.inlines.last(), Some(Inline::Break)) {
            open.inlines.pop();
        }

        let block = match open.kind {
            OpenKind::ListItem { ordered, level, label } => {
                Block::ListItem(ListItem { ordered, level, label, inlines: open.inlines })
            }
            OpenKind::Paragraph(_) if open.inlines.is_empty() => return,
            OpenKind::Paragraph(ParagraphKind::Normal) if self.quote_depth > 0 => {
                Block::Paragraph(Paragraph::new(ParagraphKind::Quote, open.inlines))
            }
            OpenKind::Paragraph(kind) => Block::Paragraph(Paragraph::new(kind, open.inlines)),
        };
        self.push_block(block);
    }

    fn finish(mut self) -> Document {
        self.flush();
        while !self.tables.is_empty() {
            self.close_cell();
            let Some(table) = self.tables.pop() else { break };
            self.push_block(Block::Table(finish_table(table)));
        }
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        Document {
            title: (!title.is_empty()).then_some(title),
            blocks: self.blocks,
        }
    }
}

fn finish_cell(table: &mut TableState) {
    if let Some(cell) = table.cell.take() {
        table.row.get_or_insert_with(Vec::new).push(cell);
    }
}

fn finish_row(table: &mut TableState) {
    finish_cell(table);
    if let Some(row) = table.row.take() {
        if !row.is_empty() {
            table.rows.push(row);
        }
    }
}

fn finish_table(mut table: TableState) -> Table {
    finish_row(&mut table);
    Table { rows: table.rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#65;&#x42;&nbsp;"), "AB\u{a0}");
        assert_eq!(decode_entities("AT&T &bogus; &"), "AT&T &bogus; &");
    }

    #[test]
    fn whitespace_collapses_across_inline_tags() {
        let doc = parse("<p>  Hello\n   <b>big</b>   world </p>").unwrap();
        let Block::Paragraph(p) = &doc.blocks[0] else { panic!("expected paragraph") };
        let text: Vec<&str> = p
            .inlines
            .iter()
            .filter_map(|i| match i {
                Inline::Text(r) => Some(r.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, ["Hello ", "big", " world"]);
    }
}
