use std::fmt::Write;

use crate::model::{Block, Document, Image, Inline, ListItem, Paragraph, ParagraphKind, Run, Table};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the document body as an HTML fragment (no `<html>`/`<body>`).
pub fn render_fragment(doc: &Document) -> String {
    let mut out = String::new();
    write_blocks(&mut out, &doc.blocks);
    out
}

fn write_blocks(out: &mut String, blocks: &[Block]) {
    // Open lists as (ordered, level), innermost last.
    let mut lists: Vec<(bool, u8)> = Vec::new();

    for block in blocks {
        match block {
            Block::ListItem(item) => {
                open_list_for(out, &mut lists, item);
                out.push_str("<li>");
                write_inlines(out, &item.inlines);
            }
            Block::Paragraph(p) => {
                close_lists(out, &mut lists);
                write_paragraph(out, p);
            }
            Block::Table(t) => {
                close_lists(out, &mut lists);
                write_table(out, t);
            }
            Block::Rule => {
                close_lists(out, &mut lists);
                out.push_str("<hr>\n");
            }
        }
    }
    close_lists(out, &mut lists);
}

fn list_tag(ordered: bool) -> &'static str {
    if ordered { "ol" } else { "ul" }
}

fn open_list_for(out: &mut String, lists: &mut Vec<(bool, u8)>, item: &ListItem) {
    // Pop deeper lists, and a same-level list of the other kind.
    while let Some(&(ordered, level)) = lists.last() {
        if level > item.level || (level == item.level && ordered != item.ordered) {
            out.push_str("</li>\n</");
            out.push_str(list_tag(ordered));
            out.push_str(">\n");
            lists.pop();
        } else {
            break;
        }
    }

    match lists.last() {
        Some(&(_, level)) if level == item.level => out.push_str("</li>\n"),
        _ => {
            // Nested lists live inside the open <li> of the parent.
            if !lists.is_empty() {
                out.push('\n');
            }
            out.push('<');
            out.push_str(list_tag(item.ordered));
            out.push_str(">\n");
            lists.push((item.ordered, item.level));
        }
    }
}

fn close_lists(out: &mut String, lists: &mut Vec<(bool, u8)>) {
    while let Some((ordered, _)) = lists.pop() {
        out.push_str("</li>\n</");
        out.push_str(list_tag(ordered));
        out.push_str(">\n");
    }
}

fn write_paragraph(out: &mut String, p: &Paragraph) {
    match p.kind {
        ParagraphKind::Normal => {
            if p.inlines.is_empty() {
                return;
            }
            out.push_str("<p>");
            write_inlines(out, &p.inlines);
            out.push_str("</p>\n");
        }
        ParagraphKind::Heading(level) => {
            let level = level.clamp(1, 6);
            let _ = write!(out, "<h{level}>");
            write_inlines(out, &p.inlines);
            let _ = writeln!(out, "</h{level}>");
        }
        ParagraphKind::Preformatted => {
            out.push_str("<pre><code>");
            for inline in &p.inlines {
                match inline {
                    Inline::Text(run) => out.push_str(&escape(&run.text)),
                    Inline::Break => out.push('\n'),
                    Inline::Image(_) => {}
                }
            }
            out.push_str("</code></pre>\n");
        }
        ParagraphKind::Quote => {
            out.push_str("<blockquote><p>");
            write_inlines(out, &p.inlines);
            out.push_str("</p></blockquote>\n");
        }
    }
}

fn write_table(out: &mut String, table: &Table) {
    out.push_str("<table>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str("<td>");
            match cell.as_slice() {
                // A lone paragraph is written without its <p> wrapper.
                [Block::Paragraph(p)] if p.kind == ParagraphKind::Normal => {
                    write_inlines(out, &p.inlines)
                }
                blocks => write_blocks(out, blocks),
            }
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}

fn write_inlines(out: &mut String, inlines: &[Inline]) {
    let mut i = 0;
    while i < inlines.len() {
        match &inlines[i] {
            Inline::Text(run) if run.link.is_some() => {
                // Group consecutive runs sharing a link target into one anchor.
                let href = run.link.as_deref().unwrap_or_default();
                out.push_str("<a href=\"");
                out.push_str(&escape(href));
                out.push_str("\">");
                while let Some(Inline::Text(r)) = inlines.get(i) {
                    if r.link.as_deref() != Some(href) {
                        break;
                    }
                    write_run(out, r);
                    i += 1;
                }
                out.push_str("</a>");
                continue;
            }
            Inline::Text(run) => write_run(out, run),
            Inline::Break => out.push_str("<br>"),
            Inline::Image(img) => write_image(out, img),
        }
        i += 1;
    }
}

fn write_run(out: &mut String, run: &Run) {
    let mut close: Vec<&str> = Vec::new();
    if let Some([r, g, b]) = run.color {
        let _ = write!(out, "<span style=\"color: #{r:02x}{g:02x}{b:02x}\">");
        close.push("</span>");
    }
    for (on, open, end) in [
        (run.bold, "<strong>", "</strong>"),
        (run.italic, "<em>", "</em>"),
        (run.underline, "<u>", "</u>"),
        (run.strike, "<s>", "</s>"),
        (run.monospace, "<code>", "</code>"),
    ] {
        if on {
            out.push_str(open);
            close.push(end);
        }
    }
    out.push_str(&escape(&run.text));
    for tag in close.iter().rev() {
        out.push_str(tag);
    }
}

fn write_image(out: &mut String, img: &Image) {
    out.push_str("<img src=\"");
    out.push_str(&escape(&img.src));
    out.push_str("\" alt=\"");
    out.push_str(&escape(&img.alt));
    out.push_str("\">");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ordered: bool, level: u8, text: &str) -> Block {
        Block::ListItem(ListItem {
            ordered,
            level,
            label: String::new(),
            inlines: vec![Inline::Text(Run::plain(text))],
        })
    }

    #[test]
    fn nested_lists_close_in_order() {
        let doc = Document {
            title: None,
            blocks: vec![item(false, 0, "a"), item(true, 1, "b"), item(false, 0, "c")],
        };
        assert_eq!(
            render_fragment(&doc),
            "<ul>\n<li>a\n<ol>\n<li>b</li>\n</ol>\n</li>\n<li>c</li>\n</ul>\n"
        );
    }

    #[test]
    fn runs_nest_formatting_inside_color() {
        let run = Run {
            text: "a<b".into(),
            bold: true,
            italic: true,
            color: Some([255, 0, 0]),
            ..Run::default()
        };
        let mut out = String::new();
        write_run(&mut out, &run);
        assert_eq!(
            out,
            "<span style=\"color: #ff0000\"><strong><em>a&lt;b</em></strong></span>"
        );
    }

    #[test]
    fn adjacent_linked_runs_share_an_anchor() {
        let link = Some("https://example.com/?a=1&b=2".to_string());
        let inlines = vec![
            Inline::Text(Run { text: "ex".into(), link: link.clone(), ..Run::default() }),
            Inline::Text(Run { text: "ample".into(), bold: true, link, ..Run::default() }),
            Inline::Text(Run::plain(" end")),
        ];
        let mut out = String::new();
        write_inlines(&mut out, &inlines);
        assert_eq!(
            out,
            "<a href=\"https://example.com/?a=1&amp;b=2\">ex<strong>ample</strong></a> end"
        );
    }
}
