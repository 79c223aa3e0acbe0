use std::collections::HashMap;

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};

use crate::error::Error;
use crate::fonts::{self, FontEntry, FontStyle};
use crate::model::{Block, Cell, Document, Inline, ListItem, Paragraph, ParagraphKind, Table};

const LINE_HEIGHT: f32 = 1.4;
const LIST_INDENT: f32 = 18.0;
const QUOTE_INDENT: f32 = 14.0;
const PRE_INDENT: f32 = 8.0;
const CELL_PADDING: f32 = 4.0;
const LINK_COLOR: [f32; 3] = [0.01, 0.4, 0.84];
const BLACK: [f32; 3] = [0.13, 0.13, 0.13];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Width and height in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

pub fn mm_to_pts(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

#[derive(Clone, Debug)]
pub struct PdfOptions {
    pub page_size: PageSize,
    pub margin: f32, // points, all four sides
    pub font_size: f32,
    /// Comma-separated font families to embed; standard Helvetica when unset or not found.
    pub font_family: Option<String>,
    /// Charset forced onto the HTML input instead of detecting it.
    pub charset: Option<String>,
    /// Run the encoding normalizer on the HTML input (in place) before rendering.
    pub normalize: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        PdfOptions {
            page_size: PageSize::A4,
            margin: mm_to_pts(20.0),
            font_size: 11.0,
            font_family: None,
            charset: None,
            normalize: true,
        }
    }
}

enum Op {
    Text {
        x: f32,
        y: f32,
        style: FontStyle,
        size: f32,
        color: [f32; 3],
        bytes: Vec<u8>,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        gray: f32,
    },
    Frame {
        rect: Rect,
        gray: f32,
    },
}

#[derive(Clone)]
struct Piece {
    bytes: Vec<u8>,
    style: FontStyle,
    size: f32,
    color: [f32; 3],
    underline: bool,
    strike: bool,
    space_before: bool,
}

impl Piece {
    fn same_look(&self, other: &Piece) -> bool {
        self.style == other.style
            && self.size == other.size
            && self.color == other.color
            && self.underline == other.underline
            && self.strike == other.strike
    }
}

enum Token {
    Piece(Piece),
    Break,
}

#[derive(Default)]
struct Line {
    placed: Vec<(f32, f32, Piece)>, // (x offset, width, piece)
    size: f32,
}

/// Text attributes applied on top of each run.
#[derive(Clone, Copy)]
struct TextStyle {
    size: f32,
    bold: bool,
    italic: bool,
    preserve_spaces: bool,
}

struct Layout<'f> {
    fonts: &'f HashMap<FontStyle, FontEntry>,
    page_width: f32,
    page_height: f32,
    margin: f32,
    base_size: f32,
    pages: Vec<Vec<Op>>,
    y: f32,
    substituted: bool,
    skipped_images: usize,
}

impl<'f> Layout<'f> {
    fn new(fonts: &'f HashMap<FontStyle, FontEntry>, opts: &PdfOptions) -> Self {
        let (page_width, page_height) = opts.page_size.dimensions();
        Layout {
            fonts,
            page_width,
            page_height,
            margin: opts.margin,
            base_size: opts.font_size,
            pages: vec![Vec::new()],
            y: page_height - opts.margin,
            substituted: false,
            skipped_images: 0,
        }
    }

    fn top(&self) -> f32 {
        self.page_height - self.margin
    }

    fn content_width(&self) -> f32 {
        (self.page_width - 2.0 * self.margin).max(36.0)
    }

    fn at_page_top(&self) -> bool {
        self.y >= self.top()
    }

    fn push(&mut self, op: Op) {
        if let Some(page) = self.pages.last_mut() {
            page.push(op);
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = self.top();
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < self.margin && !self.at_page_top() {
            self.new_page();
        }
    }

    fn skip(&mut self, amount: f32) {
        if !self.at_page_top() {
            self.y -= amount;
        }
    }

    fn width(&self, style: FontStyle, bytes: &[u8], size: f32) -> f32 {
        self.fonts
            .get(&style)
            .map_or(bytes.len() as f32 * size * 0.556, |f| f.width(bytes, size))
    }

    fn tokenize(&mut self, inlines: &[Inline], text_style: TextStyle) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pending_space = false;

        for inline in inlines {
            let run = match inline {
                Inline::Text(run) => run,
                Inline::Break => {
                    tokens.push(Token::Break);
                    pending_space = false;
                    continue;
                }
                Inline::Image(_) => {
                    self.skipped_images += 1;
                    continue;
                }
            };

            let style = FontStyle::from_flags(
                run.bold || text_style.bold,
                run.italic || text_style.italic,
                run.monospace,
            );
            let color = match (run.color, &run.link) {
                (Some([r, g, b]), _) => [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
                (None, Some(_)) => LINK_COLOR,
                (None, None) => BLACK,
            };
            let make = |text: &str, space_before: bool, substituted: &mut bool| {
                let (bytes, lossy) = fonts::to_winansi_bytes(text);
                *substituted |= lossy;
                Piece {
                    bytes,
                    style,
                    size: text_style.size,
                    color,
                    underline: run.underline || run.link.is_some(),
                    strike: run.strike,
                    space_before,
                }
            };

            if text_style.preserve_spaces {
                let text = run.text.replace('\t', "    ");
                tokens.push(Token::Piece(make(&text, false, &mut self.substituted)));
                continue;
            }

            let mut word = String::new();
            for c in run.text.chars() {
                if c.is_whitespace() && c != '\u{a0}' {
                    if !word.is_empty() {
                        tokens.push(Token::Piece(make(&word, pending_space, &mut self.substituted)));
                        word.clear();
                    }
                    pending_space = true;
                } else {
                    word.push(c);
                }
            }
            if !word.is_empty() {
                tokens.push(Token::Piece(make(&word, pending_space, &mut self.substituted)));
                pending_space = false;
            }
        }
        tokens
    }

    fn wrap(&self, tokens: Vec<Token>, max_width: f32, min_size: f32) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut line = Line { placed: Vec::new(), size: min_size };
        let mut x = 0.0;

        for token in tokens {
            let piece = match token {
                Token::Break => {
                    lines.push(std::mem::replace(&mut line, Line { placed: Vec::new(), size: min_size }));
                    x = 0.0;
                    continue;
                }
                Token::Piece(piece) => piece,
            };

            let space = self.width(piece.style, b" ", piece.size);
            let mut width = self.width(piece.style, &piece.bytes, piece.size);
            let mut gap = if piece.space_before && !line.placed.is_empty() { space } else { 0.0 };

            if !line.placed.is_empty() && x + gap + width > max_width {
                lines.push(std::mem::replace(&mut line, Line { placed: Vec::new(), size: min_size }));
                x = 0.0;
                gap = 0.0;
            }

            let mut piece = piece;
            // Hard-break words wider than the whole line.
            while width > max_width && piece.bytes.len() > 1 {
                let mut fit = 1;
                while fit < piece.bytes.len()
                    && self.width(piece.style, &piece.bytes[..fit + 1], piece.size) <= max_width - x
                {
                    fit += 1;
                }
                let mut head = piece.clone();
                head.bytes.truncate(fit);
                let head_width = self.width(head.style, &head.bytes, head.size);
                place(&mut line, x, gap, head_width, head);
                lines.push(std::mem::replace(&mut line, Line { placed: Vec::new(), size: min_size }));
                x = 0.0;
                gap = 0.0;
                piece.bytes.drain(..fit);
                piece.space_before = false;
                width = self.width(piece.style, &piece.bytes, piece.size);
            }

            place(&mut line, x, gap, width, piece);
            x += gap + width;
        }
        if !line.placed.is_empty() {
            lines.push(line);
        }
        lines
    }

    fn emit_text(&mut self, x: f32, baseline: f32, width: f32, piece: Piece) {
        let size = piece.size;
        if piece.underline {
            self.push(Op::Line {
                from: (x, baseline - size * 0.12),
                to: (x + width, baseline - size * 0.12),
                width: size * 0.05,
                gray: 0.3,
            });
        }
        if piece.strike {
            self.push(Op::Line {
                from: (x, baseline + size * 0.3),
                to: (x + width, baseline + size * 0.3),
                width: size * 0.05,
                gray: 0.2,
            });
        }
        self.push(Op::Text {
            x,
            y: baseline,
            style: piece.style,
            size,
            color: piece.color,
            bytes: piece.bytes,
        });
    }

    /// Place wrapped lines starting at `x0`, breaking pages as needed.
    /// `label` is drawn to the left of the first line; `bar` draws a quote bar.
    fn emit_lines(&mut self, lines: Vec<Line>, x0: f32, label: Option<Piece>, bar: bool) {
        let mut label = label;
        for line in lines {
            let line_height = line.size * LINE_HEIGHT;
            self.ensure_space(line_height);
            let baseline = self.y - line.size;

            if let Some(label) = label.take() {
                let width = self.width(label.style, &label.bytes, label.size);
                self.emit_text(x0 - width - 5.0, baseline, width, label);
            }
            if bar {
                self.push(Op::Line {
                    from: (x0 - QUOTE_INDENT + 3.0, self.y),
                    to: (x0 - QUOTE_INDENT + 3.0, self.y - line_height),
                    width: 2.5,
                    gray: 0.85,
                });
            }
            for (dx, width, piece) in line.placed {
                self.emit_text(x0 + dx, baseline, width, piece);
            }
            self.y -= line_height;
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Paragraph(p) => self.paragraph(p),
            Block::ListItem(item) => self.list_item(item),
            Block::Table(table) => self.table(table),
            Block::Rule => {
                self.skip(self.base_size * 0.6);
                self.ensure_space(2.0);
                let left = self.margin;
                let right = self.page_width - self.margin;
                let y = self.y;
                self.push(Op::Line { from: (left, y), to: (right, y), width: 0.75, gray: 0.8 });
                self.y -= self.base_size * 0.6;
            }
        }
    }

    fn paragraph(&mut self, p: &Paragraph) {
        let base = self.base_size;
        let plain = TextStyle { size: base, bold: false, italic: false, preserve_spaces: false };
        let width = self.content_width();
        match p.kind {
            ParagraphKind::Normal => {
                let tokens = self.tokenize(&p.inlines, plain);
                let lines = self.wrap(tokens, width, base);
                self.emit_lines(lines, self.margin, None, false);
                self.skip(base * 0.6);
            }
            ParagraphKind::Heading(level) => {
                let factor = match level {
                    1 => 2.0,
                    2 => 1.5,
                    3 => 1.25,
                    4 => 1.1,
                    5 => 1.0,
                    _ => 0.9,
                };
                let size = base * factor;
                self.skip(size * 0.6);
                let tokens = self.tokenize(&p.inlines, TextStyle { size, bold: true, ..plain });
                let lines = self.wrap(tokens, width, size);
                // Keep the heading with at least one following line.
                self.ensure_space(lines.len() as f32 * size * LINE_HEIGHT + base * LINE_HEIGHT);
                self.emit_lines(lines, self.margin, None, false);
                if level <= 2 {
                    let (left, right, y) = (self.margin, self.page_width - self.margin, self.y + size * 0.15);
                    self.push(Op::Line { from: (left, y), to: (right, y), width: 0.5, gray: 0.85 });
                }
                self.skip(size * 0.3);
            }
            ParagraphKind::Preformatted => {
                let size = base * 0.9;
                let style = TextStyle { size, preserve_spaces: true, ..plain };
                let mut inlines = p.inlines.clone();
                for inline in &mut inlines {
                    if let Inline::Text(run) = inline {
                        run.monospace = true;
                    }
                }
                let tokens = self.tokenize(&inlines, style);
                let lines = self.wrap(tokens, width - 2.0 * PRE_INDENT, size);
                self.emit_lines(lines, self.margin + PRE_INDENT, None, false);
                self.skip(base * 0.6);
            }
            ParagraphKind::Quote => {
                let tokens = self.tokenize(&p.inlines, TextStyle { italic: true, ..plain });
                let lines = self.wrap(tokens, width - QUOTE_INDENT, base);
                self.emit_lines(lines, self.margin + QUOTE_INDENT, None, true);
                self.skip(base * 0.6);
            }
        }
    }

    fn list_item(&mut self, item: &ListItem) {
        let base = self.base_size;
        let indent = LIST_INDENT * (f32::from(item.level) + 1.0);
        let style = TextStyle { size: base, bold: false, italic: false, preserve_spaces: false };
        let tokens = self.tokenize(&item.inlines, style);
        let lines = self.wrap(tokens, self.content_width() - indent, base);
        let (bytes, lossy) = fonts::to_winansi_bytes(&item.label);
        self.substituted |= lossy;
        let label = Piece {
            bytes,
            style: FontStyle::Regular,
            size: base,
            color: BLACK,
            underline: false,
            strike: false,
            space_before: false,
        };
        let lines = if lines.is_empty() { vec![Line { placed: Vec::new(), size: base }] } else { lines };
        self.emit_lines(lines, self.margin + indent, Some(label), false);
        self.skip(base * 0.25);
    }

    fn table(&mut self, table: &Table) {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let size = self.base_size * 0.95;
        let line_height = size * LINE_HEIGHT;
        let column_width = self.content_width() / columns as f32;
        let style = TextStyle { size, bold: false, italic: false, preserve_spaces: false };

        for row in &table.rows {
            let cells: Vec<Vec<Line>> = row
                .iter()
                .map(|cell| {
                    let inlines = flatten_cell(cell);
                    let tokens = self.tokenize(&inlines, style);
                    self.wrap(tokens, column_width - 2.0 * CELL_PADDING, size)
                })
                .collect();
            let max_lines = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let row_height = max_lines as f32 * line_height + 2.0 * CELL_PADDING;

            self.ensure_space(row_height);
            let top = self.y;
            for column in 0..columns {
                let x = self.margin + column as f32 * column_width;
                self.push(Op::Frame {
                    rect: Rect::new(x, top - row_height, x + column_width, top),
                    gray: 0.75,
                });
            }
            for (column, lines) in cells.into_iter().enumerate() {
                let x = self.margin + column as f32 * column_width + CELL_PADDING;
                let mut y = top - CELL_PADDING;
                for line in lines {
                    let baseline = y - line.size;
                    for (dx, width, piece) in line.placed {
                        self.emit_text(x + dx, baseline, width, piece);
                    }
                    y -= line.size * LINE_HEIGHT;
                }
            }
            self.y = top - row_height;
        }
        self.skip(self.base_size * 0.6);
    }
}

fn place(line: &mut Line, x: f32, gap: f32, width: f32, piece: Piece) {
    line.size = line.size.max(piece.size);
    // Same-look neighbours merge into one text operation, with a literal space for the gap.
    if let Some((_, prev_width, prev)) = line.placed.last_mut()
        && prev.same_look(&piece)
    {
        if gap > 0.0 {
            prev.bytes.push(b' ');
        }
        prev.bytes.extend_from_slice(&piece.bytes);
        *prev_width += gap + width;
        return;
    }
    line.placed.push((x + gap, width, piece));
}

/// Inline content of a table cell; blocks are separated by line breaks.
fn flatten_cell(cell: &Cell) -> Vec<Inline> {
    let mut out = Vec::new();
    for block in cell {
        let inlines: Vec<Inline> = match block {
            Block::Paragraph(p) => p.inlines.clone(),
            Block::ListItem(item) => {
                let mut v = vec![Inline::Text(crate::model::Run::plain(format!("{} ", item.label)))];
                v.extend(item.inlines.iter().cloned());
                v
            }
            Block::Table(t) => t
                .rows
                .iter()
                .flat_map(|row| {
                    let mut v: Vec<Inline> = row.iter().flat_map(flatten_cell).collect();
                    v.push(Inline::Break);
                    v
                })
                .collect(),
            Block::Rule => continue,
        };
        if !out.is_empty() && !inlines.is_empty() {
            out.push(Inline::Break);
        }
        out.extend(inlines);
    }
    out
}

pub fn render(doc: &Document, opts: &PdfOptions) -> Result<Vec<u8>, Error> {
    if !(opts.font_size > 0.0) {
        return Err(Error::Pdf(format!("invalid font size {}", opts.font_size)));
    }
    let (page_width, page_height) = opts.page_size.dimensions();
    if opts.margin < 0.0 || 2.0 * opts.margin >= page_width.min(page_height) {
        return Err(Error::Pdf(format!("margin {}pt leaves no room on the page", opts.margin)));
    }

    let mut pdf = Pdf::new();
    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let info_id = Ref::new(3);
    let mut next_id = 4;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };

    let mut fonts = HashMap::new();
    for (i, style) in FontStyle::ALL.into_iter().enumerate() {
        let entry = fonts::register_font(
            &mut pdf,
            opts.font_family.as_deref(),
            style,
            format!("F{}", i + 1),
            &mut alloc,
        );
        fonts.insert(style, entry);
    }

    let mut layout = Layout::new(&fonts, opts);
    for block in &doc.blocks {
        layout.block(block);
    }
    if layout.substituted {
        log::warn!("Some characters cannot be drawn with WinAnsi fonts and were replaced with '?'");
    }
    if layout.skipped_images > 0 {
        log::warn!("{} image(s) are not embedded in the PDF", layout.skipped_images);
    }
    let pages = layout.pages;

    let page_ids: Vec<(Ref, Ref)> = pages.iter().map(|_| (alloc(), alloc())).collect();

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().map(|(page, _)| *page))
        .count(page_ids.len() as i32);

    {
        let mut info = pdf.document_info(info_id);
        if let Some(title) = &doc.title {
            info.title(TextStr(title.as_str()));
        }
        info.producer(TextStr("docshift"));
    }

    for (ops, (page_id, content_id)) in pages.into_iter().zip(page_ids) {
        {
            let mut page = pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, page_width, page_height));
            page.parent(pages_id);
            page.contents(content_id);
            let mut resources = page.resources();
            let mut font_dict = resources.fonts();
            for entry in fonts.values() {
                font_dict.pair(Name(entry.pdf_name.as_bytes()), entry.font_ref);
            }
        }
        let content = page_content(ops, &fonts);
        pdf.stream(content_id, &content.finish());
    }

    Ok(pdf.finish())
}

fn page_content(ops: Vec<Op>, fonts: &HashMap<FontStyle, FontEntry>) -> Content {
    let mut content = Content::new();
    for op in ops {
        match op {
            Op::Text { x, y, style, size, color, bytes } => {
                let Some(font) = fonts.get(&style) else {
                    continue;
                };
                let [r, g, b] = color;
                content.set_fill_rgb(r, g, b);
                content
                    .begin_text()
                    .set_font(Name(font.pdf_name.as_bytes()), size)
                    .next_line(x, y)
                    .show(Str(&bytes))
                    .end_text();
            }
            Op::Line { from, to, width, gray } => {
                content.set_stroke_rgb(gray, gray, gray);
                content.set_line_width(width);
                content.move_to(from.0, from.1);
                content.line_to(to.0, to.1);
                content.stroke();
            }
            Op::Frame { rect, gray } => {
                content.set_stroke_rgb(gray, gray, gray);
                content.set_line_width(0.5);
                content.rect(rect.x1, rect.y1, rect.x2 - rect.x1, rect.y2 - rect.y1);
                content.stroke();
            }
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Run;

    fn courier_fonts() -> HashMap<FontStyle, FontEntry> {
        FontStyle::ALL
            .into_iter()
            .enumerate()
            .map(|(i, style)| {
                (
                    style,
                    FontEntry {
                        pdf_name: format!("F{}", i + 1),
                        font_ref: Ref::new(i as i32 + 1),
                        widths_1000: vec![600.0; 224],
                    },
                )
            })
            .collect()
    }

    #[test]
    fn words_wrap_at_the_available_width() {
        let fonts = courier_fonts();
        let mut layout = Layout::new(&fonts, &PdfOptions::default());
        let style = TextStyle { size: 10.0, bold: false, italic: false, preserve_spaces: false };
        // Each char is 6pt wide; "aaaa bbbb cccc" needs 84pt.
        let tokens = layout.tokenize(&[Inline::Text(Run::plain("aaaa bbbb cccc"))], style);
        let lines = layout.wrap(tokens, 60.0, 10.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].placed.len(), 1, "same-look words merge into one piece");
        assert_eq!(lines[0].placed[0].2.bytes, b"aaaa bbbb");
        assert_eq!(lines[1].placed[0].2.bytes, b"cccc");
    }

    #[test]
    fn overlong_words_are_hard_broken() {
        let fonts = courier_fonts();
        let mut layout = Layout::new(&fonts, &PdfOptions::default());
        let style = TextStyle { size: 10.0, bold: false, italic: false, preserve_spaces: false };
        let tokens = layout.tokenize(&[Inline::Text(Run::plain("abcdefghijklmnop"))], style);
        let lines = layout.wrap(tokens, 30.0, 10.0);
        let chunks: Vec<&[u8]> = lines.iter().map(|l| l.placed[0].2.bytes.as_slice()).collect();
        assert_eq!(chunks, [&b"abcde"[..], b"fghij", b"klmno", b"p"]);
    }

    #[test]
    fn glued_runs_keep_no_space() {
        let fonts = courier_fonts();
        let mut layout = Layout::new(&fonts, &PdfOptions::default());
        let style = TextStyle { size: 10.0, bold: false, italic: false, preserve_spaces: false };
        let bold = Run { text: "ample".into(), bold: true, ..Run::default() };
        let tokens = layout.tokenize(&[Inline::Text(Run::plain("ex")), Inline::Text(bold)], style);
        let lines = layout.wrap(tokens, 500.0, 10.0);
        assert_eq!(lines.len(), 1);
        let (x0, w0, _) = &lines[0].placed[0];
        let (x1, _, piece) = &lines[0].placed[1];
        assert!((x0 + w0 - x1).abs() < 1e-3);
        assert_eq!(piece.style, FontStyle::Bold);
    }
}
