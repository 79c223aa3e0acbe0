//! Format-neutral document tree shared by the DOCX reader, the HTML
//! reader/writer and the PDF renderer.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub title: Option<String>,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    ListItem(ListItem),
    Table(Table),
    Rule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParagraphKind {
    Normal,
    Heading(u8),
    Preformatted,
    Quote,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    pub kind: ParagraphKind,
    pub inlines: Vec<Inline>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListItem {
    pub ordered: bool,
    pub level: u8,
    pub label: String, // rendered marker, e.g. "3." or bullet
    pub inlines: Vec<Inline>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<Cell>>,
}

pub type Cell = Vec<Block>;

#[derive(Clone, Debug, PartialEq)]
pub enum Inline {
    Text(Run),
    Break,
    Image(Image),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub monospace: bool,
    pub color: Option<[u8; 3]>, // None = automatic (black)
    pub link: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

impl Paragraph {
    pub fn new(kind: ParagraphKind, inlines: Vec<Inline>) -> Self {
        Paragraph { kind, inlines }
    }
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Run {
            text: text.into(),
            ..Run::default()
        }
    }
}

/// Concatenated text of a run of inlines; breaks become spaces.
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(run) => out.push_str(&run.text),
            Inline::Break => out.push(' '),
            Inline::Image(img) => out.push_str(&img.alt),
        }
    }
    out
}

impl Document {
    /// Text of the first top-level heading, if any.
    pub fn first_heading(&self) -> Option<String> {
        self.blocks.iter().find_map(|block| match block {
            Block::Paragraph(Paragraph {
                kind: ParagraphKind::Heading(_),
                inlines,
            }) => {
                let text = plain_text(inlines);
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            _ => None,
        })
    }
}
