use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::Error;
use crate::model::{Block, Document, Image, Inline, ListItem, Paragraph, ParagraphKind, Run, Table};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// A parsed document plus advisory messages about content that could not
/// be mapped faithfully.
#[derive(Debug)]
pub struct ParsedDocx {
    pub document: Document,
    pub messages: Vec<String>,
}

struct LevelDef {
    num_fmt: String,
    lvl_text: String,
}

struct NumberingInfo {
    abstract_nums: HashMap<String, HashMap<u8, LevelDef>>,
    num_to_abstract: HashMap<String, String>,
}

struct StyleInfo {
    name: String,
    based_on: Option<String>,
}

struct Relationship {
    target: String,
    external: bool,
}

fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WML_NS))
}

fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

/// `<w:b/>` is on, `<w:b w:val="0"/>` is off.
fn toggle(node: Option<roxmltree::Node>) -> bool {
    node.is_some_and(|n| {
        !matches!(
            n.attribute((WML_NS, "val")),
            Some("0" | "false" | "off" | "none")
        )
    })
}

fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" || val.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

fn is_monospace_font(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["courier", "consolas", "mono", "menlo", "monaco"]
        .iter()
        .any(|m| name.contains(m))
}

fn read_part<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = zip.by_name(name).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

fn parse_styles<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> HashMap<String, StyleInfo> {
    let mut styles = HashMap::new();
    let Some(xml_content) = read_part(zip, "word/styles.xml") else {
        return styles;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("word/styles.xml is not well-formed, ignoring styles");
        return styles;
    };

    for style_node in xml.root_element().children() {
        if !is_wml(style_node, "style") {
            continue;
        }
        if style_node.attribute((WML_NS, "type")) != Some("paragraph") {
            continue;
        }
        let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
            continue;
        };
        let name = wml_attr(style_node, "name").unwrap_or(style_id).to_string();
        let based_on = wml_attr(style_node, "basedOn").map(str::to_string);
        styles.insert(style_id.to_string(), StyleInfo { name, based_on });
    }
    styles
}

fn parse_numbering<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> NumberingInfo {
    let mut abstract_nums: HashMap<String, HashMap<u8, LevelDef>> = HashMap::new();
    let mut num_to_abstract: HashMap<String, String> = HashMap::new();

    let Some(xml_content) = read_part(zip, "word/numbering.xml") else {
        return NumberingInfo { abstract_nums, num_to_abstract };
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("word/numbering.xml is not well-formed, ignoring numbering");
        return NumberingInfo { abstract_nums, num_to_abstract };
    };

    for node in xml.root_element().children() {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "abstractNum" => {
                let Some(abs_id) = node.attribute((WML_NS, "abstractNumId")) else {
                    continue;
                };
                let mut levels: HashMap<u8, LevelDef> = HashMap::new();
                for lvl in node.children().filter(|n| is_wml(*n, "lvl")) {
                    let Some(ilvl) = lvl
                        .attribute((WML_NS, "ilvl"))
                        .and_then(|v| v.parse::<u8>().ok())
                    else {
                        continue;
                    };
                    let num_fmt = wml_attr(lvl, "numFmt").unwrap_or("bullet").to_string();
                    let lvl_text = wml_attr(lvl, "lvlText").unwrap_or("").to_string();
                    levels.insert(ilvl, LevelDef { num_fmt, lvl_text });
                }
                abstract_nums.insert(abs_id.to_string(), levels);
            }
            "num" => {
                let Some(num_id) = node.attribute((WML_NS, "numId")) else {
                    continue;
                };
                let Some(abs_id) = wml_attr(node, "abstractNumId") else {
                    continue;
                };
                num_to_abstract.insert(num_id.to_string(), abs_id.to_string());
            }
            _ => {}
        }
    }

    NumberingInfo { abstract_nums, num_to_abstract }
}

fn parse_relationships<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> HashMap<String, Relationship> {
    let mut rels = HashMap::new();
    let Some(xml_content) = read_part(zip, "word/_rels/document.xml.rels") else {
        return rels;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("document relationships are not well-formed, ignoring links and images");
        return rels;
    };
    for node in xml.root_element().children() {
        if node.tag_name().name() != "Relationship" || node.tag_name().namespace() != Some(PKG_REL_NS) {
            continue;
        }
        let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target")) else {
            continue;
        };
        let external = node.attribute("TargetMode") == Some("External");
        rels.insert(id.to_string(), Relationship { target: target.to_string(), external });
    }
    rels
}

fn parse_title<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> Option<String> {
    let xml_content = read_part(zip, "docProps/core.xml")?;
    let xml = roxmltree::Document::parse(&xml_content).ok()?;
    let title = xml
        .descendants()
        .find(|n| n.tag_name().name() == "title" && n.tag_name().namespace() == Some(DC_NS))?
        .text()?
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Map a paragraph style to a block kind, following `basedOn` links.
fn classify_style_name(name: &str) -> Option<ParagraphKind> {
    let lower = name.to_ascii_lowercase();
    if let Some(level) = lower
        .strip_prefix("heading ")
        .and_then(|n| n.trim().parse::<u8>().ok())
    {
        return Some(ParagraphKind::Heading(level.clamp(1, 6)));
    }
    match lower.as_str() {
        "title" => Some(ParagraphKind::Heading(1)),
        "subtitle" => Some(ParagraphKind::Heading(2)),
        "quote" | "intense quote" => Some(ParagraphKind::Quote),
        "html preformatted" | "plain text" => Some(ParagraphKind::Preformatted),
        "normal" | "list paragraph" | "body text" | "no spacing" | "normal (web)" => {
            Some(ParagraphKind::Normal)
        }
        _ => None,
    }
}

struct Parser<'z, R> {
    zip: &'z mut zip::ZipArchive<R>,
    styles: HashMap<String, StyleInfo>,
    numbering: NumberingInfo,
    rels: HashMap<String, Relationship>,
    counters: HashMap<(String, u8), u32>,
    warned_styles: HashSet<String>,
    messages: Vec<String>,
}

impl<R: Read + Seek> Parser<'_, R> {
    fn warn(&mut self, message: String) {
        log::debug!("{message}");
        self.messages.push(message);
    }

    fn paragraph_kind(&mut self, style_id: &str) -> ParagraphKind {
        let mut current = Some(style_id.to_string());
        let mut depth = 0;
        while let Some(id) = current.take() {
            let Some(style) = self.styles.get(&id) else {
                break;
            };
            match classify_style_name(&style.name) {
                Some(kind) if kind != ParagraphKind::Normal || depth == 0 => return kind,
                _ => {}
            }
            depth += 1;
            if depth > 16 {
                break;
            }
            current = style.based_on.clone();
        }

        if self.warned_styles.insert(style_id.to_string()) {
            let name = self
                .styles
                .get(style_id)
                .map_or(style_id, |s| s.name.as_str())
                .to_string();
            self.warn(format!(
                "Unrecognised paragraph style: '{name}' (Style ID: {style_id})"
            ));
        }
        ParagraphKind::Normal
    }

    /// Returns `(ordered, level, label)` for a numbered paragraph.
    fn list_info(&mut self, num_pr: roxmltree::Node) -> Option<(bool, u8, String)> {
        let num_id = wml_attr(num_pr, "numId")?;
        // numId 0 removes numbering inherited from the style.
        if num_id == "0" {
            return None;
        }
        let ilvl = wml_attr(num_pr, "ilvl")
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);

        let Some(levels) = self
            .numbering
            .num_to_abstract
            .get(num_id)
            .and_then(|abs_id| self.numbering.abstract_nums.get(abs_id))
        else {
            self.warn(format!("List numbering definition {num_id} not found; rendered as bullets"));
            return Some((false, ilvl, "\u{2022}".to_string()));
        };

        let (num_fmt, lvl_text) = match levels.get(&ilvl) {
            Some(def) => (def.num_fmt.clone(), def.lvl_text.clone()),
            None => ("bullet".to_string(), String::new()),
        };

        // A shallower item restarts the deeper levels.
        self.counters
            .retain(|(id, level), _| id != num_id || *level <= ilvl);
        let counter = *self
            .counters
            .entry((num_id.to_string(), ilvl))
            .and_modify(|c| *c += 1)
            .or_insert(1);

        let ordered = num_fmt != "bullet" && num_fmt != "none";
        let label = if ordered {
            let mut label = lvl_text;
            for level in 0..=ilvl {
                let value = if level == ilvl {
                    counter
                } else {
                    self.counters
                        .get(&(num_id.to_string(), level))
                        .copied()
                        .unwrap_or(1)
                };
                label = label.replace(&format!("%{}", level + 1), &value.to_string());
            }
            label
        } else {
            "\u{2022}".to_string()
        };
        Some((ordered, ilvl, label))
    }

    fn parse_blocks(&mut self, parent: roxmltree::Node, blocks: &mut Vec<Block>) {
        for node in parent.children() {
            if node.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match node.tag_name().name() {
                "p" => blocks.push(self.parse_paragraph(node)),
                "tbl" => blocks.push(Block::Table(self.parse_table(node))),
                "sdt" => {
                    if let Some(content) = wml(node, "sdtContent") {
                        self.parse_blocks(content, blocks);
                    }
                }
                "sectPr" | "tcPr" | "bookmarkStart" | "bookmarkEnd" | "proofErr" => {}
                other => self.warn(format!("Unsupported element ignored: w:{other}")),
            }
        }
    }

    fn parse_table(&mut self, tbl: roxmltree::Node) -> Table {
        let mut rows = Vec::new();
        for tr in tbl.children().filter(|n| is_wml(*n, "tr")) {
            let mut cells = Vec::new();
            for tc in tr.children().filter(|n| is_wml(*n, "tc")) {
                let mut blocks = Vec::new();
                self.parse_blocks(tc, &mut blocks);
                cells.push(blocks);
            }
            rows.push(cells);
        }
        Table { rows }
    }

    fn parse_paragraph(&mut self, node: roxmltree::Node) -> Block {
        let ppr = wml(node, "pPr");

        let kind = match ppr.and_then(|ppr| wml_attr(ppr, "pStyle")) {
            Some(style_id) => self.paragraph_kind(style_id),
            None => ParagraphKind::Normal,
        };

        let mut inlines = Vec::new();
        self.collect_inlines(node, None, &mut inlines);

        let list = ppr
            .and_then(|ppr| wml(ppr, "numPr"))
            .and_then(|num_pr| self.list_info(num_pr));

        match list {
            Some((ordered, level, label)) if !matches!(kind, ParagraphKind::Heading(_)) => {
                Block::ListItem(ListItem { ordered, level, label, inlines })
            }
            _ => Block::Paragraph(Paragraph::new(kind, inlines)),
        }
    }

    fn collect_inlines(&mut self, parent: roxmltree::Node, link: Option<&str>, out: &mut Vec<Inline>) {
        for child in parent.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "r" => self.parse_run(child, link, out),
                "hyperlink" => {
                    let target = self.hyperlink_target(child);
                    self.collect_inlines(child, target.as_deref().or(link), out);
                }
                "ins" | "smartTag" | "fldSimple" | "customXml" => self.collect_inlines(child, link, out),
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        self.collect_inlines(content, link, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn hyperlink_target(&self, node: roxmltree::Node) -> Option<String> {
        if let Some(rel) = node
            .attribute((REL_NS, "id"))
            .and_then(|id| self.rels.get(id))
        {
            return Some(rel.target.clone());
        }
        node.attribute((WML_NS, "anchor")).map(|a| format!("#{a}"))
    }

    fn parse_run(&mut self, run_node: roxmltree::Node, link: Option<&str>, out: &mut Vec<Inline>) {
        let rpr = wml(run_node, "rPr");

        let template = Run {
            text: String::new(),
            bold: toggle(rpr.and_then(|n| wml(n, "b"))),
            italic: toggle(rpr.and_then(|n| wml(n, "i"))),
            underline: toggle(rpr.and_then(|n| wml(n, "u"))),
            strike: toggle(rpr.and_then(|n| wml(n, "strike")))
                || toggle(rpr.and_then(|n| wml(n, "dstrike"))),
            monospace: rpr
                .and_then(|n| wml(n, "rFonts"))
                .and_then(|f| f.attribute((WML_NS, "ascii")))
                .is_some_and(is_monospace_font),
            color: rpr
                .and_then(|n| wml_attr(n, "color"))
                .and_then(parse_hex_color),
            link: link.map(str::to_string),
        };

        let mut text = String::new();
        let flush = |text: &mut String, out: &mut Vec<Inline>| {
            if !text.is_empty() {
                out.push(Inline::Text(Run {
                    text: std::mem::take(text),
                    ..template.clone()
                }));
            }
        };

        for child in run_node.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "t" => text.push_str(child.text().unwrap_or("")),
                "tab" => text.push('\t'),
                "noBreakHyphen" => text.push('-'),
                "br" | "cr" => {
                    flush(&mut text, out);
                    out.push(Inline::Break);
                }
                "drawing" => {
                    flush(&mut text, out);
                    if let Some(image) = self.parse_drawing(child) {
                        out.push(Inline::Image(image));
                    }
                }
                "pict" | "object" => {
                    self.warn("Embedded object or legacy picture ignored".to_string());
                }
                _ => {}
            }
        }
        flush(&mut text, out);
    }

    fn parse_drawing(&mut self, drawing: roxmltree::Node) -> Option<Image> {
        let alt = drawing
            .descendants()
            .find(|n| n.tag_name().name() == "docPr" && n.tag_name().namespace() == Some(WPD_NS))
            .and_then(|n| n.attribute("descr").or_else(|| n.attribute("title")))
            .unwrap_or("")
            .to_string();

        let Some(blip) = drawing
            .descendants()
            .find(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS))
        else {
            self.warn("Drawing without an image ignored".to_string());
            return None;
        };

        if let Some(rel_id) = blip.attribute((REL_NS, "link")) {
            let src = self.rels.get(rel_id).map(|r| r.target.clone())?;
            return Some(Image { src, alt });
        }

        let rel_id = blip.attribute((REL_NS, "embed"))?;
        let Some(rel) = self.rels.get(rel_id) else {
            self.warn(format!("Image relationship {rel_id} not found"));
            return None;
        };
        if rel.external {
            return Some(Image { src: rel.target.clone(), alt });
        }

        let part = part_path(&rel.target);
        let mut data = Vec::new();
        let read = self
            .zip
            .by_name(&part)
            .ok()
            .and_then(|mut f| f.read_to_end(&mut data).ok());
        if read.is_none() {
            self.warn(format!("Image {part} could not be read from the package"));
            return None;
        }

        let src = format!("data:{};base64,{}", mime_type(&part), STANDARD.encode(&data));
        Some(Image { src, alt })
    }
}

/// Resolve a relationship target relative to `word/`.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let mut parts: Vec<&str> = vec!["word"];
            for segment in target.split('/') {
                match segment {
                    ".." => {
                        parts.pop();
                    }
                    "." | "" => {}
                    s => parts.push(s),
                }
            }
            parts.join("/")
        }
    }
}

fn mime_type(part: &str) -> &'static str {
    let ext = part.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        _ => "application/octet-stream",
    }
}

pub fn parse(path: &Path) -> Result<ParsedDocx, Error> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    parse_reader(file)
}

pub fn parse_reader<R: Read + Seek>(reader: R) -> Result<ParsedDocx, Error> {
    let mut zip = zip::ZipArchive::new(reader)?;

    let styles = parse_styles(&mut zip);
    let numbering = parse_numbering(&mut zip);
    let rels = parse_relationships(&mut zip);
    let title = parse_title(&mut zip);

    let xml_content = read_part(&mut zip, "word/document.xml")
        .ok_or_else(|| Error::InvalidDocx("missing word/document.xml".into()))?;
    let xml = roxmltree::Document::parse(&xml_content)?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;

    let mut parser = Parser {
        zip: &mut zip,
        styles,
        numbering,
        rels,
        counters: HashMap::new(),
        warned_styles: HashSet::new(),
        messages: Vec::new(),
    };
    let mut blocks = Vec::new();
    parser.parse_blocks(body, &mut blocks);
    let messages = parser.messages;

    Ok(ParsedDocx {
        document: Document { title, blocks },
        messages,
    })
}
