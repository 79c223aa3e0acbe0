//! Font selection for the PDF renderer.
//!
//! Text is always written as single-byte WinAnsi strings. A requested family
//! is looked up in the font directories and embedded as a simple TrueType
//! font; otherwise the standard Helvetica and Courier faces are referenced
//! by name and measured with their built-in metrics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdf_writer::types::FontFlags;
use pdf_writer::{Name, Pdf, Rect, Ref};
use ttf_parser::Face;

/// The five faces the PDF renderer draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl FontStyle {
    pub(crate) const ALL: [FontStyle; 5] = [
        FontStyle::Regular,
        FontStyle::Bold,
        FontStyle::Italic,
        FontStyle::BoldItalic,
        FontStyle::Mono,
    ];

    pub(crate) fn from_flags(bold: bool, italic: bool, mono: bool) -> Self {
        match (mono, bold, italic) {
            (true, _, _) => FontStyle::Mono,
            (false, true, true) => FontStyle::BoldItalic,
            (false, true, false) => FontStyle::Bold,
            (false, false, true) => FontStyle::Italic,
            (false, false, false) => FontStyle::Regular,
        }
    }

    fn bold(self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    fn italic(self) -> bool {
        matches!(self, FontStyle::Italic | FontStyle::BoldItalic)
    }

    fn standard_name(self) -> &'static [u8] {
        match self {
            FontStyle::Regular => b"Helvetica",
            FontStyle::Bold => b"Helvetica-Bold",
            FontStyle::Italic => b"Helvetica-Oblique",
            FontStyle::BoldItalic => b"Helvetica-BoldOblique",
            FontStyle::Mono => b"Courier",
        }
    }
}

/// A face registered in the PDF, with advance widths for bytes 32..=255.
pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    pub(crate) widths_1000: Vec<f32>,
}

impl FontEntry {
    /// Advance width in points of WinAnsi-encoded `bytes` at `size`.
    pub(crate) fn width(&self, bytes: &[u8], size: f32) -> f32 {
        let units: f32 = bytes
            .iter()
            .filter_map(|&b| b.checked_sub(FIRST_CHAR))
            .map(|i| self.widths_1000.get(usize::from(i)).copied().unwrap_or(556.0))
            .sum();
        units * size / 1000.0
    }
}

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

// Windows-1252 code points in 0x80..=0x9F that differ from Latin-1.
const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

fn winansi_char(byte: u8) -> Option<char> {
    match byte {
        0x80..=0x9F => WINANSI_HIGH.iter().find(|(b, _)| *b == byte).map(|(_, c)| *c),
        _ => Some(char::from(byte)),
    }
}

fn winansi_byte(c: char) -> Option<u8> {
    match u32::from(c) {
        0x20..=0x7E | 0xA0..=0xFF => u8::try_from(u32::from(c)).ok(),
        _ => WINANSI_HIGH.iter().find(|(_, ch)| *ch == c).map(|(b, _)| *b),
    }
}

/// Encode `s` as WinAnsi bytes. Tabs become spaces, other control characters
/// are dropped, and anything WinAnsi cannot express becomes `?`. The flag
/// reports whether any substitution happened.
pub(crate) fn to_winansi_bytes(s: &str) -> (Vec<u8>, bool) {
    let mut substituted = false;
    let mut bytes = Vec::with_capacity(s.len());
    for c in s.chars() {
        if c == '\t' {
            bytes.push(b' ');
        } else if c.is_control() {
            continue;
        } else if let Some(b) = winansi_byte(c) {
            bytes.push(b);
        } else {
            substituted = true;
            bytes.push(b'?');
        }
    }
    (bytes, substituted)
}

// Helvetica and Helvetica-Bold AFM widths for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];
#[rustfmt::skip]
const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Widths of the standard face for bytes 32..=255. Bytes above ASCII use
/// the average lowercase advance, except the non-breaking space.
fn standard_widths(style: FontStyle) -> Vec<f32> {
    let ascii: &[u16; 95] = match style {
        FontStyle::Mono => return vec![600.0; usize::from(LAST_CHAR - FIRST_CHAR) + 1],
        FontStyle::Bold | FontStyle::BoldItalic => &HELVETICA_BOLD_ASCII,
        FontStyle::Regular | FontStyle::Italic => &HELVETICA_ASCII,
    };
    (FIRST_CHAR..=LAST_CHAR)
        .map(|b| match b {
            32..=126 => f32::from(ascii[usize::from(b - FIRST_CHAR)]),
            0xA0 => f32::from(ascii[0]),
            _ => 556.0,
        })
        .collect()
}

/// Installed faces keyed by (lowercase family, bold, italic).
struct FontIndex {
    faces: HashMap<(String, bool, bool), (PathBuf, u32)>,
}

static FONT_INDEX: OnceLock<FontIndex> = OnceLock::new();

impl FontIndex {
    fn global() -> &'static FontIndex {
        FONT_INDEX.get_or_init(|| FontIndex::scan(&search_dirs()))
    }

    fn scan(dirs: &[PathBuf]) -> FontIndex {
        let mut index = FontIndex { faces: HashMap::new() };
        let mut pending: Vec<PathBuf> = dirs.iter().rev().cloned().collect();
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for path in entries.flatten().map(|e| e.path()) {
                if path.is_dir() {
                    pending.push(path);
                } else {
                    index.add_file(&path);
                }
            }
        }
        log::debug!("indexed {} font faces", index.faces.len());
        index
    }

    fn add_file(&mut self, path: &Path) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if !matches!(ext.as_deref(), Some("ttf" | "otf" | "ttc")) {
            return;
        }
        let Ok(data) = std::fs::read(path) else {
            return;
        };
        let faces = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for face_index in 0..faces {
            let Ok(face) = Face::parse(&data, face_index) else {
                continue;
            };
            let Some(family) = family_name(&face) else {
                continue;
            };
            // First directory wins, so DOCSHIFT_FONTS overrides system fonts.
            self.faces
                .entry((family.to_lowercase(), face.is_bold(), face.is_italic()))
                .or_insert_with(|| (path.to_path_buf(), face_index));
        }
    }

    /// The exact style, else the family's regular face.
    fn lookup(&self, family: &str, style: FontStyle) -> Option<&(PathBuf, u32)> {
        let family = family.to_lowercase();
        self.faces
            .get(&(family.clone(), style.bold(), style.italic()))
            .or_else(|| self.faces.get(&(family, false, false)))
    }
}

// Name ID 1 (family) keeps "Noto Sans" and "Noto Sans Mono" apart; ID 16 would merge them.
fn family_name(face: &Face) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|n| n.name_id == ttf_parser::name_id::FAMILY && n.is_unicode())
        .find_map(|n| n.to_string())
}

/// `DOCSHIFT_FONTS` directories first, then the platform's font directories.
fn search_dirs() -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut dirs: Vec<PathBuf> = std::env::var("DOCSHIFT_FONTS")
        .map(|v| {
            v.split(separator)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();

    let home = std::env::var_os("HOME").map(PathBuf::from);
    if cfg!(target_os = "macos") {
        dirs.extend(
            ["/Library/Fonts", "/System/Library/Fonts", "/System/Library/Fonts/Supplemental"]
                .map(PathBuf::from),
        );
        dirs.extend(home.map(|h| h.join("Library/Fonts")));
    } else if cfg!(windows) {
        let windir = std::env::var_os("WINDIR").map_or_else(|| PathBuf::from("C:\\Windows"), PathBuf::from);
        dirs.push(windir.join("Fonts"));
    } else {
        dirs.extend(["/usr/share/fonts", "/usr/local/share/fonts"].map(PathBuf::from));
        if let Some(home) = home {
            dirs.push(home.join(".local/share/fonts"));
            dirs.push(home.join(".fonts"));
        }
    }
    dirs
}

/// Metrics of an installed face in PDF glyph space (1000 units per em).
struct FaceMetrics {
    bbox: Rect,
    ascent: f32,
    descent: f32,
    cap_height: f32,
    italic: bool,
    widths: Vec<f32>,
}

impl FaceMetrics {
    fn read(face: &Face) -> FaceMetrics {
        let scale = 1000.0 / f32::from(face.units_per_em());
        let bb = face.global_bounding_box();
        FaceMetrics {
            bbox: Rect::new(
                f32::from(bb.x_min) * scale,
                f32::from(bb.y_min) * scale,
                f32::from(bb.x_max) * scale,
                f32::from(bb.y_max) * scale,
            ),
            ascent: f32::from(face.ascender()) * scale,
            descent: f32::from(face.descender()) * scale,
            cap_height: face.capital_height().map_or(700.0, |h| f32::from(h) * scale),
            italic: face.is_italic(),
            widths: (FIRST_CHAR..=LAST_CHAR)
                .map(|b| {
                    winansi_char(b)
                        .and_then(|c| face.glyph_index(c))
                        .and_then(|g| face.glyph_hor_advance(g))
                        .map_or(0.0, |adv| f32::from(adv) * scale)
                })
                .collect(),
        }
    }
}

/// Ids of the three objects a simple TrueType font occupies.
struct FontRefs {
    font: Ref,
    descriptor: Ref,
    file: Ref,
}

/// Write `data` as an embedded TrueType font with WinAnsi encoding.
/// Returns its widths, or `None` when the file is not a usable font.
fn embed_truetype(pdf: &mut Pdf, refs: &FontRefs, family: &str, data: &[u8], face_index: u32) -> Option<Vec<f32>> {
    let face = Face::parse(data, face_index).ok()?;
    let metrics = FaceMetrics::read(&face);
    let length = i32::try_from(data.len()).ok()?;
    let base_font: String = family.chars().filter(|c| !c.is_whitespace()).collect();

    pdf.stream(refs.file, data).pair(Name(b"Length1"), length);
    pdf.font_descriptor(refs.descriptor)
        .name(Name(base_font.as_bytes()))
        .flags(FontFlags::NON_SYMBOLIC)
        .bbox(metrics.bbox)
        .italic_angle(if metrics.italic { -12.0 } else { 0.0 })
        .ascent(metrics.ascent)
        .descent(metrics.descent)
        .cap_height(metrics.cap_height)
        .stem_v(80.0)
        .font_file2(refs.file);

    {
        let mut font = pdf.indirect(refs.font).dict();
        font.pair(Name(b"Type"), Name(b"Font"))
            .pair(Name(b"Subtype"), Name(b"TrueType"))
            .pair(Name(b"BaseFont"), Name(base_font.as_bytes()))
            .pair(Name(b"Encoding"), Name(b"WinAnsiEncoding"))
            .pair(Name(b"FirstChar"), i32::from(FIRST_CHAR))
            .pair(Name(b"LastChar"), i32::from(LAST_CHAR))
            .pair(Name(b"FontDescriptor"), refs.descriptor);
        font.insert(Name(b"Widths")).array().items(metrics.widths.iter().copied());
    }

    Some(metrics.widths)
}

/// Candidate families from a list such as `"Noto Sans, Arial"`.
fn family_candidates(families: &str) -> impl Iterator<Item = &str> {
    families
        .split([',', ';'])
        .map(|f| f.trim().trim_matches(['"', '\'']))
        .filter(|f| !f.is_empty())
}

/// Register one face in the PDF: the first installed family from `family`
/// for text faces, otherwise the matching standard Type 1 font.
pub(crate) fn register_font(
    pdf: &mut Pdf,
    family: Option<&str>,
    style: FontStyle,
    pdf_name: String,
    alloc: &mut impl FnMut() -> Ref,
) -> FontEntry {
    let refs = FontRefs { font: alloc(), descriptor: alloc(), file: alloc() };

    let requested = family.filter(|_| style != FontStyle::Mono);
    let embedded = requested.and_then(|families| {
        family_candidates(families).find_map(|name| {
            let (path, face_index) = FontIndex::global().lookup(name, style)?;
            let data = std::fs::read(path).ok()?;
            log::debug!("embedding {name} ({style:?}) from {}", path.display());
            embed_truetype(pdf, &refs, name, &data, *face_index)
        })
    });

    let widths = match embedded {
        Some(widths) => widths,
        None => {
            if let Some(families) = requested {
                log::warn!("Font not found: {families} ({style:?}), using standard fonts");
            }
            pdf.type1_font(refs.font)
                .base_font(Name(style.standard_name()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            standard_widths(style)
        }
    };

    FontEntry { pdf_name, font_ref: refs.font, widths_1000: widths }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winansi_substitutes_unmappable_chars() {
        let (bytes, substituted) = to_winansi_bytes("caf\u{e9} \u{2014} \u{65e5}");
        assert_eq!(bytes, [b'c', b'a', b'f', 0xE9, b' ', 0x97, b' ', b'?']);
        assert!(substituted);
        let (bytes, substituted) = to_winansi_bytes("a\tb\u{7}");
        assert_eq!(bytes, b"a b");
        assert!(!substituted);
    }

    #[test]
    fn high_range_maps_both_ways() {
        for (byte, c) in WINANSI_HIGH {
            assert_eq!(winansi_byte(c), Some(byte));
            assert_eq!(winansi_char(byte), Some(c));
        }
        assert_eq!(winansi_char(0x81), None);
    }

    #[test]
    fn widths_scale_with_size() {
        let entry = FontEntry {
            pdf_name: "F1".into(),
            font_ref: Ref::new(1),
            widths_1000: standard_widths(FontStyle::Mono),
        };
        assert!((entry.width(b"abcd", 10.0) - 24.0).abs() < 1e-4);
    }

    #[test]
    fn helvetica_metrics_distinguish_narrow_glyphs() {
        let regular = standard_widths(FontStyle::Regular);
        let bold = standard_widths(FontStyle::Bold);
        assert_eq!(regular.len(), 224);
        assert_eq!(regular[usize::from(b'i' - FIRST_CHAR)], 222.0);
        assert_eq!(bold[usize::from(b'i' - FIRST_CHAR)], 278.0);
        assert_eq!(regular[usize::from(b'W' - FIRST_CHAR)], 944.0);
    }

    #[test]
    fn family_lists_split_on_commas() {
        let families: Vec<&str> = family_candidates("\"Noto Sans\", Arial;;").collect();
        assert_eq!(families, ["Noto Sans", "Arial"]);
    }
}
