//! Encoding detection and repair for HTML files.
//!
//! [`normalize`] makes sure an HTML file on disk is UTF-8, declares UTF-8
//! exactly once, and is closed by `</body>` and `</html>`. The file is only
//! rewritten when something had to change, so running it twice is a no-op
//! the second time.
//!
//! The statistical detector and the diagnostic output are both injected
//! ([`CharsetClassifier`], [`DiagnosticSink`]) so [`normalize_with`] can be
//! driven by fakes. [`normalize_bytes`] is the pure core with no I/O at all.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use encoding_rs::{EUC_JP, Encoding, ISO_2022_JP, SHIFT_JIS, UTF_8};
use regex::Regex;

use crate::error::Error;

/// The declaration written when one is missing or declares another charset.
pub const CANONICAL_DECLARATION: &str = r#"<meta charset="UTF-8">"#;

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<meta\b[^>]*>").expect("meta pattern"));
static TAG_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern")
});
static CONTENT_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bcharset\s*=\s*["']?\s*([^\s"';]*)"#).expect("content charset pattern")
});
static HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head\b[^>]*>").expect("head pattern"));
static BODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("body pattern"));
static HTML_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</html\s*>").expect("html pattern"));

/// Presumed source encoding of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CharsetLabel {
    Utf8,
    ShiftJis,
    EucJp,
    Iso2022Jp,
    Unknown,
}

impl CharsetLabel {
    pub fn name(self) -> &'static str {
        match self {
            CharsetLabel::Utf8 => "UTF-8",
            CharsetLabel::ShiftJis => "Shift_JIS",
            CharsetLabel::EucJp => "EUC-JP",
            CharsetLabel::Iso2022Jp => "ISO-2022-JP",
            CharsetLabel::Unknown => "unknown",
        }
    }

    /// Resolve a user-supplied label such as `sjis`, `cp932` or `utf8`.
    ///
    /// Labels follow the WHATWG Encoding Standard; anything that does not
    /// resolve to one of the four supported charsets is rejected.
    pub fn from_label(label: &str) -> Result<Self, Error> {
        let unsupported = || Error::UnsupportedCharset(label.to_string());
        let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(unsupported)?;
        match Self::from_encoding(encoding) {
            CharsetLabel::Unknown => Err(unsupported()),
            known => Ok(known),
        }
    }

    fn from_encoding(encoding: &'static Encoding) -> Self {
        if encoding == UTF_8 {
            CharsetLabel::Utf8
        } else if encoding == SHIFT_JIS {
            CharsetLabel::ShiftJis
        } else if encoding == EUC_JP {
            CharsetLabel::EucJp
        } else if encoding == ISO_2022_JP {
            CharsetLabel::Iso2022Jp
        } else {
            CharsetLabel::Unknown
        }
    }

    /// Encoding to transcode from; `None` means "decode as UTF-8".
    fn transcoder(self) -> Option<&'static Encoding> {
        match self {
            CharsetLabel::ShiftJis => Some(SHIFT_JIS),
            CharsetLabel::EucJp => Some(EUC_JP),
            CharsetLabel::Iso2022Jp => Some(ISO_2022_JP),
            CharsetLabel::Utf8 | CharsetLabel::Unknown => None,
        }
    }
}

impl fmt::Display for CharsetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifies raw bytes into a [`CharsetLabel`].
pub trait CharsetClassifier {
    fn classify(&self, bytes: &[u8]) -> CharsetLabel;
}

impl<F> CharsetClassifier for F
where
    F: Fn(&[u8]) -> CharsetLabel,
{
    fn classify(&self, bytes: &[u8]) -> CharsetLabel {
        self(bytes)
    }
}

/// Byte-frequency detection backed by `chardetng`.
///
/// Valid UTF-8 (pure ASCII included) is reported as UTF-8 without consulting
/// the detector. Other input is guessed with the `jp` domain hint, since every
/// legacy charset handled here is Japanese; guesses outside that set come
/// back as [`CharsetLabel::Unknown`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StatisticalClassifier;

impl CharsetClassifier for StatisticalClassifier {
    fn classify(&self, bytes: &[u8]) -> CharsetLabel {
        if std::str::from_utf8(bytes).is_ok() {
            return CharsetLabel::Utf8;
        }
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(bytes, true);
        let guess = detector.guess(Some(b"jp"), true);
        log::debug!("statistical detector guessed {}", guess.name());
        CharsetLabel::from_encoding(guess)
    }
}

/// True when the bytes contain an ISO-2022-JP escape (`ESC $ B` or `ESC ( B`).
pub fn has_jis_escape(bytes: &[u8]) -> bool {
    bytes
        .windows(3)
        .any(|w| w == b"\x1b$B" || w == b"\x1b(B")
}

/// Classify `bytes`, letting a JIS escape sequence override the classifier.
pub fn detect<C>(bytes: &[u8], classifier: &C) -> CharsetLabel
where
    C: CharsetClassifier + ?Sized,
{
    let statistical = classifier.classify(bytes);
    if has_jis_escape(bytes) {
        if statistical != CharsetLabel::Iso2022Jp {
            log::debug!("JIS escape sequence found, overriding {statistical} with ISO-2022-JP");
        }
        return CharsetLabel::Iso2022Jp;
    }
    statistical
}

/// What [`normalize`] did to a file.
///
/// `detected_charset` is the label the content was decoded from, whether it
/// was forced by the caller or detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizationResult {
    /// The file was rewritten.
    pub was_modified: bool,
    pub detected_charset: CharsetLabel,
}

/// Output of [`normalize_bytes`]: the canonical text plus what happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub result: NormalizationResult,
    /// Some input bytes were not valid in the detected charset and were
    /// replaced with U+FFFD.
    pub lossy: bool,
}

/// Human-readable outcome of one normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    Rewritten { path: PathBuf, charset: CharsetLabel },
    Unchanged { path: PathBuf, charset: CharsetLabel },
    LossyDecode { path: PathBuf, charset: CharsetLabel },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Rewritten { path, charset } => {
                write!(f, "normalized {} to UTF-8 (detected {charset})", path.display())
            }
            Diagnostic::Unchanged { path, charset } => {
                write!(f, "{} is already normalized (detected {charset})", path.display())
            }
            Diagnostic::LossyDecode { path, charset } => write!(
                f,
                "{} contains bytes that are invalid as {charset}; replaced with U+FFFD",
                path.display()
            ),
        }
    }
}

pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::LossyDecode { .. } => log::warn!("{diagnostic}"),
            _ => log::info!("{diagnostic}"),
        }
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Normalize the HTML file at `path` in place, logging the outcome.
pub fn normalize(path: &Path, forced_charset: Option<&str>) -> Result<NormalizationResult, Error> {
    normalize_with(path, forced_charset, &StatisticalClassifier, &mut LogSink)
}

/// [`normalize`] with an explicit classifier and diagnostic sink.
///
/// Reads the file once and writes it back only when the content changed.
/// The write is not atomic: callers must not normalize the same path
/// concurrently.
pub fn normalize_with<C, S>(
    path: &Path,
    forced_charset: Option<&str>,
    classifier: &C,
    sink: &mut S,
) -> Result<NormalizationResult, Error>
where
    C: CharsetClassifier + ?Sized,
    S: DiagnosticSink + ?Sized,
{
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;

    let normalized = normalize_bytes(&bytes, forced_charset, classifier)?;
    let charset = normalized.result.detected_charset;
    let path = path.to_path_buf();

    if normalized.lossy {
        sink.report(Diagnostic::LossyDecode { path: path.clone(), charset });
    }
    if normalized.result.was_modified {
        std::fs::write(&path, normalized.text.as_bytes())?;
        sink.report(Diagnostic::Rewritten { path, charset });
    } else {
        sink.report(Diagnostic::Unchanged { path, charset });
    }

    Ok(normalized.result)
}

/// Detect, transcode and repair `bytes` without touching the filesystem.
pub fn normalize_bytes<C>(
    bytes: &[u8],
    forced_charset: Option<&str>,
    classifier: &C,
) -> Result<Normalized, Error>
where
    C: CharsetClassifier + ?Sized,
{
    let charset = match forced_charset {
        Some(label) => CharsetLabel::from_label(label)?,
        None => detect(bytes, classifier),
    };

    let mut modified = false;
    let (text, lossy) = match charset.transcoder() {
        Some(encoding) => {
            let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
            modified = true;
            (decoded.into_owned(), had_errors)
        }
        None => match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), false),
            Err(_) => {
                modified = true;
                (String::from_utf8_lossy(bytes).into_owned(), true)
            }
        },
    };

    let (mut text, declaration_changed) = repair_declaration(&text);
    modified |= declaration_changed;
    modified |= close_structure(&mut text);

    Ok(Normalized {
        text,
        result: NormalizationResult {
            was_modified: modified,
            detected_charset: charset,
        },
        lossy,
    })
}

fn is_utf8_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

/// The charset a `<meta>` tag declares, if it is a declaration at all.
///
/// Only a `charset` attribute, or the `content` of an
/// `http-equiv="Content-Type"` tag, counts. An empty value is still a
/// declaration.
fn declared_charset(tag: &str) -> Option<String> {
    let mut charset = None;
    let mut content_type = false;
    let mut content = None;
    for caps in TAG_ATTR.captures_iter(tag) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        match caps[1].to_ascii_lowercase().as_str() {
            "charset" => charset = Some(value.trim().trim_end_matches('/').to_string()),
            "http-equiv" => content_type = value.trim().eq_ignore_ascii_case("content-type"),
            "content" => content = Some(value),
            _ => {}
        }
    }
    if charset.is_some() {
        return charset;
    }
    if !content_type {
        return None;
    }
    let caps = CONTENT_CHARSET.captures(content?)?;
    Some(caps[1].to_string())
}

/// Every charset declaration in `text`, with whether it already says UTF-8.
fn declarations(text: &str) -> Vec<(Range<usize>, bool)> {
    META_TAG
        .find_iter(text)
        .filter_map(|tag| {
            let label = declared_charset(tag.as_str())?;
            Some((tag.range(), is_utf8_label(&label)))
        })
        .collect()
}

/// Leave exactly one declaration, and make it declare UTF-8.
fn repair_declaration(text: &str) -> (String, bool) {
    let found = declarations(text);
    match found.as_slice() {
        [] => (insert_declaration(text), true),
        [(_, true)] => (text.to_string(), false),
        _ => {
            let mut out = String::with_capacity(text.len());
            let mut last = 0;
            for (i, (range, is_utf8)) in found.iter().enumerate() {
                out.push_str(&text[last..range.start]);
                if i == 0 {
                    if *is_utf8 {
                        out.push_str(&text[range.clone()]);
                    } else {
                        out.push_str(CANONICAL_DECLARATION);
                    }
                }
                last = range.end;
            }
            out.push_str(&text[last..]);
            (out, true)
        }
    }
}

fn insert_declaration(text: &str) -> String {
    match HEAD_OPEN.find(text) {
        Some(head) => {
            let mut out = String::with_capacity(text.len() + CANONICAL_DECLARATION.len());
            out.push_str(&text[..head.end()]);
            out.push_str(CANONICAL_DECLARATION);
            out.push_str(&text[head.end()..]);
            out
        }
        None => format!("<head>{CANONICAL_DECLARATION}</head>\n{text}"),
    }
}

/// Append `</body>` and `</html>` when absent. Returns whether anything was added.
fn close_structure(text: &mut String) -> bool {
    let mut modified = false;
    if !BODY_CLOSE.is_match(text) {
        append_marker(text, "</body>");
        modified = true;
    }
    if !HTML_CLOSE.is_match(text) {
        append_marker(text, "</html>");
        modified = true;
    }
    modified
}

fn append_marker(text: &mut String, marker: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(marker);
    text.push('\n');
}
