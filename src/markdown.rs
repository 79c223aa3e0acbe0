//! Markdown preprocessing and rendering.
//!
//! Preprocessing is a fixed sequence of `&str -> String` passes run before
//! the text reaches the CommonMark renderer:
//!
//! 1. strip a leading `---` front-matter block
//! 2. drop standalone directive lines such as `[TOC]`
//! 3. collapse repeated heading markers (`# # Title` -> `# Title`)
//!
//! Passes 2 and 3 leave fenced code blocks alone.

use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;

static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\x{FEFF}?\s*---[ \t]*\r?\n(.*?\r?\n)?---[ \t]*(?:\r?\n|\z)")
        .expect("front matter pattern")
});
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\A[ \t]*(?:\[\[?_?toc_?\]\]?|\{:toc\}|@\[toc\]|\$\{toc\})[ \t]*\z")
        .expect("directive pattern")
});
static REPEATED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A([ ]{0,3}#{1,6})(?:[ \t]+#{1,6})+[ \t]+").expect("heading pattern")
});
static TITLE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^title[ \t]*:[ \t]*["']?(.*?)["']?[ \t]*\r?$"#).expect("title pattern")
});

/// Run every preprocessing pass in order.
pub fn preprocess(markdown: &str) -> String {
    let s = strip_front_matter(markdown);
    let s = strip_directives(&s);
    collapse_heading_markers(&s)
}

/// Remove a leading block fenced by two `---` lines.
pub fn strip_front_matter(markdown: &str) -> String {
    match FRONT_MATTER.find(markdown) {
        Some(m) => markdown[m.end()..].to_string(),
        None => markdown.to_string(),
    }
}

/// `title:` value from the front-matter block, if there is one.
pub fn front_matter_title(markdown: &str) -> Option<String> {
    let block = FRONT_MATTER.captures(markdown)?.get(1)?;
    let title = TITLE_FIELD.captures(block.as_str())?.get(1)?.as_str().trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Drop lines that consist of a table-of-contents directive only.
pub fn strip_directives(markdown: &str) -> String {
    map_lines_outside_fences(markdown, |line| {
        if DIRECTIVE.is_match(line.trim_end_matches(['\r', '\n'])) {
            None
        } else {
            Some(line.to_string())
        }
    })
}

/// Collapse `# # Title` (or `## ## Title`) into a single marker run.
pub fn collapse_heading_markers(markdown: &str) -> String {
    map_lines_outside_fences(markdown, |line| {
        Some(REPEATED_HEADING.replace(line, "$1 ").into_owned())
    })
}

/// Apply `f` to every line that is not inside a fenced code block.
/// Lines keep their terminators; returning `None` drops the line.
fn map_lines_outside_fences<F>(markdown: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(markdown.len());
    let mut fence: Option<(char, usize)> = None;

    for line in markdown.split_inclusive('\n') {
        let marker = fence_marker(line);
        match (fence, marker) {
            (None, Some(open)) => {
                fence = Some(open);
                out.push_str(line);
            }
            (Some((ch, len)), Some((close_ch, close_len))) if ch == close_ch && close_len >= len => {
                fence = None;
                out.push_str(line);
            }
            (Some(_), _) => out.push_str(line),
            (None, None) => {
                if let Some(mapped) = f(line) {
                    out.push_str(&mapped);
                }
            }
        }
    }
    out
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Render Markdown (already preprocessed) to an HTML fragment.
pub fn render(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut out, parser);
    out
}

/// Text of the first level-1 heading.
pub fn first_heading(markdown: &str) -> Option<String> {
    let mut in_h1 = false;
    let mut title = String::new();
    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let trimmed = title.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
                in_h1 = false;
            }
            Event::Text(text) | Event::Code(text) if in_h1 => title.push_str(&text),
            _ => {}
        }
    }
    None
}
