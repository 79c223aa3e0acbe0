use std::fs;
use std::path::PathBuf;

use docshift::model::{Block, Inline, ParagraphKind};
use docshift::{Error, PageSize, PdfOptions};
use tempfile::TempDir;

fn page_count(pdf: &[u8]) -> usize {
    let needle = b"/Type /Page";
    pdf.windows(needle.len() + 1)
        .filter(|w| &w[..needle.len()] == needle && w[needle.len()] != b's')
        .count()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn write_input(dir: &TempDir, name: &str, bytes: &[u8]) -> (PathBuf, PathBuf) {
    let input = dir.path().join(name);
    fs::write(&input, bytes).unwrap();
    (input.clone(), input.with_extension("pdf"))
}

fn paragraphs(n: usize) -> String {
    (0..n)
        .map(|i| format!("<p>Paragraph {i} has enough words in it to wrap across a line or two of the page.</p>\n"))
        .collect()
}

#[test]
fn short_document_renders_one_page() {
    let dir = TempDir::new().unwrap();
    let html = "<html><head><meta charset=\"utf-8\"><title>Hello</title></head>\
                <body><h1>Hello</h1><p>World</p></body></html>";
    let (input, output) = write_input(&dir, "hello.html", html.as_bytes());

    docshift::convert_html_to_pdf(&input, &output, &PdfOptions::default()).unwrap();

    let pdf = fs::read(&output).unwrap();
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(page_count(&pdf), 1);
    assert!(contains(&pdf, b"(Hello)"));
    assert!(contains(&pdf, b"595.28") && contains(&pdf, b"841.89"));
}

#[test]
fn page_count_grows_with_content() {
    let dir = TempDir::new().unwrap();
    let (short_in, short_out) = write_input(&dir, "short.html", paragraphs(3).as_bytes());
    let (long_in, long_out) = write_input(&dir, "long.html", paragraphs(200).as_bytes());
    let opts = PdfOptions::default();

    docshift::convert_html_to_pdf(&short_in, &short_out, &opts).unwrap();
    docshift::convert_html_to_pdf(&long_in, &long_out, &opts).unwrap();

    let short = page_count(&fs::read(&short_out).unwrap());
    let long = page_count(&fs::read(&long_out).unwrap());
    assert_eq!(short, 1);
    assert!(long > 3, "expected several pages, got {long}");
}

#[test]
fn input_is_normalized_in_place_first() {
    let dir = TempDir::new().unwrap();
    let html = "<html><head><title>x</title></head><body><p>caf\u{e9}</p>";
    let (encoded, _, _) = encoding_rs::EUC_JP.encode(html);
    let (input, output) = write_input(&dir, "legacy.html", &encoded);
    let opts = PdfOptions {
        charset: Some("euc-jp".into()),
        ..PdfOptions::default()
    };

    docshift::convert_html_to_pdf(&input, &output, &opts).unwrap();

    let repaired = fs::read_to_string(&input).unwrap();
    assert!(repaired.contains(r#"<meta charset="UTF-8">"#));
    assert!(repaired.ends_with("</body>\n</html>\n"));
    assert!(fs::read(&output).unwrap().starts_with(b"%PDF-"));
}

#[test]
fn normalization_can_be_skipped() {
    let dir = TempDir::new().unwrap();
    let html = b"<p>left alone</p>";
    let (input, output) = write_input(&dir, "raw.html", html);
    let opts = PdfOptions {
        normalize: false,
        ..PdfOptions::default()
    };

    docshift::convert_html_to_pdf(&input, &output, &opts).unwrap();

    assert_eq!(fs::read(&input).unwrap(), html);
    assert!(output.exists());
}

#[test]
fn letter_pages_and_smaller_text_change_the_layout() {
    let dir = TempDir::new().unwrap();
    let (input, output) = write_input(&dir, "letter.html", paragraphs(200).as_bytes());
    let a4 = dir.path().join("a4.pdf");

    docshift::convert_html_to_pdf(&input, &a4, &PdfOptions::default()).unwrap();
    let opts = PdfOptions {
        page_size: PageSize::Letter,
        font_size: 8.0,
        ..PdfOptions::default()
    };
    docshift::convert_html_to_pdf(&input, &output, &opts).unwrap();

    let letter = fs::read(&output).unwrap();
    assert!(contains(&letter, b"0 0 612 792"));
    assert!(page_count(&letter) < page_count(&fs::read(&a4).unwrap()));
}

#[test]
fn title_comes_from_the_title_element() {
    let dir = TempDir::new().unwrap();
    let (input, output) = write_input(
        &dir,
        "titled.html",
        b"<html><head><title>Annual  Summary</title></head><body><p>x</p></body></html>",
    );
    docshift::convert_html_to_pdf(&input, &output, &PdfOptions::default()).unwrap();
    assert!(contains(&fs::read(&output).unwrap(), b"/Title (Annual Summary)"));
}

#[test]
fn unsupported_charset_fails_before_rendering() {
    let dir = TempDir::new().unwrap();
    let (input, output) = write_input(&dir, "x.html", b"<p>x</p>");
    let opts = PdfOptions {
        charset: Some("koi8-r".into()),
        ..PdfOptions::default()
    };
    let err = docshift::convert_html_to_pdf(&input, &output, &opts).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCharset(_)));
    assert!(!output.exists());
}

#[test]
fn html_reader_maps_block_structure() {
    let doc = docshift::html_parse::parse(
        "<h2>Head</h2><ul><li>one</li><li>two<ol start=3><li>three</li></ol></li></ul>\
         <blockquote>quoted</blockquote><pre>a\n  b</pre><hr>\
         <table><tr><th>k</th><td>v</td></tr></table>",
    )
    .unwrap();

    let summary: Vec<String> = doc
        .blocks
        .iter()
        .map(|b| match b {
            Block::Paragraph(p) => format!("{:?}", p.kind),
            Block::ListItem(item) => format!("li {} {}", item.level, item.label),
            Block::Table(t) => format!("table {}x{}", t.rows.len(), t.rows[0].len()),
            Block::Rule => "rule".to_string(),
        })
        .collect();
    assert_eq!(
        summary,
        [
            "Heading(2)",
            "li 0 \u{2022}",
            "li 0 \u{2022}",
            "li 1 3.",
            "Quote",
            "Preformatted",
            "rule",
            "table 1x2",
        ]
    );

    let Block::Paragraph(pre) = &doc.blocks[5] else {
        panic!("expected preformatted block");
    };
    assert_eq!(pre.kind, ParagraphKind::Preformatted);
    let text: String = pre
        .inlines
        .iter()
        .map(|i| match i {
            Inline::Text(run) => run.text.clone(),
            Inline::Break => "\n".to_string(),
            Inline::Image(_) => String::new(),
        })
        .collect();
    assert_eq!(text, "a\n  b");
}

#[test]
fn rendering_rejects_a_margin_larger_than_the_page() {
    let doc = docshift::model::Document::default();
    let opts = PdfOptions {
        margin: 400.0,
        ..PdfOptions::default()
    };
    assert!(matches!(docshift::pdf::render(&doc, &opts), Err(Error::Pdf(_))));
    let empty = docshift::pdf::render(&doc, &PdfOptions::default()).unwrap();
    assert_eq!(page_count(&empty), 1);
}
