use std::fs;
use std::io::{Cursor, Write};

use docshift::Error;
use docshift::model::{Block, Inline, ParagraphKind};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
            xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
            xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
            xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
            xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>
    <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Details</w:t></w:r></w:p>
    <w:p>
      <w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r>
      <w:r><w:rPr><w:i w:val="0"/></w:rPr><w:t xml:space="preserve"> text</w:t></w:r>
    </w:p>
    <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>First</w:t></w:r></w:p>
    <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>Second</w:t></w:r></w:p>
    <w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>Nested</w:t></w:r></w:p>
    <w:p>
      <w:r><w:t xml:space="preserve">See </w:t></w:r>
      <w:hyperlink r:id="rId5"><w:r><w:t>the site</w:t></w:r></w:hyperlink>
      <w:r><w:t>.</w:t></w:r>
    </w:p>
    <w:tbl>
      <w:tblPr/>
      <w:tr>
        <w:tc><w:tcPr/><w:p><w:r><w:t>A1</w:t></w:r></w:p></w:tc>
        <w:tc><w:tcPr/><w:p><w:r><w:t>B1</w:t></w:r></w:p></w:tc>
      </w:tr>
      <w:tr>
        <w:tc><w:p><w:r><w:t>A2</w:t></w:r></w:p></w:tc>
        <w:tc><w:p><w:r><w:t>B2</w:t></w:r></w:p></w:tc>
      </w:tr>
    </w:tbl>
    <w:p><w:pPr><w:pStyle w:val="Fancy"/></w:pPr><w:r><w:t>Styled</w:t></w:r></w:p>
    <w:p><w:pPr><w:pStyle w:val="Fancy"/></w:pPr><w:r><w:t>Styled again</w:t></w:r></w:p>
    <w:p>
      <w:r><w:drawing><wp:inline>
        <wp:docPr id="1" name="Picture 1" descr="Chart"/>
        <a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">
          <pic:pic><pic:blipFill><a:blip r:embed="rId6"/></pic:blipFill></pic:pic>
        </a:graphicData></a:graphic>
      </wp:inline></w:drawing></w:r>
    </w:p>
    <w:altChunk r:id="rId9"/>
    <w:sectPr/>
  </w:body>
</w:document>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="Fancy"><w:name w:val="Fancy Box"/><w:basedOn w:val="Normal"/></w:style>
</w:styles>"#;

const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="0">
    <w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/></w:lvl>
    <w:lvl w:ilvl="1"><w:numFmt w:val="bullet"/><w:lvlText w:val="o"/></w:lvl>
  </w:abstractNum>
  <w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
</w:numbering>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/>
  <Relationship Id="rId6" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
</Relationships>"#;

const CORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
                   xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Quarterly Report</dc:title>
</cp:coreProperties>"#;

fn package(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn sample() -> Vec<u8> {
    package(&[
        ("word/document.xml", DOCUMENT.as_bytes()),
        ("word/styles.xml", STYLES.as_bytes()),
        ("word/numbering.xml", NUMBERING.as_bytes()),
        ("word/_rels/document.xml.rels", RELS.as_bytes()),
        ("word/media/image1.png", &[1u8, 2, 3][..]),
        ("docProps/core.xml", CORE.as_bytes()),
    ])
}

#[test]
fn styles_map_to_headings() {
    let parsed = docshift::docx::parse_reader(Cursor::new(sample())).unwrap();
    let kinds: Vec<ParagraphKind> = parsed
        .document
        .blocks
        .iter()
        .filter_map(|b| match b {
            Block::Paragraph(p) => Some(p.kind),
            _ => None,
        })
        .take(2)
        .collect();
    assert_eq!(kinds, [ParagraphKind::Heading(1), ParagraphKind::Heading(2)]);
    assert_eq!(parsed.document.title.as_deref(), Some("Quarterly Report"));
}

#[test]
fn numbering_produces_labelled_list_items() {
    let parsed = docshift::docx::parse_reader(Cursor::new(sample())).unwrap();
    let items: Vec<(bool, u8, &str)> = parsed
        .document
        .blocks
        .iter()
        .filter_map(|b| match b {
            Block::ListItem(item) => Some((item.ordered, item.level, item.label.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(items, [(true, 0, "1."), (true, 0, "2."), (false, 1, "\u{2022}")]);
}

#[test]
fn unmapped_content_is_reported_once_per_style() {
    let parsed = docshift::docx::parse_reader(Cursor::new(sample())).unwrap();
    assert_eq!(
        parsed.messages,
        [
            "Unrecognised paragraph style: 'Fancy Box' (Style ID: Fancy)",
            "Unsupported element ignored: w:altChunk",
        ]
    );
}

#[test]
fn embedded_image_becomes_a_data_uri() {
    let parsed = docshift::docx::parse_reader(Cursor::new(sample())).unwrap();
    let image = parsed
        .document
        .blocks
        .iter()
        .find_map(|b| match b {
            Block::Paragraph(p) => p.inlines.iter().find_map(|i| match i {
                Inline::Image(img) => Some(img.clone()),
                _ => None,
            }),
            _ => None,
        })
        .expect("image paragraph");
    assert_eq!(image.src, "data:image/png;base64,AQID");
    assert_eq!(image.alt, "Chart");
}

#[test]
fn conversion_writes_html_and_returns_messages() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.docx");
    let output = dir.path().join("report.html");
    fs::write(&input, sample()).unwrap();

    let messages = docshift::convert_docx_to_html(&input, &output).unwrap();
    assert_eq!(messages.len(), 2);

    let html = fs::read_to_string(&output).unwrap();
    for expected in [
        "<title>Quarterly Report</title>",
        "<h1>Overview</h1>\n<h2>Details</h2>\n",
        "<p><strong>Bold</strong> text</p>\n",
        "<ol>\n<li>First</li>\n<li>Second\n<ul>\n<li>Nested</li>\n</ul>\n</li>\n</ol>\n",
        "<p>See <a href=\"https://example.com/\">the site</a>.</p>\n",
        "<table>\n<tr><td>A1</td><td>B1</td></tr>\n<tr><td>A2</td><td>B2</td></tr>\n</table>\n",
        "<p>Styled</p>\n<p>Styled again</p>\n",
        "<p><img src=\"data:image/png;base64,AQID\" alt=\"Chart\"></p>\n",
    ] {
        assert!(html.contains(expected), "missing {expected:?} in\n{html}");
    }
    assert!(html.ends_with("</body>\n</html>\n"));
}

#[test]
fn title_falls_back_to_first_heading() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("untitled.docx");
    let output = dir.path().join("untitled.html");
    fs::write(
        &input,
        package(&[
            ("word/document.xml", DOCUMENT.as_bytes()),
            ("word/styles.xml", STYLES.as_bytes()),
        ]),
    )
    .unwrap();

    docshift::convert_docx_to_html(&input, &output).unwrap();
    assert!(fs::read_to_string(&output).unwrap().contains("<title>Overview</title>"));
}

#[test]
fn unknown_style_ids_fall_back_to_paragraphs() {
    let parsed =
        docshift::docx::parse_reader(Cursor::new(package(&[("word/document.xml", DOCUMENT.as_bytes())])))
            .unwrap();
    assert_eq!(parsed.document.first_heading(), None);
    assert!(parsed.messages.iter().any(|m| m == "Unrecognised paragraph style: 'Title' (Style ID: Title)"));
}

#[test]
fn package_without_document_part_is_invalid() {
    let bytes = package(&[("word/styles.xml", STYLES.as_bytes())]);
    let err = docshift::docx::parse_reader(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, Error::InvalidDocx(ref m) if m.contains("word/document.xml")));
}

#[test]
fn non_zip_input_is_a_zip_error() {
    let err = docshift::docx::parse_reader(Cursor::new(b"not a zip".to_vec())).unwrap_err();
    assert!(matches!(err, Error::Zip(_)));
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = docshift::docx::parse(&dir.path().join("nope.docx")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
