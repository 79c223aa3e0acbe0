pub mod docx;
pub mod encoding;
mod error;
mod fonts;
pub mod html;
pub mod html_parse;
pub mod markdown;
pub mod model;
pub mod pdf;
pub mod template;

pub use encoding::{
    CharsetClassifier, CharsetLabel, Diagnostic, DiagnosticSink, LogSink, NormalizationResult,
    normalize, normalize_with,
};
pub use error::Error;
pub use pdf::{PageSize, PdfOptions};

use std::path::{Path, PathBuf};

/// Conversion selected from the input file's extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    MarkdownToHtml,
    HtmlToPdf,
    DocxToHtml,
}

impl Conversion {
    pub fn for_path(input: &Path) -> Result<Self, Error> {
        let ext = input
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" => Ok(Conversion::MarkdownToHtml),
            "html" | "htm" => Ok(Conversion::HtmlToPdf),
            "docx" => Ok(Conversion::DocxToHtml),
            _ => Err(Error::UnsupportedInput(input.to_path_buf())),
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            Conversion::MarkdownToHtml | Conversion::DocxToHtml => "html",
            Conversion::HtmlToPdf => "pdf",
        }
    }

    /// `input` with the target extension.
    pub fn default_output(self, input: &Path) -> PathBuf {
        input.with_extension(self.output_extension())
    }
}

fn read_to_string(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn convert_markdown_to_html(input: &Path, output: &Path) -> Result<(), Error> {
    let source = read_to_string(input)?;
    let title = markdown::front_matter_title(&source);
    let text = markdown::preprocess(&source);
    let title = title
        .or_else(|| markdown::first_heading(&text))
        .unwrap_or_else(|| file_stem(input));

    let fragment = markdown::render(&text);
    std::fs::write(output, template::page(&title, &fragment)).map_err(Error::Io)
}

/// Normalizes `input` in place (unless disabled), then renders it to PDF.
pub fn convert_html_to_pdf(input: &Path, output: &Path, opts: &PdfOptions) -> Result<(), Error> {
    if opts.normalize {
        normalize(input, opts.charset.as_deref())?;
    }
    let html = match std::fs::read(input) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(input.to_path_buf()));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let mut doc = html_parse::parse(&html)?;
    if doc.title.is_none() {
        doc.title = Some(doc.first_heading().unwrap_or_else(|| file_stem(input)));
    }
    let bytes = pdf::render(&doc, opts)?;
    std::fs::write(output, bytes).map_err(Error::Io)
}

/// Writes the HTML page and returns the converter's advisory messages.
pub fn convert_docx_to_html(input: &Path, output: &Path) -> Result<Vec<String>, Error> {
    let parsed = docx::parse(input)?;
    let title = parsed
        .document
        .title
        .clone()
        .or_else(|| parsed.document.first_heading())
        .unwrap_or_else(|| file_stem(input));

    let fragment = html::render_fragment(&parsed.document);
    std::fs::write(output, template::page(&title, &fragment)).map_err(Error::Io)?;
    Ok(parsed.messages)
}

/// Dispatch on the input extension. Returns advisory messages, if any.
pub fn convert(input: &Path, output: &Path, opts: &PdfOptions) -> Result<Vec<String>, Error> {
    match Conversion::for_path(input)? {
        Conversion::MarkdownToHtml => convert_markdown_to_html(input, output).map(|()| Vec::new()),
        Conversion::HtmlToPdf => convert_html_to_pdf(input, output, opts).map(|()| Vec::new()),
        Conversion::DocxToHtml => convert_docx_to_html(input, output),
    }
}
