use clap::{Parser, ValueEnum};
use docshift::{Conversion, PageSize, PdfOptions};
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum)]
enum PageSizeArg {
    A4,
    Letter,
}

#[derive(Parser)]
#[command(
    name = "docshift",
    version,
    about = "Convert Markdown and Word files to HTML, and HTML files to PDF"
)]
struct Args {
    /// Input file (.md, .markdown, .docx, .html or .htm)
    input: PathBuf,
    /// Output file (defaults to input with .html or .pdf extension)
    output: Option<PathBuf>,
    /// Treat HTML input as this charset instead of detecting it
    #[arg(long, value_name = "LABEL")]
    charset: Option<String>,
    /// Font families to embed in PDFs, comma-separated
    #[arg(long, value_name = "FAMILY")]
    font: Option<String>,
    #[arg(long, value_enum, default_value = "a4")]
    page_size: PageSizeArg,
    /// Page margin in millimetres
    #[arg(long, value_name = "N", default_value_t = 20.0)]
    margin_mm: f32,
    /// Body text size in points
    #[arg(long, value_name = "PT", default_value_t = 11.0)]
    font_size: f32,
    /// Only repair the HTML input's encoding in place; write no PDF
    #[arg(long, conflicts_with_all = ["output", "no_normalize"])]
    normalize_only: bool,
    /// Render HTML as-is without repairing its encoding first
    #[arg(long)]
    no_normalize: bool,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.input.exists() {
        fail(format_args!("file not found: {}", args.input.display()));
    }
    if !args.input.is_file() {
        fail(format_args!("not a file: {}", args.input.display()));
    }

    let conversion = Conversion::for_path(&args.input).unwrap_or_else(|e| fail(e));

    if args.normalize_only {
        if conversion != Conversion::HtmlToPdf {
            fail("--normalize-only needs an HTML input");
        }
        if let Err(e) = docshift::normalize(&args.input, args.charset.as_deref()) {
            fail(e);
        }
        return;
    }

    let opts = PdfOptions {
        page_size: match args.page_size {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        },
        margin: docshift::pdf::mm_to_pts(args.margin_mm),
        font_size: args.font_size,
        font_family: args.font,
        charset: args.charset,
        normalize: !args.no_normalize,
    };
    let output = args
        .output
        .unwrap_or_else(|| conversion.default_output(&args.input));

    match docshift::convert(&args.input, &output, &opts) {
        Ok(messages) => {
            for message in messages {
                log::warn!("{message}");
            }
            log::info!("wrote {}", output.display());
        }
        Err(e) => fail(e),
    }
}
