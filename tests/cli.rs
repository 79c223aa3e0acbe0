use std::ffi::OsStr;
use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

fn docshift(args: &[&OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docshift"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run docshift")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_input_exits_with_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.md");

    let output = docshift(&[missing.as_os_str()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error: file not found"));
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("notes.txt");
    fs::write(&input, "plain").unwrap();

    let output = docshift(&[input.as_os_str()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error: don't know how to convert"));
}

#[test]
fn markdown_converts_next_to_the_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("readme.md");
    fs::write(&input, "# Hi\n\ntext\n").unwrap();

    let output = docshift(&[input.as_os_str()]);

    assert!(output.status.success(), "{}", stderr(&output));
    let html = fs::read_to_string(dir.path().join("readme.html")).unwrap();
    assert!(html.contains("<h1>Hi</h1>"));
}

#[test]
fn html_converts_to_the_named_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("page.htm");
    let target = dir.path().join("out").with_extension("pdf");
    fs::write(&input, "<h1>Title</h1><p>Body</p>").unwrap();

    let output = docshift(&[
        input.as_os_str(),
        target.as_os_str(),
        OsStr::new("--page-size"),
        OsStr::new("letter"),
        OsStr::new("--margin-mm"),
        OsStr::new("15"),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(fs::read(&target).unwrap().starts_with(b"%PDF-"));
    assert!(fs::read_to_string(&input).unwrap().ends_with("</body>\n</html>\n"));
}

#[test]
fn normalize_only_repairs_without_writing_a_pdf() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("legacy.html");
    let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("<p>日本語のテキスト</p>");
    fs::write(&input, &encoded).unwrap();

    let output = docshift(&[
        input.as_os_str(),
        OsStr::new("--normalize-only"),
        OsStr::new("--charset"),
        OsStr::new("shift_jis"),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    let repaired = fs::read_to_string(&input).unwrap();
    assert!(repaired.contains("日本語のテキスト"));
    assert!(repaired.contains(r#"<meta charset="UTF-8">"#));
    assert!(!dir.path().join("legacy.pdf").exists());
}

#[test]
fn unsupported_charset_flag_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("a.html");
    fs::write(&input, "<p>x</p>").unwrap();

    let output = docshift(&[input.as_os_str(), OsStr::new("--charset"), OsStr::new("latin1")]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output).trim_end(), "Error: unsupported charset: latin1");
}
