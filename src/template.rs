use crate::html::escape;

const STYLESHEET: &str = r#"
body {
    font-family: "Helvetica Neue", Helvetica, Arial, "Hiragino Sans", "Noto Sans CJK JP", sans-serif;
    font-size: 11pt;
    line-height: 1.6;
    color: #222;
    max-width: 48em;
    margin: 2em auto;
    padding: 0 1em;
}
h1, h2, h3, h4, h5, h6 { line-height: 1.25; margin: 1.4em 0 0.6em; }
h1 { font-size: 2em; border-bottom: 1px solid #ddd; padding-bottom: 0.3em; }
h2 { font-size: 1.5em; border-bottom: 1px solid #eee; padding-bottom: 0.3em; }
h3 { font-size: 1.25em; }
p, ul, ol, table, pre, blockquote { margin: 0 0 1em; }
a { color: #0366d6; text-decoration: none; }
code, pre { font-family: Menlo, Consolas, "Courier New", monospace; font-size: 0.9em; }
code { background: #f3f4f4; padding: 0.1em 0.3em; border-radius: 3px; }
pre { background: #f6f8fa; padding: 0.8em 1em; overflow: auto; border-radius: 4px; }
pre code { background: none; padding: 0; }
blockquote { border-left: 4px solid #ddd; color: #666; padding: 0 1em; margin-left: 0; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 0.35em 0.7em; }
th { background: #f3f4f4; }
img { max-width: 100%; }
hr { border: 0; border-top: 1px solid #ddd; margin: 1.5em 0; }
@page { size: A4; margin: 20mm; }
"#;

/// Wrap an HTML fragment into a complete UTF-8 page with the inline stylesheet.
pub fn page(title: &str, fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + STYLESHEET.len() + 256);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    out.push_str("<meta charset=\"UTF-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>");
    out.push_str(&escape(title));
    out.push_str("</title>\n<style>");
    out.push_str(STYLESHEET);
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str(fragment);
    if !fragment.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n</html>\n");
    out
}
