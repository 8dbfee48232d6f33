//! Standalone HTML rendering

use pulldown_cmark::{html, Options, Parser};
use pulldown_cmark_escape::escape_html;

use super::extract::preferred_mime;
use crate::common::strip_ansi;
use crate::notebook::{mime_text, Cell, Notebook, Output};

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:auto}\
pre{background:#f6f8fa;padding:8px;overflow-x:auto}\
pre.input{border-left:3px solid #307fc1}\
pre.stderr{background:#fdd}\
pre.error{background:#fdd;color:#900}";

/// Escape text for use in HTML content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail
    let _ = escape_html(&mut out, text);
    out
}

fn markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn pre(class: &str, text: &str) -> String {
    format!("<pre class=\"{}\">{}</pre>\n", class, escape(text))
}

/// Render a notebook as a full HTML document
pub fn render(notebook: &Notebook, title: &str) -> String {
    let mut body = String::new();
    for cell in &notebook.cells {
        match cell {
            Cell::Markdown(text) => {
                body.push_str("<div class=\"markdown\">\n");
                body.push_str(&markdown(text.source.as_str()));
                body.push_str("</div>\n");
            }
            Cell::Raw(_) => {}
            Cell::Code(code) => {
                body.push_str("<div class=\"cell\">\n");
                if !code.source.as_str().trim().is_empty() {
                    body.push_str(&pre("input", code.source.as_str()));
                }
                for output in &code.outputs {
                    body.push_str(&render_output(output));
                }
                body.push_str("</div>\n");
            }
        }
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        STYLE,
        body
    )
}

fn render_output(output: &Output) -> String {
    match output {
        Output::Stream(stream) => {
            let class = if stream.name == "stderr" {
                "stderr"
            } else {
                "stdout"
            };
            pre(class, stream.text.as_str())
        }
        Output::Error(error) => pre("error", &strip_ansi(&error.traceback.join("\n"))),
        Output::DisplayData(_) | Output::ExecuteResult(_) => {
            let Some(data) = output.data() else {
                return String::new();
            };
            let Some(mime) = preferred_mime(data) else {
                return String::new();
            };
            let payload = data.get(mime).and_then(mime_text).unwrap_or_default();
            match mime {
                "text/html" | "image/svg+xml" => format!("<div class=\"output\">{}</div>\n", payload),
                "text/markdown" => markdown(&payload),
                "image/png" | "image/jpeg" => {
                    let compact: String = payload.split_whitespace().collect();
                    format!("<img src=\"data:{};base64,{}\">\n", mime, compact)
                }
                "text/latex" => pre("latex", &payload),
                _ => pre("output", &payload),
            }
        }
    }
}
