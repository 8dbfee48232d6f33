//! reStructuredText rendering
//!
//! Stream text goes into `parsed-literal` blocks, so the notebook must be
//! sanitized first (see [`crate::preprocess::sanitize`]).

use std::collections::HashMap;

use super::extract::{preferred_mime, ExtractedImage};
use crate::common::strip_ansi;
use crate::notebook::{mime_text, Cell, Notebook, Output};

fn indent(text: &str) -> String {
    text.trim_end_matches('\n')
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn block(directive: &str, body: &str) -> String {
    format!("{}\n\n{}\n\n", directive, indent(body))
}

/// Render a notebook; `images` maps each extracted output to its file
pub fn render(notebook: &Notebook, images: &[ExtractedImage]) -> String {
    let image_files: HashMap<(usize, usize), &str> = images
        .iter()
        .map(|img| ((img.cell, img.output), img.file_name.as_str()))
        .collect();

    let mut out = String::new();
    for (cell_index, cell) in notebook.cells.iter().enumerate() {
        match cell {
            Cell::Markdown(text) => {
                out.push_str(text.source.as_str().trim_end());
                out.push_str("\n\n");
            }
            Cell::Raw(text) => {
                let is_rst = text
                    .metadata
                    .get("raw_mimetype")
                    .and_then(|m| m.as_str())
                    .is_some_and(|m| m == "text/restructuredtext");
                if is_rst {
                    out.push_str(text.source.as_str().trim_end());
                    out.push_str("\n\n");
                }
            }
            Cell::Code(code) => {
                if !code.source.as_str().trim().is_empty() {
                    out.push_str(&block(".. code:: ipython3", code.source.as_str()));
                }
                for (output_index, output) in code.outputs.iter().enumerate() {
                    let image = image_files.get(&(cell_index, output_index)).copied();
                    out.push_str(&render_output(output, image));
                }
            }
        }
    }
    out
}

fn render_output(output: &Output, image: Option<&str>) -> String {
    match output {
        Output::Stream(stream) => block(".. parsed-literal::", stream.text.as_str()),
        Output::Error(error) => {
            let traceback = strip_ansi(&error.traceback.join("\n"));
            block("::", &traceback)
        }
        Output::DisplayData(_) | Output::ExecuteResult(_) => {
            if let Some(file) = image {
                return format!(".. image:: {}\n\n", file);
            }
            let Some(data) = output.data() else {
                return String::new();
            };
            let Some(mime) = preferred_mime(data) else {
                return String::new();
            };
            let text = data.get(mime).and_then(mime_text).unwrap_or_default();
            match mime {
                "text/html" => block(".. raw:: html", &text),
                "text/markdown" => format!("{}\n\n", text.trim_end()),
                "text/latex" => block(".. math::", text.trim().trim_matches('$')),
                "text/plain" => block("::", &text),
                _ => String::new(),
            }
        }
    }
}
