//! Rich output selection and image extraction

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};

use crate::common::{Error, Result};
use crate::notebook::{mime_text, Notebook};

/// MIME types in the order a renderer should prefer them
pub const DISPLAY_PRIORITY: &[&str] = &[
    "text/html",
    "text/markdown",
    "image/svg+xml",
    "text/latex",
    "image/png",
    "image/jpeg",
    "text/plain",
];

/// Pick the highest-priority MIME type present in a bundle
pub fn preferred_mime(data: &Map<String, Value>) -> Option<&'static str> {
    DISPLAY_PRIORITY
        .iter()
        .copied()
        .find(|mime| data.contains_key(*mime))
}

fn image_extension(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// An image pulled out of a rich output
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImage {
    /// 0-based cell index
    pub cell: usize,
    /// 0-based output index within the cell
    pub output: usize,
    pub mime: &'static str,
    /// `<unique_key>_<cell>_<output>.<ext>`, relative to the report directory
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Decode every displayed image; the display priority decides which MIME is used
pub fn extract_images(notebook: &Notebook, unique_key: &str) -> Result<Vec<ExtractedImage>> {
    let mut images = Vec::new();
    for (cell_index, code) in notebook.code_cells() {
        for (output_index, output) in code.outputs.iter().enumerate() {
            let Some(data) = output.data() else {
                continue;
            };
            let Some(mime) = preferred_mime(data) else {
                continue;
            };
            let Some(ext) = image_extension(mime) else {
                continue;
            };
            let Some(payload) = data.get(mime).and_then(mime_text) else {
                continue;
            };

            let bytes = if mime == "image/svg+xml" {
                payload.into_bytes()
            } else {
                let compact: String = payload.split_whitespace().collect();
                BASE64
                    .decode(compact.as_bytes())
                    .map_err(|e| Error::NotebookParse {
                        path: format!("cell {} output {}", cell_index, output_index),
                        reason: format!("invalid base64 image: {}", e),
                    })?
            };

            images.push(ExtractedImage {
                cell: cell_index,
                output: output_index,
                mime,
                file_name: format!("{}_{}_{}.{}", unique_key, cell_index, output_index, ext),
                bytes,
            });
        }
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{Cell, DisplayData, Output};
    use serde_json::json;

    fn with_display(data: Value) -> Notebook {
        let mut nb = Notebook::new(vec![Cell::markdown("x"), Cell::code("plot()")]);
        if let Some(code) = nb.cells[1].as_code_mut() {
            code.outputs.push(Output::stream("stdout", "ok\n"));
            code.outputs.push(Output::DisplayData(DisplayData {
                data: data.as_object().cloned().unwrap_or_default(),
                metadata: Map::new(),
                extra: Map::new(),
            }));
        }
        nb
    }

    #[test]
    fn test_png_is_decoded_and_named() {
        let nb = with_display(json!({
            "image/png": "aGVs\nbG8=\n",
            "text/plain": "<Figure>"
        }));
        let images = extract_images(&nb, "img/OPENADC-CWLITEARM-_Lab").unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].bytes, b"hello");
        assert_eq!(images[0].file_name, "img/OPENADC-CWLITEARM-_Lab_1_1.png");
    }

    #[test]
    fn test_html_outranks_image() {
        let nb = with_display(json!({
            "text/html": "<b>table</b>",
            "image/png": "aGVsbG8="
        }));
        assert!(extract_images(&nb, "k").unwrap().is_empty());
    }

    #[test]
    fn test_svg_kept_as_text() {
        let nb = with_display(json!({"image/svg+xml": ["<svg>", "</svg>"]}));
        let images = extract_images(&nb, "k").unwrap();
        assert_eq!(images[0].bytes, b"<svg></svg>");
        assert!(images[0].file_name.ends_with(".svg"));
    }

    #[test]
    fn test_bad_base64_is_error() {
        let nb = with_display(json!({"image/png": "***"}));
        assert!(extract_images(&nb, "k").is_err());
    }
}
