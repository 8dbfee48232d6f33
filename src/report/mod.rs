//! Report export
//!
//! A passing run is written out as a reStructuredText page plus a standalone
//! HTML page. Images referenced by the RST are extracted next to it under
//! `img/`.

pub mod extract;
pub mod html;
pub mod rst;

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};
use crate::notebook::Notebook;
use crate::preprocess::sanitize_outputs;
use crate::testing::Transcript;

pub use extract::{extract_images, ExtractedImage};

/// Files written for one exported notebook
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub rst: PathBuf,
    pub html: PathBuf,
    pub images: Vec<PathBuf>,
}

/// Flatten a notebook path into a file name root
///
/// The directory part keeps the course in the name: `../courses/sca101/Lab 2.ipynb`
/// becomes `courses_sca101_Lab 2`.
pub fn report_root(notebook_path: &Path) -> String {
    let dir = notebook_path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = dir.replace('\\', "_").replace("../", "").replace('/', "_");
    let stem = notebook_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}", dir, stem)
}

/// Image key prefix; spaces are not allowed in RST image targets
pub fn unique_key(root: &str, scope: &str, platform: &str) -> String {
    format!("img/{}-{}-{}", scope, platform, root).replace(' ', "")
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents).map_err(|e| Error::file_write(path, e))
}

/// Export an executed notebook as RST and HTML into `output_dir`
pub fn export_notebook(
    notebook: &Notebook,
    notebook_path: &Path,
    output_dir: &Path,
    scope: &str,
    platform: &str,
    transcript: &mut Transcript,
) -> Result<ReportPaths> {
    let root = report_root(notebook_path);
    let base = format!("{}-{}-{}", root, scope, platform);
    let rst_path = absolute(output_dir.join(format!("{}.rst", base)));
    let html_path = absolute(output_dir.join(format!("{}.html", base)));

    let mut rst_ready = notebook.clone();
    sanitize_outputs(&mut rst_ready);

    let images = extract_images(&rst_ready, &unique_key(&root, scope, platform))?;
    let mut image_paths = Vec::with_capacity(images.len());
    for image in &images {
        let path = output_dir.join(&image.file_name);
        write_file(&path, &image.bytes)?;
        transcript.line(format!("writing to  {}", image.file_name));
        image_paths.push(path);
    }

    write_file(&rst_path, rst::render(&rst_ready, &images).as_bytes())?;
    transcript.line(format!("Wrote to:  {}", rst_path.display()));

    let title = notebook_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_file(&html_path, html::render(notebook, &title).as_bytes())?;
    transcript.line(format!("Wrote to:  {}", html_path.display()));

    tracing::debug!(
        "Exported {} ({} images)",
        notebook_path.display(),
        image_paths.len()
    );

    Ok(ReportPaths {
        rst: rst_path,
        html: html_path,
        images: image_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{Cell, DisplayData, Output};
    use serde_json::{json, Map};

    #[test]
    fn test_report_root() {
        assert_eq!(
            report_root(Path::new("../courses/sca101/Lab 2_1.ipynb")),
            "courses_sca101_Lab 2_1"
        );
        assert_eq!(report_root(Path::new("demo/intro.ipynb")), "demo_intro");
        assert_eq!(report_root(Path::new("intro.ipynb")), "_intro");
    }

    #[test]
    fn test_unique_key_drops_spaces() {
        assert_eq!(
            unique_key("courses_sca101_Lab 2_1", "OPENADC", "CWLITEARM"),
            "img/OPENADC-CWLITEARM-courses_sca101_Lab2_1"
        );
    }

    #[test]
    fn test_export_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut nb = Notebook::new(vec![Cell::code("print('a_b')")]);
        if let Some(code) = nb.cells[0].as_code_mut() {
            code.outputs.push(Output::stream("stdout", "a_b\n"));
            code.outputs.push(Output::DisplayData(DisplayData {
                data: json!({"image/png": "aGVsbG8="}).as_object().cloned().unwrap(),
                metadata: Map::new(),
                extra: Map::new(),
            }));
        }

        let mut transcript = Transcript::quiet();
        let paths = export_notebook(
            &nb,
            Path::new("course/demo.ipynb"),
            dir.path(),
            "OPENADC",
            "CWNANO",
            &mut transcript,
        )
        .unwrap();

        assert!(paths.rst.ends_with("course_demo-OPENADC-CWNANO.rst"));
        let rst = std::fs::read_to_string(&paths.rst).unwrap();
        assert!(rst.contains("a\\_b"));
        assert!(rst.contains(".. image:: img/OPENADC-CWNANO-course_demo_0_1.png"));

        let html = std::fs::read_to_string(&paths.html).unwrap();
        assert!(html.contains("a_b"));

        assert_eq!(paths.images.len(), 1);
        assert_eq!(std::fs::read(&paths.images[0]).unwrap(), b"hello");
        assert!(transcript.contains("writing to  img/OPENADC-CWNANO-course_demo_0_1.png"));
        assert_eq!(transcript.lines().len(), 3);
    }
}
