//! Notebook document types
//!
//! Typed view of the nbformat v4 JSON document. Only the fields the harness
//! reads or rewrites are modelled; everything else is captured in flattened
//! maps and written back verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::common::{Error, Result};

/// A complete notebook document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_nbformat() -> u32 {
    4
}

fn default_nbformat_minor() -> u32 {
    5
}

/// A single notebook cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Code(CodeCell),
    Markdown(TextCell),
    Raw(TextCell),
}

/// A code cell with its captured outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeCell {
    pub source: MultilineString,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub execution_count: Option<i64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A markdown or raw cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCell {
    pub source: MultilineString,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An output record produced by executing a code cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream(StreamOutput),
    Error(ErrorOutput),
    DisplayData(DisplayData),
    ExecuteResult(ExecuteResult),
}

/// Text written to stdout or stderr
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutput {
    pub name: String,
    pub text: MultilineString,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An exception raised while executing a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutput {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rich display data keyed by MIME type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayData {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The value of the last expression in a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub execution_count: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Output {
    /// MIME bundle for rich outputs
    pub fn data(&self) -> Option<&Map<String, Value>> {
        match self {
            Output::DisplayData(d) => Some(&d.data),
            Output::ExecuteResult(r) => Some(&r.data),
            _ => None,
        }
    }

    /// Build a stream output
    pub fn stream(name: &str, text: impl Into<MultilineString>) -> Self {
        Output::Stream(StreamOutput {
            name: name.to_string(),
            text: text.into(),
            extra: Map::new(),
        })
    }

    /// Build an error output
    pub fn error(ename: &str, evalue: &str, traceback: Vec<String>) -> Self {
        Output::Error(ErrorOutput {
            ename: ename.to_string(),
            evalue: evalue.to_string(),
            traceback,
            extra: Map::new(),
        })
    }
}

/// Join a MIME payload that may be stored as a string or list of lines
pub fn mime_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .concat(),
        ),
        _ => None,
    }
}

impl Cell {
    /// Build a code cell with no outputs
    pub fn code(source: impl Into<MultilineString>) -> Self {
        Cell::Code(CodeCell {
            source: source.into(),
            outputs: Vec::new(),
            execution_count: None,
            metadata: Map::new(),
            extra: Map::new(),
        })
    }

    /// Build a markdown cell
    pub fn markdown(source: impl Into<MultilineString>) -> Self {
        Cell::Markdown(TextCell {
            source: source.into(),
            metadata: Map::new(),
            extra: Map::new(),
        })
    }

    /// Source text of any cell kind
    pub fn source(&self) -> &str {
        match self {
            Cell::Code(c) => c.source.as_str(),
            Cell::Markdown(t) | Cell::Raw(t) => t.source.as_str(),
        }
    }

    pub fn as_code(&self) -> Option<&CodeCell> {
        match self {
            Cell::Code(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_code_mut(&mut self) -> Option<&mut CodeCell> {
        match self {
            Cell::Code(c) => Some(c),
            _ => None,
        }
    }
}

impl Notebook {
    /// Create an nbformat 4.5 notebook from cells
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
            extra: Map::new(),
        }
    }

    /// Load a notebook from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content).map_err(|e| match e {
            Error::NotebookParse { reason, .. } => Error::NotebookParse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse notebook JSON
    pub fn parse(content: &str) -> Result<Self> {
        let notebook: Notebook =
            serde_json::from_str(content).map_err(|e| Error::NotebookParse {
                path: "<memory>".to_string(),
                reason: e.to_string(),
            })?;
        if notebook.nbformat != 4 {
            return Err(Error::NotebookParse {
                path: "<memory>".to_string(),
                reason: format!("unsupported nbformat {}", notebook.nbformat),
            });
        }
        Ok(notebook)
    }

    /// Serialize the way nbformat does: one-space indent, trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| Error::NotebookParse {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Write the notebook to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Iterate code cells mutably, preserving document order
    pub fn code_cells_mut(&mut self) -> impl Iterator<Item = &mut CodeCell> {
        self.cells.iter_mut().filter_map(Cell::as_code_mut)
    }

    /// Iterate code cells with their 0-based index among all cells
    pub fn code_cells(&self) -> impl Iterator<Item = (usize, &CodeCell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_code().map(|code| (i, code)))
    }
}

/// Text stored either as one string or a list of lines
///
/// Always serialized as a list of lines, each keeping its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawMultiline", into = "Vec<String>")]
pub struct MultilineString(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMultiline {
    One(String),
    Many(Vec<String>),
}

impl From<RawMultiline> for MultilineString {
    fn from(raw: RawMultiline) -> Self {
        match raw {
            RawMultiline::One(s) => MultilineString(s),
            RawMultiline::Many(parts) => MultilineString(parts.concat()),
        }
    }
}

impl From<MultilineString> for Vec<String> {
    fn from(text: MultilineString) -> Self {
        text.0.split_inclusive('\n').map(str::to_string).collect()
    }
}

impl From<String> for MultilineString {
    fn from(s: String) -> Self {
        MultilineString(s)
    }
}

impl From<&str> for MultilineString {
    fn from(s: &str) -> Self {
        MultilineString(s.to_string())
    }
}

impl MultilineString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn set(&mut self, text: String) {
        self.0 = text;
    }
}

impl fmt::Display for MultilineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
