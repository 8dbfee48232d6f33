//! Notebook documents
//!
//! The nbformat v4 document model, Python literal helpers, and conversion
//! of a notebook into plain script text.

pub mod literal;
mod model;
pub mod script;

pub use model::*;
pub use script::{NbconvertScriptExporter, PythonScriptExporter, ScriptExporter};
