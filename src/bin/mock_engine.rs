//! Mock notebook execution engine for integration testing
//!
//! Accepts the same arguments as `jupyter nbconvert` and "executes" a
//! notebook deterministically without a kernel. Each code line is matched
//! against a handful of forms:
//!
//! - `NAME = literal` binds a name
//! - `print(x)` / `print(x, file=sys.stderr)` appends to a stream
//! - `raise Name('message')` records an error and stops the cell
//! - `display_png()` emits an image
//!
//! Anything else is ignored. `--to python` prints the script conversion.

use nbharness::notebook::literal::parse_str;
use nbharness::notebook::{
    Cell, DisplayData, Notebook, Output, PythonScriptExporter, ScriptExporter,
};
use regex::Regex;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::path::PathBuf;

/// 1x1 transparent PNG
const PIXEL_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

struct Args {
    to: String,
    execute: bool,
    allow_errors: bool,
    input: PathBuf,
}

fn parse_args() -> Result<Args, String> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let start = argv
        .iter()
        .position(|a| a == "nbconvert")
        .ok_or("expected 'nbconvert' subcommand")?;
    let argv = &argv[start + 1..];

    let mut to = String::from("notebook");
    let mut execute = false;
    let mut allow_errors = false;
    let mut input = None;
    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--to" => to = iter.next().cloned().ok_or("--to needs a value")?,
            "--execute" => execute = true,
            "--allow-errors" => allow_errors = true,
            other if other.starts_with("--") => {}
            other => input = Some(PathBuf::from(other)),
        }
    }
    Ok(Args {
        to,
        execute,
        allow_errors,
        input: input.ok_or("no input notebook")?,
    })
}

struct Interpreter {
    env: HashMap<String, String>,
    assign: Regex,
    print: Regex,
    raise: Regex,
}

impl Interpreter {
    fn new() -> Self {
        Self {
            env: HashMap::new(),
            assign: Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s*$").expect("static pattern"),
            print: Regex::new(r"^print\((.*?)(,\s*file\s*=\s*sys\.stderr)?\)\s*$").expect("static pattern"),
            raise: Regex::new(r"^raise\s+([A-Za-z_][A-Za-z0-9_]*)(?:\((.*)\))?\s*$").expect("static pattern"),
        }
    }

    fn value(&self, expr: &str) -> String {
        let expr = expr.trim();
        if let Some(s) = parse_str(expr) {
            return s;
        }
        if let Some(v) = self.env.get(expr) {
            return v.clone();
        }
        expr.to_string()
    }

    /// Run one cell; returns false if it raised
    fn run_cell(&mut self, source: &str, outputs: &mut Vec<Output>) -> bool {
        for line in source.lines() {
            let line = line.trim();
            if let Some(caps) = self.print.captures(line) {
                let name = if caps.get(2).is_some() {
                    "stderr"
                } else {
                    "stdout"
                };
                let text = format!("{}\n", self.value(&caps[1]));
                push_stream(outputs, name, &text);
            } else if let Some(caps) = self.raise.captures(line) {
                let ename = caps[1].to_string();
                let evalue = caps.get(2).map(|m| self.value(m.as_str())).unwrap_or_default();
                let traceback = vec![
                    "\u{1b}[0;31m---------------------------------------------------------------------------\u{1b}[0m".to_string(),
                    format!("\u{1b}[0;31m{}\u{1b}[0m: {}", ename, evalue),
                ];
                outputs.push(Output::error(&ename, &evalue, traceback));
                return false;
            } else if line == "display_png()" {
                outputs.push(Output::DisplayData(DisplayData {
                    data: json!({"image/png": PIXEL_PNG, "text/plain": "<Figure size 1x1>"})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                    metadata: Map::new(),
                    extra: Map::new(),
                }));
            } else if let Some(caps) = self.assign.captures(line) {
                let value = self.value(&caps[2]);
                self.env.insert(caps[1].to_string(), value);
            }
        }
        true
    }
}

fn push_stream(outputs: &mut Vec<Output>, name: &str, text: &str) {
    if let Some(Output::Stream(last)) = outputs.last_mut() {
        if last.name == name {
            let joined = format!("{}{}", last.text.as_str(), text);
            last.text.set(joined);
            return;
        }
    }
    outputs.push(Output::stream(name, text));
}

fn execute(notebook: &mut Notebook, allow_errors: bool) -> Result<(), String> {
    let mut interpreter = Interpreter::new();
    let mut count = 0;
    for (index, cell) in notebook.cells.iter_mut().enumerate() {
        let Cell::Code(code) = cell else {
            continue;
        };
        count += 1;
        code.execution_count = Some(count);
        code.outputs.clear();

        let source = code.source.as_str().to_string();
        let ok = interpreter.run_cell(&source, &mut code.outputs);
        if !ok && !allow_errors {
            return Err(format!("An error occurred while executing cell {}", index + 1));
        }
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let mut notebook = Notebook::load(&args.input).map_err(|e| e.to_string())?;

    let out = match args.to.as_str() {
        "python" => PythonScriptExporter
            .to_script(&notebook)
            .map_err(|e| e.to_string())?,
        "notebook" => {
            if args.execute {
                execute(&mut notebook, args.allow_errors)?;
            }
            notebook.to_json().map_err(|e| e.to_string())?
        }
        other => return Err(format!("unsupported format '{}'", other)),
    };
    print!("{}", out);
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("[mock_engine] {}", e);
        std::process::exit(1);
    }
}
