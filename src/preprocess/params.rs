//! Parameter injection
//!
//! A notebook declares its parameters as simple top-level assignments in
//! its parameter cell: the first code cell tagged `parameters`, or the
//! first code cell otherwise. Injection rewrites those assignments with
//! override values without executing anything.

use indexmap::IndexMap;
use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;

use crate::notebook::literal::{parse_str, repr_value};
use crate::notebook::{Cell, Notebook};

/// Named override values, in insertion order
pub type ParameterSet = IndexMap<String, Value>;

/// Merge parameter layers; later layers win on key collision
pub fn merge_layers<'a, I>(layers: I) -> ParameterSet
where
    I: IntoIterator<Item = &'a ParameterSet>,
{
    let mut merged = ParameterSet::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Text,
    Int,
    Float,
    Bool,
    None,
    /// Any other expression, kept verbatim unless overridden
    Other,
}

/// A notebook parameter and its current value
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    pub value: Value,
    /// Original right-hand side; cleared once the value is overridden
    source: Option<String>,
}

impl Parameter {
    /// A new parameter typed as text
    ///
    /// The type is only a tag; the value keeps its own literal form.
    pub fn text(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::Text,
            value,
            source: None,
        }
    }

    /// The same parameter with a new value
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            name: self.name.clone(),
            param_type: self.param_type,
            value,
            source: None,
        }
    }

    /// Python expression for the current value
    pub fn render(&self) -> String {
        if let Some(source) = &self.source {
            return source.clone();
        }
        repr_value(&self.value)
    }

    fn parse(name: &str, rhs: &str) -> Self {
        let (param_type, value) = if let Some(s) = parse_str(rhs) {
            (ParamType::Text, Value::String(s))
        } else if rhs == "True" || rhs == "False" {
            (ParamType::Bool, Value::Bool(rhs == "True"))
        } else if rhs == "None" {
            (ParamType::None, Value::Null)
        } else if let Ok(i) = rhs.replace('_', "").parse::<i64>() {
            (ParamType::Int, Value::from(i))
        } else if let Ok(f) = rhs.replace('_', "").parse::<f64>() {
            (ParamType::Float, Value::from(f))
        } else {
            (ParamType::Other, Value::String(rhs.to_string()))
        };
        Self {
            name: name.to_string(),
            param_type,
            value,
            source: Some(rhs.to_string()),
        }
    }
}

fn assignment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_]\w*)\s*=\s*(?P<rhs>[^=\s].*?)\s*$").expect("static pattern")
    })
}

/// Split a line into code and a trailing `#` comment outside string literals
fn split_comment(line: &str) -> (&str, Option<&str>) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' => return (&line[..i], Some(&line[i..])),
            None => {}
        }
    }
    (line, None)
}

struct Declaration<'a> {
    name: &'a str,
    rhs: &'a str,
    /// Whitespace between the value and the comment, plus the comment
    trailer: &'a str,
}

fn parse_declaration(line: &str) -> Option<Declaration<'_>> {
    let (code, comment) = split_comment(line);
    let caps = assignment().captures(code)?;
    let name = caps.name("name")?.as_str();
    let rhs = caps.name("rhs")?;
    let trailer = if comment.is_some() {
        &line[rhs.end()..]
    } else {
        ""
    };
    Some(Declaration {
        name,
        rhs: rhs.as_str(),
        trailer,
    })
}

fn parameter_cell_index(notebook: &Notebook) -> Option<usize> {
    let tagged = notebook.code_cells().find(|(_, code)| {
        code.metadata
            .get("tags")
            .and_then(|t| t.as_array())
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some("parameters")))
    });
    tagged
        .or_else(|| notebook.code_cells().next())
        .map(|(index, _)| index)
}

/// Read the parameters declared in the notebook's parameter cell
pub fn extract_parameters(notebook: &Notebook) -> Vec<Parameter> {
    let Some(index) = parameter_cell_index(notebook) else {
        return Vec::new();
    };
    notebook.cells[index]
        .source()
        .lines()
        .filter_map(parse_declaration)
        .map(|decl| Parameter::parse(decl.name, decl.rhs))
        .collect()
}

/// Apply overrides to declared parameters; undeclared overrides are ignored
pub fn parameter_values(declared: &[Parameter], overrides: &ParameterSet) -> Vec<Parameter> {
    declared
        .iter()
        .map(|p| match overrides.get(&p.name) {
            Some(value) => p.with_value(value.clone()),
            None => p.clone(),
        })
        .collect()
}

/// Append overrides that are not declared as new text parameters
///
/// Returns the names added.
pub fn append_undeclared(params: &mut Vec<Parameter>, overrides: &ParameterSet) -> Vec<String> {
    let mut added = Vec::new();
    for (name, value) in overrides {
        if !params.iter().any(|p| &p.name == name) {
            params.push(Parameter::text(name, value.clone()));
            added.push(name.clone());
        }
    }
    added
}

/// Rewrite the parameter cell to hold `params`, without executing it
///
/// Declared assignments are rewritten in place, keeping trailing comments
/// and every other line. Parameters with no assignment are appended.
pub fn replace_definitions(notebook: &mut Notebook, params: &[Parameter]) {
    if params.is_empty() {
        return;
    }

    let Some(index) = parameter_cell_index(notebook) else {
        let body = params
            .iter()
            .map(|p| format!("{} = {}", p.name, p.render()))
            .collect::<Vec<_>>()
            .join("\n");
        notebook.cells.insert(0, Cell::code(body));
        return;
    };

    let Some(cell) = notebook.cells[index].as_code_mut() else {
        return;
    };
    let source = cell.source.as_str().to_string();

    let mut written: Vec<&str> = Vec::new();
    let mut lines: Vec<String> = source
        .split('\n')
        .map(|line| {
            let Some(decl) = parse_declaration(line) else {
                return line.to_string();
            };
            match params.iter().find(|p| p.name == decl.name) {
                Some(param) => {
                    written.push(decl.name);
                    format!("{} = {}{}", param.name, param.render(), decl.trailer)
                }
                None => line.to_string(),
            }
        })
        .collect();

    let missing: Vec<&Parameter> = params
        .iter()
        .filter(|p| !written.contains(&p.name.as_str()))
        .collect();
    if !missing.is_empty() {
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        for param in missing {
            lines.push(format!("{} = {}", param.name, param.render()));
        }
    }

    cell.source.set(lines.join("\n"));
}

/// Extract, override, append undeclared, and rewrite in one step
pub fn inject_parameters(notebook: &mut Notebook, overrides: &ParameterSet) -> Vec<Parameter> {
    let declared = extract_parameters(notebook);
    let mut params = parameter_values(&declared, overrides);
    for name in append_undeclared(&mut params, overrides) {
        tracing::debug!("Inserting {}", name);
    }
    replace_definitions(notebook, &params);
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(yaml: &str) -> ParameterSet {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn notebook(params: &str) -> Notebook {
        Notebook::new(vec![
            Cell::markdown("# Lab"),
            Cell::code(params),
            Cell::code("scope = cw.scope()"),
        ])
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let merged = merge_layers([&set("{a: 1}"), &set("{a: 2, b: 3}")]);
        assert_eq!(merged, set("{a: 2, b: 3}"));
    }

    #[test]
    fn test_extract_types() {
        let nb = notebook(
            "SCOPETYPE = 'OPENADC'  # or CWNANO\nBAUD = 38400\nGAIN = 4.5\nFAST = True\nKEY = None\nFW = os.path.join('a', 'b')\nif x:\n    Y = 1",
        );
        let params = extract_parameters(&nb);
        let kinds: Vec<(&str, ParamType)> =
            params.iter().map(|p| (p.name.as_str(), p.param_type)).collect();
        assert_eq!(
            kinds,
            vec![
                ("SCOPETYPE", ParamType::Text),
                ("BAUD", ParamType::Int),
                ("GAIN", ParamType::Float),
                ("FAST", ParamType::Bool),
                ("KEY", ParamType::None),
                ("FW", ParamType::Other),
            ]
        );
        assert_eq!(params[0].value, Value::String("OPENADC".into()));
    }

    #[test]
    fn test_tagged_cell_takes_precedence() {
        let mut nb = notebook("import chipwhisperer as cw");
        let mut tagged = Cell::code("PLATFORM = 'CWLITEARM'");
        if let Some(code) = tagged.as_code_mut() {
            code.metadata
                .insert("tags".into(), serde_json::json!(["parameters"]));
        }
        nb.cells.push(tagged);

        let params = extract_parameters(&nb);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "PLATFORM");
    }

    #[test]
    fn test_inject_rewrites_declared_and_appends_undeclared() {
        let mut nb = notebook("SCOPETYPE = 'OPENADC'  # scope\nPLATFORM = 'CWLITEARM'\nimport os\n");
        let params = inject_parameters(
            &mut nb,
            &set("{PLATFORM: CW308_STM32F3, SS_VER: SS_VER_2_1, NUM_TRACES: 50}"),
        );

        assert_eq!(params.len(), 4);
        assert_eq!(params[3].param_type, ParamType::Text);
        assert_eq!(
            nb.cells[1].source(),
            "SCOPETYPE = 'OPENADC'  # scope\nPLATFORM = 'CW308_STM32F3'\nimport os\nSS_VER = 'SS_VER_2_1'\nNUM_TRACES = 50"
        );
        assert_eq!(nb.cells[2].source(), "scope = cw.scope()");
    }

    #[test]
    fn test_undeclared_override_keeps_literal_form() {
        let mut nb = notebook("A = 1");
        let params = inject_parameters(&mut nb, &set("{USE_FAST: false, NUM_TRACES: 50, GAIN: 2.5}"));
        assert!(params[1..].iter().all(|p| p.param_type == ParamType::Text));
        assert_eq!(
            nb.cells[1].source(),
            "A = 1\nUSE_FAST = False\nNUM_TRACES = 50\nGAIN = 2.5"
        );
    }

    #[test]
    fn test_override_keeps_declared_type_rendering() {
        let mut nb = notebook("N = 10\nUSE_FAST = False");
        inject_parameters(&mut nb, &set("{N: 500, USE_FAST: true}"));
        assert_eq!(nb.cells[1].source(), "N = 500\nUSE_FAST = True");
    }

    #[test]
    fn test_unchanged_other_expression_kept_verbatim() {
        let mut nb = notebook("FW = os.path.join('a', 'b')\nX = 1");
        inject_parameters(&mut nb, &set("{X: 2}"));
        assert_eq!(nb.cells[1].source(), "FW = os.path.join('a', 'b')\nX = 2");
    }

    #[test]
    fn test_hash_inside_string_is_not_a_comment() {
        let mut nb = notebook("TAG = 'a#b' # note");
        inject_parameters(&mut nb, &set("{TAG: c}"));
        assert_eq!(nb.cells[1].source(), "TAG = 'c' # note");
    }

    #[test]
    fn test_no_code_cell_inserts_parameter_cell() {
        let mut nb = Notebook::new(vec![Cell::markdown("text only")]);
        inject_parameters(&mut nb, &set("{SCOPETYPE: OPENADC}"));
        assert_eq!(nb.cells.len(), 2);
        assert_eq!(nb.cells[0].source(), "SCOPETYPE = 'OPENADC'");
    }

    #[test]
    fn test_parameter_values_ignores_undeclared() {
        let nb = notebook("A = 1");
        let declared = extract_parameters(&nb);
        let params = parameter_values(&declared, &set("{A: 2, B: 3}"));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value, Value::from(2));
    }
}
