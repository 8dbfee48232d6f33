//! Python literal rendering and parsing
//!
//! Enough of Python's literal syntax to write parameter values and magic
//! arguments the way the kernel's own `repr()` would, and to read simple
//! literals back out of a parameter cell.

use serde_yaml::Value;

/// Render a string as Python's `repr()` would
pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{:02x}", code));
                } else {
                    out.push_str(&format!("\\u{:04x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Render a YAML value as a Python literal
pub fn repr_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                repr_float(f)
            } else {
                n.to_string()
            }
        }
        Value::String(s) => repr_str(s),
        Value::Sequence(items) => {
            let inner: Vec<String> = items.iter().map(repr_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Mapping(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", repr_value(k), repr_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        Value::Tagged(tagged) => repr_value(&tagged.value),
    }
}

fn repr_float(f: f64) -> String {
    if f.is_nan() {
        "float('nan')".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Plain text form of a value, as Python's `str()` would print it
pub fn str_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => repr_value(other),
    }
}

/// Parse a single- or double-quoted Python string literal
///
/// Returns `None` for prefixed, triple-quoted, or unterminated literals.
pub fn parse_str(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;
    if text.len() >= 3 && text[1..].starts_with(quote) && text[2..].starts_with(quote) {
        return None;
    }

    let mut out = String::new();
    let mut closed = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                other => out.push(other),
            },
            c if c == quote => {
                closed = true;
                break;
            }
            c => out.push(c),
        }
    }
    if closed && chars.as_str().trim().is_empty() {
        Some(out)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_str_quotes() {
        assert_eq!(repr_str("abc"), "'abc'");
        assert_eq!(repr_str("it's"), "\"it's\"");
        assert_eq!(repr_str("both ' and \""), "'both \\' and \"'");
        assert_eq!(repr_str("a\nb\\c"), "'a\\nb\\\\c'");
    }

    #[test]
    fn test_repr_value() {
        let value: Value = serde_yaml::from_str("[1, 2.0, true, null, x]").unwrap();
        assert_eq!(repr_value(&value), "[1, 2.0, True, None, 'x']");

        let value: Value = serde_yaml::from_str("{a: 1}").unwrap();
        assert_eq!(repr_value(&value), "{'a': 1}");
    }

    #[test]
    fn test_str_value() {
        assert_eq!(str_value(&Value::String("SS_VER_2_1".into())), "SS_VER_2_1");
        assert_eq!(str_value(&Value::from(38400)), "38400");
    }

    #[test]
    fn test_parse_str() {
        assert_eq!(parse_str("'OPENADC'").as_deref(), Some("OPENADC"));
        assert_eq!(parse_str("\"a\\nb\"").as_deref(), Some("a\nb"));
        assert_eq!(parse_str("'unterminated"), None);
        assert_eq!(parse_str("'''doc'''"), None);
        assert_eq!(parse_str("'a' + 'b'"), None);
        assert_eq!(parse_str("42"), None);
    }
}
