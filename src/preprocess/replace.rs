//! Regex substitution over code cells
//!
//! Rules are plain textual rewrites of opaque source strings. They do not
//! know about Python syntax, so a pattern also matches inside string
//! literals and comments.

use regex::Regex;

use crate::common::{Error, Result};
use crate::notebook::Notebook;

/// A compiled pattern and its replacement template
///
/// Templates use `regex` syntax: `$1` or `${1}` for groups, `$$` for a
/// literal dollar sign.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    pattern: Regex,
    replacement: String,
}

impl ReplacementRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e))?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// Ordered rules applied independently to every code cell
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ReplacementRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile pattern/template pairs in iteration order
    ///
    /// Fails on the first malformed pattern.
    pub fn from_pairs<I, P, R>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let rules = pairs
            .into_iter()
            .map(|(p, r)| ReplacementRule::new(p.as_ref(), r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Compile and append a rule
    pub fn add(&mut self, pattern: &str, replacement: impl Into<String>) -> Result<()> {
        self.rules.push(ReplacementRule::new(pattern, replacement)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order to one source text
    pub fn apply_to_source(&self, source: &str) -> String {
        self.rules
            .iter()
            .fold(source.to_string(), |text, rule| rule.apply(&text))
    }

    /// Apply to every code cell; returns the number of cells changed
    pub fn apply(&self, notebook: &mut Notebook) -> usize {
        let mut changed = 0;
        for cell in notebook.code_cells_mut() {
            let rewritten = self.apply_to_source(cell.source.as_str());
            if rewritten != cell.source.as_str() {
                cell.source.set(rewritten);
                changed += 1;
            }
        }
        changed
    }
}

/// Escape a value for use inside a replacement template
pub fn escape_template(value: &str) -> String {
    value.replace('$', "$$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::Cell;

    #[test]
    fn test_serial_number_injection() {
        let rules =
            RuleSet::from_pairs([(r"cw.scope\(\)", "cw.scope(sn='ABC123')")]).unwrap();
        let mut nb = Notebook::new(vec![Cell::code("scope = cw.scope()")]);
        assert_eq!(rules.apply(&mut nb), 1);
        assert_eq!(nb.cells[0].source(), "scope = cw.scope(sn='ABC123')");
    }

    #[test]
    fn test_non_matching_rules_leave_notebook_identical() {
        let rules = RuleSet::from_pairs([(r"cw.scope\(\)", "cw.scope(sn='ABC123')")]).unwrap();
        let mut nb = Notebook::new(vec![
            Cell::markdown("cw.scope() in prose"),
            Cell::code("target = cw.target(None)"),
        ]);
        let before = nb.to_json().unwrap();
        assert_eq!(rules.apply(&mut nb), 0);
        assert_eq!(nb.to_json().unwrap(), before);
    }

    #[test]
    fn test_capture_group_template() {
        let rules = RuleSet::from_pairs([(r"(program_target\(.*)\)", "${1}, baud=38400)")]).unwrap();
        assert_eq!(
            rules.apply_to_source("cw.program_target(scope, prog, fw_path)"),
            "cw.program_target(scope, prog, fw_path, baud=38400)"
        );
    }

    #[test]
    fn test_rules_apply_in_order() {
        let rules = RuleSet::from_pairs([("a", "b"), ("b", "c")]).unwrap();
        assert_eq!(rules.apply_to_source("a"), "c");
    }

    #[test]
    fn test_matches_inside_string_literals() {
        let rules = RuleSet::from_pairs([(r"cw.scope\(\)", "cw.scope(sn='X')")]).unwrap();
        assert_eq!(
            rules.apply_to_source("print('call cw.scope()')"),
            "print('call cw.scope(sn='X')')"
        );
    }

    #[test]
    fn test_malformed_pattern_is_config_error() {
        let err = RuleSet::from_pairs([("ok", "x"), ("(unclosed", "y")]).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_escape_template() {
        let rules = RuleSet::from_pairs([("SN", escape_template("a$1b"))]).unwrap();
        assert_eq!(rules.apply_to_source("SN"), "a$1b");
    }
}
