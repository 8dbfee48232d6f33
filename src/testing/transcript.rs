//! Per-test output record
//!
//! Progress lines are printed live and also kept, so the same text can be
//! written to the per-worker log afterward.

/// Append-only sink for human-readable progress output
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    echo: bool,
}

impl Transcript {
    /// A transcript that also prints each line to stdout
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            echo: true,
        }
    }

    /// A transcript that only records
    pub fn quiet() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.echo {
            println!("{}", text);
        }
        self.lines.push(text);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Recorded lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut t = Transcript::quiet();
        t.line("Testing: a.ipynb:...");
        t.line(String::from("PASSED"));
        assert_eq!(t.lines().len(), 2);
        assert_eq!(t.text(), "Testing: a.ipynb:...\nPASSED");
        assert!(t.contains("PASS"));
    }
}
