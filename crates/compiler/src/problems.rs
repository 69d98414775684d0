//! Parse expectations and diagnostics
//!
//! Failures during parsing are not errors yet: they are *expectations*
//! recorded against positions, accumulated while backtracking explores
//! other routes. Only when a whole statement drains with no solution are
//! the expectations compiled into a diagnostic, and then only the ones
//! furthest into the source are worth reporting.

use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub position: usize,
    pub line: u32,
    pub message: String,
}

#[derive(Default)]
pub struct ExpectationSet {
    entries: Mutex<Vec<Expectation>>,
}

impl ExpectationSet {
    pub fn new() -> ExpectationSet {
        ExpectationSet::default()
    }

    pub fn expect(&self, position: usize, line: u32, message: impl Into<String>) {
        self.entries
            .lock()
            .expect("expectation lock poisoned")
            .push(Expectation {
                position,
                line,
                message: message.into(),
            });
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .expect("expectation lock poisoned")
            .is_empty()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("expectation lock poisoned")
            .clear();
    }

    /// The expectations at the furthest position reached, deduplicated,
    /// in arrival order.
    pub fn furthest(&self) -> Vec<Expectation> {
        let entries = self.entries.lock().expect("expectation lock poisoned");
        let Some(max_position) = entries.iter().map(|e| e.position).max() else {
            return Vec::new();
        };
        let mut out: Vec<Expectation> = Vec::new();
        for entry in entries.iter().filter(|e| e.position == max_position) {
            if !out.iter().any(|seen| seen.message == entry.message) {
                out.push(entry.clone());
            }
        }
        out
    }

    /// Render the failure report for a statement with no solutions.
    pub fn render(&self) -> String {
        let furthest = self.furthest();
        if furthest.is_empty() {
            return "parse failed with no recorded expectations".to_string();
        }
        let line = furthest[0].line;
        let mut message = format!("line {line}: expected");
        for (index, expectation) in furthest.iter().enumerate() {
            if index > 0 {
                message.push_str(", or");
            }
            message.push(' ');
            message.push_str(&expectation.message);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_furthest_position_wins() {
        let set = ExpectationSet::new();
        set.expect(3, 1, "a digit");
        set.expect(10, 2, "a keyword");
        set.expect(10, 2, "an operator");
        set.expect(5, 1, "something early");
        let furthest = set.furthest();
        assert_eq!(furthest.len(), 2);
        assert!(furthest.iter().all(|e| e.position == 10));
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = ExpectationSet::new();
        set.expect(4, 1, "a digit");
        set.expect(4, 1, "a digit");
        assert_eq!(set.furthest().len(), 1);
    }

    #[test]
    fn test_render_mentions_line() {
        let set = ExpectationSet::new();
        set.expect(8, 3, "the keyword `then`");
        let rendered = set.render();
        assert!(rendered.contains("line 3"));
        assert!(rendered.contains("`then`"));
    }
}
