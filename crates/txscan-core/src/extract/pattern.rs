//! Full-line patterns with named captures.

use regex::Regex;

use crate::error::RuleError;

/// A regular expression that must match a whole line.
#[derive(Debug, Clone)]
pub struct LinePattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl LinePattern {
    /// Compile a pattern. `^` and `$` are implied.
    pub fn new(pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| RuleError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let names = regex
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect();
        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    /// Pattern as written in the rule table.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Named groups in declaration order.
    pub fn capture_names(&self) -> &[String] {
        &self.names
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Named captures of a matching line. Groups that did not take part
    /// in the match are left out.
    pub fn captures(&self, line: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(line)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), m.as_str().trim().to_string()))
                })
                .collect(),
        )
    }
}

/// A pattern searched anywhere in a document's text.
#[derive(Debug, Clone)]
pub struct TextPattern {
    regex: Regex,
}

impl TextPattern {
    pub fn new(pattern: &str) -> Result<Self, RuleError> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| RuleError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_found(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}
