//! Field rules as data: sections of line patterns arranged in a small tree
//! of required, optional, one-of and repeat nodes.
//!
//! Every section carries a payload `S`. The engine hands the payload back
//! with each successful match, so the assembler can attach a mutation step
//! while tests can use plain labels.

use std::collections::HashSet;

use crate::error::RuleError;

use super::pattern::LinePattern;

/// An ordered list of line patterns matched as one group.
#[derive(Debug, Clone)]
pub struct Section<S> {
    id: Option<String>,
    patterns: Vec<LinePattern>,
    context_attributes: Vec<String>,
    range_attributes: Vec<String>,
    detached: bool,
    invalid: Vec<RuleError>,
    payload: S,
}

impl<S> Section<S> {
    pub fn new(payload: S) -> Self {
        Self {
            id: None,
            patterns: Vec::new(),
            context_attributes: Vec::new(),
            range_attributes: Vec::new(),
            detached: false,
            invalid: Vec::new(),
            payload,
        }
    }

    /// Identify the section in diagnostics.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a line pattern. Invalid patterns are reported at registration.
    pub fn pattern(mut self, pattern: &str) -> Self {
        match LinePattern::new(pattern) {
            Ok(p) => self.patterns.push(p),
            Err(e) => self.invalid.push(e),
        }
        self
    }

    /// Merge a document context value into the captured fields.
    pub fn context(mut self, key: impl Into<String>) -> Self {
        self.context_attributes.push(key.into());
        self
    }

    /// Merge the value of a context range covering the matched lines.
    pub fn range(mut self, attribute: impl Into<String>) -> Self {
        self.range_attributes.push(attribute.into());
        self
    }

    /// Match anywhere in the segment without consuming lines or moving
    /// the cursor.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Name used in diagnostics: the id, or the first pattern.
    pub fn label(&self) -> String {
        match (&self.id, self.patterns.first()) {
            (Some(id), _) => id.clone(),
            (None, Some(p)) => format!("'{}'", p.source()),
            (None, None) => "<empty>".to_string(),
        }
    }

    pub fn section_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn patterns(&self) -> &[LinePattern] {
        &self.patterns
    }

    pub fn context_attributes(&self) -> &[String] {
        &self.context_attributes
    }

    pub fn range_attributes(&self) -> &[String] {
        &self.range_attributes
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn payload(&self) -> &S {
        &self.payload
    }

    fn validate(&self, ids: &mut HashSet<String>) -> Result<(), RuleError> {
        if let Some(err) = self.invalid.first() {
            return Err(err.clone());
        }
        if self.patterns.is_empty() {
            return Err(RuleError::EmptySection(self.label()));
        }
        if let Some(id) = &self.id {
            if !ids.insert(id.clone()) {
                return Err(RuleError::DuplicateSectionId(id.clone()));
            }
        }

        let mut names = HashSet::new();
        for name in self.patterns.iter().flat_map(|p| p.capture_names()) {
            if !names.insert(name.as_str()) {
                return Err(RuleError::DuplicateCapture {
                    section: self.label(),
                    name: name.clone(),
                });
            }
            if self.context_attributes.contains(name) || self.range_attributes.contains(name) {
                return Err(RuleError::ContextCollision {
                    section: self.label(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A node of a field rule tree.
#[derive(Debug, Clone)]
pub enum RuleNode<S> {
    /// Must match; a miss aborts the segment occurrence.
    Required(Section<S>),

    /// May match; a miss leaves the cursor unchanged.
    Optional(Section<S>),

    /// The first alternative, in declaration order, that matches fully.
    OneOf {
        alternatives: Vec<Section<S>>,
        optional: bool,
    },

    /// The same section matched repeatedly, each match delivered on its own.
    Repeat {
        section: Section<S>,
        min: usize,
        max: Option<usize>,
    },
}

impl<S> RuleNode<S> {
    pub fn required(section: Section<S>) -> Self {
        RuleNode::Required(section)
    }

    pub fn optional(section: Section<S>) -> Self {
        RuleNode::Optional(section)
    }

    pub fn one_of(alternatives: Vec<Section<S>>) -> Self {
        RuleNode::OneOf {
            alternatives,
            optional: false,
        }
    }

    pub fn optional_one_of(alternatives: Vec<Section<S>>) -> Self {
        RuleNode::OneOf {
            alternatives,
            optional: true,
        }
    }

    /// Zero or more matches.
    pub fn repeat(section: Section<S>) -> Self {
        RuleNode::Repeat {
            section,
            min: 0,
            max: None,
        }
    }

    pub fn repeat_between(section: Section<S>, min: usize, max: Option<usize>) -> Self {
        RuleNode::Repeat { section, min, max }
    }

    /// All sections of this node.
    pub fn sections(&self) -> Vec<&Section<S>> {
        match self {
            RuleNode::Required(s) | RuleNode::Optional(s) => vec![s],
            RuleNode::OneOf { alternatives, .. } => alternatives.iter().collect(),
            RuleNode::Repeat { section, .. } => vec![section],
        }
    }
}

/// Check a rule tree for registration errors: invalid or empty sections,
/// duplicate capture names within a section, captures shadowing context
/// attributes, duplicate section ids and malformed groups.
pub fn validate_nodes<S>(nodes: &[RuleNode<S>]) -> Result<(), RuleError> {
    let mut ids = HashSet::new();
    for node in nodes {
        match node {
            RuleNode::OneOf { alternatives, .. } if alternatives.is_empty() => {
                return Err(RuleError::EmptyAlternatives);
            }
            RuleNode::Repeat {
                section,
                min,
                max: Some(max),
            } if max < min || *max == 0 => {
                return Err(RuleError::RepeatBounds {
                    section: section.label(),
                    min: *min,
                    max: *max,
                });
            }
            _ => {}
        }
        for section in node.sections() {
            section.validate(&mut ids)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tree() {
        let nodes = vec![
            RuleNode::required(Section::new("type").pattern("(?<type>Kauf|Verkauf)")),
            RuleNode::one_of(vec![
                Section::new("a").id("a").pattern(r"A (?<v>\d+)"),
                Section::new("b").id("b").pattern(r"B (?<v>\d+)"),
            ]),
            RuleNode::repeat(Section::new("tax").pattern(r"Steuer (?<tax>[\d,]+)")),
        ];
        assert!(validate_nodes(&nodes).is_ok());
    }

    #[test]
    fn test_duplicate_capture_in_section() {
        let nodes = vec![RuleNode::required(
            Section::new(())
                .id("total")
                .pattern(r"Betrag (?<amount>[\d,]+)")
                .pattern(r"Summe (?<amount>[\d,]+)"),
        )];
        assert_eq!(
            validate_nodes(&nodes),
            Err(RuleError::DuplicateCapture {
                section: "total".to_string(),
                name: "amount".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_section_id() {
        let nodes = vec![
            RuleNode::required(Section::new(()).id("x").pattern("A")),
            RuleNode::optional(Section::new(()).id("x").pattern("B")),
        ];
        assert_eq!(
            validate_nodes(&nodes),
            Err(RuleError::DuplicateSectionId("x".to_string()))
        );
    }

    #[test]
    fn test_capture_shadowing_context() {
        let nodes = vec![RuleNode::required(
            Section::new(())
                .pattern(r"(?<currency>[A-Z]{3})")
                .context("currency"),
        )];
        assert!(matches!(
            validate_nodes(&nodes),
            Err(RuleError::ContextCollision { .. })
        ));
    }

    #[test]
    fn test_invalid_and_empty() {
        let invalid = vec![RuleNode::required(Section::new(()).pattern("(?<x>"))];
        assert!(matches!(
            validate_nodes(&invalid),
            Err(RuleError::Pattern { .. })
        ));

        let empty = vec![RuleNode::optional(Section::new(()).id("nothing"))];
        assert_eq!(
            validate_nodes(&empty),
            Err(RuleError::EmptySection("nothing".to_string()))
        );

        let no_alternatives: Vec<RuleNode<()>> = vec![RuleNode::one_of(vec![])];
        assert_eq!(
            validate_nodes(&no_alternatives),
            Err(RuleError::EmptyAlternatives)
        );
    }

    #[test]
    fn test_repeat_bounds() {
        let nodes = vec![RuleNode::repeat_between(
            Section::new(()).id("r").pattern("R"),
            2,
            Some(1),
        )];
        assert!(matches!(
            validate_nodes(&nodes),
            Err(RuleError::RepeatBounds { .. })
        ));
    }
}
