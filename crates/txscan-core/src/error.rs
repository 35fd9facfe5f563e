//! Error types for the txscan-core library.

use thiserror::Error;

/// Main error type for the txscan library.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Rule table registration error.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// Field extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while building a rule table.
///
/// These are programming errors in a rule table and surface when the table
/// is registered, never while a document is parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A line pattern is not a valid regular expression.
    #[error("invalid pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },

    /// The same capture name appears twice within one group.
    #[error("duplicate capture name '{name}' in section {section}")]
    DuplicateCapture { section: String, name: String },

    /// Two sections of one assembler share an id.
    #[error("duplicate section id '{0}'")]
    DuplicateSectionId(String),

    /// A capture name is also requested from the document context.
    #[error("capture '{name}' in section {section} shadows a context attribute")]
    ContextCollision { section: String, name: String },

    /// A section has no line patterns.
    #[error("section {0} has no patterns")]
    EmptySection(String),

    /// A one-of group has no alternatives.
    #[error("one-of group has no alternatives")]
    EmptyAlternatives,

    /// A repeat group allows fewer occurrences than it requires.
    #[error("repeat of section {section} has max {max} below min {min}")]
    RepeatBounds {
        section: String,
        min: usize,
        max: usize,
    },

    /// Two format rules of one converter share a name.
    #[error("duplicate format '{0}'")]
    DuplicateFormat(String),

    /// A format rule has no must-include pattern.
    #[error("format {0} has no identifying pattern")]
    MissingIdentification(String),
}

/// Errors local to one segment occurrence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// A required group did not match inside the segment.
    #[error("section {section} matched {matched} of {expected} patterns in lines {start}-{end}")]
    RequiredFieldMismatch {
        section: String,
        matched: usize,
        expected: usize,
        start: usize,
        end: usize,
    },

    /// None of the alternatives of a required one-of group matched.
    #[error("none of {alternatives} alternatives matched in lines {start}-{end}: {details}")]
    NoAlternativeMatched {
        alternatives: usize,
        start: usize,
        end: usize,
        details: String,
    },

    /// A repeat group matched fewer times than required.
    #[error("section {section} matched {found} times, expected at least {min}")]
    RepeatTooFew {
        section: String,
        found: usize,
        min: usize,
    },

    /// A named value was requested that the section did not capture.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A value requested from the parsing context was not present.
    #[error("missing document context value: {0}")]
    MissingContext(String),

    /// A range attribute was requested that no context range provides.
    #[error("no context range provides '{attribute}' at line {line_no}")]
    MissingRange { attribute: String, line_no: usize },

    /// A captured number could not be parsed under the active locale.
    #[error("failed to parse {field} '{value}' on line {line_no}: {line}")]
    NumericParse {
        field: String,
        value: String,
        line_no: usize,
        line: String,
    },

    /// A captured date or time could not be parsed.
    #[error("failed to parse date {field} '{value}'")]
    DateParse { field: String, value: String },

    /// An amount is in a currency with no known exchange rate.
    #[error("no exchange rate available to convert {from} to {to}")]
    CurrencyConversionUnavailable { from: String, to: String },

    /// Captured data is inconsistent.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },
}

/// Result type for the txscan library.
pub type Result<T> = std::result::Result<T, ScanError>;
