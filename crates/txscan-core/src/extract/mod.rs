//! Rule-driven extraction from line-oriented statement text.
//!
//! Documents are split into segments ([`segment`]), each segment is matched
//! against a tree of field rules ([`rule`], [`engine`]) and the matches are
//! assembled into transaction drafts ([`assembler`]). The [`classifier`]
//! decides which rule tables apply to a document.

pub mod assembler;
pub mod classifier;
pub mod engine;
pub mod pattern;
pub mod rule;
pub mod segment;

pub use assembler::{
    finalize, step, AssemblyEnv, DraftAssembler, DraftMutation, MutationStep, PostProcess,
};
pub use classifier::{
    context_step, ContextRange, ContextStep, Converter, DocumentReport, FormatClassifier,
    FormatRule, ImportSummary, OccurrenceError, SecurityCatalog, SecurityLookup,
};
pub use engine::{FieldMap, FieldRuleEngine, NodeOutcome};
pub use pattern::{LinePattern, TextPattern};
pub use rule::{validate_nodes, RuleNode, Section};
pub use segment::{LineWindowScanner, Segment, SegmentRule};
