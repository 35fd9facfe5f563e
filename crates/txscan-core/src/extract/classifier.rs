//! Format classification and document-level orchestration.
//!
//! A [`Converter`] groups the [`FormatRule`]s of one institution. The
//! [`FormatClassifier`] selects the rules that apply to a document, seeds a
//! fresh [`ParsingContext`] for each of them and runs their segment rules.
//! Failures stay local to one segment occurrence and are collected in the
//! [`DocumentReport`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::{ParsingContext, RangeEntry};
use crate::document::RawDocument;
use crate::error::{ExtractionError, RuleError};
use crate::models::config::ExtractionConfig;
use crate::models::money::{CurrencyCode, RoundingPolicy};
use crate::models::transaction::{OutputItem, Security, SecurityRef};
use crate::numbers::{LocaleMode, NumberLocale};

use super::assembler::{AssemblyEnv, DraftAssembler};
use super::engine::{FieldMap, FieldRuleEngine};
use super::pattern::TextPattern;
use super::rule::{validate_nodes, RuleNode, Section};
use super::segment::SegmentRule;

/// Resolves captured security references to securities.
pub trait SecurityLookup: Send + Sync {
    /// `fallback_currency` is used when a new security has to be created
    /// and the reference states no currency.
    fn resolve(
        &self,
        reference: &SecurityRef,
        fallback_currency: Option<&CurrencyCode>,
    ) -> Option<Security>;
}

/// Map-backed [`SecurityLookup`].
///
/// Looks up by ISIN, then WKN, then ticker. With `create_missing` enabled,
/// an unknown reference carrying any identifier becomes a new security.
#[derive(Debug, Clone, Default)]
pub struct SecurityCatalog {
    securities: Vec<Security>,
    create_missing: bool,
}

impl SecurityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    pub fn with_security(mut self, security: Security) -> Self {
        self.securities.push(security);
        self
    }

    pub fn add(&mut self, security: Security) {
        self.securities.push(security);
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    fn find(&self, reference: &SecurityRef) -> Option<&Security> {
        let same = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        self.securities
            .iter()
            .find(|s| same(&s.isin, &reference.isin))
            .or_else(|| self.securities.iter().find(|s| same(&s.wkn, &reference.wkn)))
            .or_else(|| {
                self.securities
                    .iter()
                    .find(|s| same(&s.ticker, &reference.ticker))
            })
    }
}

impl SecurityLookup for SecurityCatalog {
    fn resolve(
        &self,
        reference: &SecurityRef,
        fallback_currency: Option<&CurrencyCode>,
    ) -> Option<Security> {
        if let Some(found) = self.find(reference) {
            return Some(found.clone());
        }
        if !self.create_missing || reference.is_empty() {
            return None;
        }
        let currency = reference.currency.clone().or_else(|| fallback_currency.cloned())?;
        let name = reference
            .name
            .clone()
            .or_else(|| reference.isin.clone())
            .or_else(|| reference.wkn.clone())
            .or_else(|| reference.ticker.clone())?;
        Some(Security {
            isin: reference.isin.clone(),
            wkn: reference.wkn.clone(),
            ticker: reference.ticker.clone(),
            name,
            currency,
        })
    }
}

/// Line-scanning initializer run once per document.
pub type ContextInitializer = Arc<dyn Fn(&mut ParsingContext, &[String]) + Send + Sync>;

/// Step of a context rule; only writes the parsing context.
pub type ContextStep =
    Arc<dyn Fn(&FieldMap, &mut ParsingContext) -> Result<(), ExtractionError> + Send + Sync>;

/// Wrap a closure as a [`ContextStep`].
pub fn context_step<F>(f: F) -> ContextStep
where
    F: Fn(&FieldMap, &mut ParsingContext) -> Result<(), ExtractionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Captures valid for the span of each occurrence of a segment rule.
#[derive(Debug, Clone)]
pub struct ContextRange {
    rule: SegmentRule,
    section: Section<()>,
}

impl ContextRange {
    pub fn new(rule: SegmentRule, section: Section<()>) -> Self {
        Self { rule, section }
    }

    fn collect(&self, lines: &[String], locale: LocaleMode) -> Vec<RangeEntry> {
        let nodes = [RuleNode::optional(self.section.clone())];
        let mut ctx = ParsingContext::new();
        self.rule
            .segments(lines)
            .filter_map(|segment| {
                let mut engine = FieldRuleEngine::new(segment.lines(lines), segment.start, locale);
                let (_, fields) = engine.collect(&nodes, &mut ctx).ok()?.pop()?;
                let values: BTreeMap<String, String> = fields
                    .names()
                    .filter_map(|n| fields.get(n).map(|v| (n.to_string(), v.to_string())))
                    .collect();
                Some(RangeEntry {
                    start: segment.start,
                    end: segment.end,
                    values,
                })
            })
            .collect()
    }
}

/// A kind of document an institution produces, and how to parse it.
pub struct FormatRule {
    name: String,
    must_include: Vec<TextPattern>,
    must_not_include: Vec<TextPattern>,
    locale: Option<LocaleMode>,
    initializers: Vec<ContextInitializer>,
    context_rules: Vec<RuleNode<ContextStep>>,
    ranges: Vec<ContextRange>,
    segments: Vec<(SegmentRule, DraftAssembler)>,
    invalid: Vec<RuleError>,
}

impl FormatRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            must_include: Vec::new(),
            must_not_include: Vec::new(),
            locale: None,
            initializers: Vec::new(),
            context_rules: Vec::new(),
            ranges: Vec::new(),
            segments: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Text that must be found somewhere in the document.
    pub fn must_include(mut self, pattern: &str) -> Self {
        match TextPattern::new(pattern) {
            Ok(p) => self.must_include.push(p),
            Err(e) => self.invalid.push(e),
        }
        self
    }

    /// Text that must not be found anywhere in the document.
    pub fn must_not_include(mut self, pattern: &str) -> Self {
        match TextPattern::new(pattern) {
            Ok(p) => self.must_not_include.push(p),
            Err(e) => self.invalid.push(e),
        }
        self
    }

    pub fn with_locale(mut self, locale: NumberLocale) -> Self {
        self.locale = Some(LocaleMode::Fixed(locale));
        self
    }

    /// Infer the locale of each number, using `fallback` when ambiguous.
    pub fn with_inferred_locale(mut self, fallback: NumberLocale) -> Self {
        self.locale = Some(LocaleMode::Inferred { fallback });
        self
    }

    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ParsingContext, &[String]) + Send + Sync + 'static,
    {
        self.initializers.push(Arc::new(f));
        self
    }

    /// A section matched anywhere in the document to seed the context.
    pub fn context_rule(mut self, section: Section<ContextStep>) -> Self {
        self.context_rules.push(RuleNode::optional(section));
        self
    }

    pub fn context_range(mut self, range: ContextRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn segment(mut self, rule: SegmentRule, assembler: DraftAssembler) -> Self {
        self.segments.push((rule, assembler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segment_labels(&self) -> Vec<&str> {
        self.segments.iter().map(|(_, a)| a.label()).collect()
    }

    /// Whether the document text satisfies the include and exclude patterns.
    pub fn matches(&self, text: &str) -> bool {
        !self.must_include.is_empty()
            && self.must_include.iter().all(|p| p.is_found(text))
            && !self.must_not_include.iter().any(|p| p.is_found(text))
    }

    fn validate(&self) -> Result<(), RuleError> {
        if let Some(err) = self.invalid.first() {
            return Err(err.clone());
        }
        if self.must_include.is_empty() {
            return Err(RuleError::MissingIdentification(self.name.clone()));
        }
        validate_nodes(&self.context_rules)?;
        for range in &self.ranges {
            validate_nodes(&[RuleNode::optional(range.section.clone())])?;
        }
        for (_, assembler) in &self.segments {
            assembler.validate()?;
        }
        Ok(())
    }

    /// Seed a fresh context from the whole document.
    fn initialize(&self, ctx: &mut ParsingContext, lines: &[String], locale: LocaleMode) {
        for init in &self.initializers {
            init(ctx, lines);
        }

        for node in &self.context_rules {
            let mut engine = FieldRuleEngine::new(lines, 0, locale);
            let result = engine.run(std::slice::from_ref(node), ctx, |step, fields, ctx| {
                step(&fields, ctx)
            });
            if let Err(e) = result {
                warn!("Context rule of {} failed: {}", self.name, e);
            }
        }

        if !self.ranges.is_empty() {
            let entries = self
                .ranges
                .iter()
                .flat_map(|r| r.collect(lines, locale))
                .collect();
            ctx.set_ranges(entries);
        }
    }
}

/// The format rules of one institution.
pub struct Converter {
    label: String,
    bank_identifiers: Vec<String>,
    formats: Vec<FormatRule>,
}

impl Converter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bank_identifiers: Vec::new(),
            formats: Vec::new(),
        }
    }

    /// Text identifying the institution. Without identifiers the converter
    /// considers every document.
    pub fn bank_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.bank_identifiers.push(identifier.into());
        self
    }

    pub fn format(mut self, format: FormatRule) -> Self {
        self.formats.push(format);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bank_identifiers(&self) -> &[String] {
        &self.bank_identifiers
    }

    pub fn formats(&self) -> &[FormatRule] {
        &self.formats
    }

    pub fn applies_to(&self, text: &str) -> bool {
        self.bank_identifiers.is_empty() || self.bank_identifiers.iter().any(|id| text.contains(id))
    }
}

/// A segment occurrence that produced no item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceError {
    pub format: String,
    pub segment: String,
    /// One-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub error: String,
}

/// Everything one document produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document: String,
    /// Names of the matched format rules.
    pub formats: Vec<String>,
    pub items: Vec<OutputItem>,
    pub errors: Vec<OccurrenceError>,
}

impl DocumentReport {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            formats: Vec::new(),
            items: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether any format rule matched.
    pub fn is_recognized(&self) -> bool {
        !self.formats.is_empty()
    }

    pub fn committed(&self) -> impl Iterator<Item = &OutputItem> {
        self.items.iter().filter(|i| i.is_committed())
    }

    pub fn count(&self, status: &str) -> usize {
        self.items.iter().filter(|i| i.status() == status).count()
    }
}

/// Counts over a set of document reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub documents: usize,
    pub unrecognized: usize,
    pub committed: usize,
    pub discarded: usize,
    pub failed: usize,
    pub errors: usize,
    /// "document: diagnostic" per failed item and occurrence error.
    pub diagnostics: Vec<String>,
}

impl ImportSummary {
    pub fn add(&mut self, report: &DocumentReport) {
        self.documents += 1;
        if !report.is_recognized() {
            self.unrecognized += 1;
            self.diagnostics
                .push(format!("{}: document not recognized", report.document));
        }
        for item in &report.items {
            match item {
                OutputItem::Committed { .. } => self.committed += 1,
                OutputItem::Discarded { .. } => self.discarded += 1,
                OutputItem::Failed { diagnostic, .. } => {
                    self.failed += 1;
                    self.diagnostics
                        .push(format!("{}: {}", report.document, diagnostic));
                }
            }
        }
        for error in &report.errors {
            self.errors += 1;
            self.diagnostics.push(format!(
                "{}: {} lines {}-{}: {}",
                report.document, error.segment, error.start_line, error.end_line, error.error
            ));
        }
    }

    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a DocumentReport>) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add(report);
        }
        summary
    }
}

/// Registry of converters; classifies and parses documents.
pub struct FormatClassifier {
    converters: Vec<Converter>,
    default_locale: NumberLocale,
    default_rounding: RoundingPolicy,
}

impl FormatClassifier {
    pub fn new() -> Self {
        Self {
            converters: Vec::new(),
            default_locale: NumberLocale::GERMAN,
            default_rounding: RoundingPolicy::HalfUp,
        }
    }

    pub fn with_default_locale(mut self, locale: NumberLocale) -> Self {
        self.default_locale = locale;
        self
    }

    pub fn with_default_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.default_rounding = rounding;
        self
    }

    /// Apply the defaults of an extraction configuration.
    pub fn with_config(self, config: &ExtractionConfig) -> Self {
        self.with_default_locale(config.default_locale)
            .with_default_rounding(config.default_rounding)
    }

    /// Register a converter after validating its rule tables.
    pub fn register(&mut self, converter: Converter) -> Result<(), RuleError> {
        let mut names = HashSet::new();
        for format in &converter.formats {
            format.validate()?;
            if !names.insert(format.name()) {
                return Err(RuleError::DuplicateFormat(format.name().to_string()));
            }
        }
        debug!(
            "Registered converter {} with {} formats",
            converter.label,
            converter.formats.len()
        );
        self.converters.push(converter);
        Ok(())
    }

    pub fn converters(&self) -> &[Converter] {
        &self.converters
    }

    /// Format rules that apply to the document, as (converter, format).
    pub fn classify<'a>(&'a self, document: &RawDocument) -> Vec<(&'a Converter, &'a FormatRule)> {
        let text = document.text();
        self.converters
            .iter()
            .filter(|c| c.applies_to(text))
            .flat_map(|c| c.formats.iter().map(move |f| (c, f)))
            .filter(|(_, f)| f.matches(text))
            .collect()
    }

    /// Parse a document with every matching format rule.
    pub fn parse(&self, document: &RawDocument, lookup: &dyn SecurityLookup) -> DocumentReport {
        let mut report = DocumentReport::new(document.name());
        let lines = document.lines();
        let mut ctx = ParsingContext::new();

        for (converter, format) in self.classify(document) {
            let label = format!("{}/{}", converter.label, format.name);
            info!("{} classified as {}", document.name(), label);
            report.formats.push(label.clone());

            let locale = format
                .locale
                .unwrap_or(LocaleMode::Fixed(self.default_locale));
            ctx.clear();
            format.initialize(&mut ctx, lines, locale);

            let env = AssemblyEnv {
                locale,
                default_rounding: self.default_rounding,
                lookup,
                source: Some(document.name()),
            };

            for (rule, assembler) in &format.segments {
                let mut occurrences = 0;
                for segment in rule.segments(lines) {
                    occurrences += 1;
                    ctx.begin_occurrence(rule.reset_keys());
                    debug!(
                        "{} segment {} at lines {}-{}",
                        label,
                        assembler.label(),
                        segment.start + 1,
                        segment.end + 1
                    );

                    match assembler.assemble(segment.lines(lines), segment.start, &mut ctx, &env) {
                        Ok(item) => {
                            if let OutputItem::Failed { diagnostic, .. } = &item {
                                warn!("{} {}: {}", document.name(), assembler.label(), diagnostic);
                            }
                            report.items.push(item);
                        }
                        Err(e) => {
                            warn!(
                                "{} {} lines {}-{}: {}",
                                document.name(),
                                assembler.label(),
                                segment.start + 1,
                                segment.end + 1,
                                e
                            );
                            report.errors.push(OccurrenceError {
                                format: label.clone(),
                                segment: assembler.label().to_string(),
                                start_line: segment.start + 1,
                                end_line: segment.end + 1,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                if occurrences == 0 {
                    debug!("{} segment {} absent", label, assembler.label());
                }
            }
        }

        if !report.is_recognized() {
            warn!("{} not recognized by any format", document.name());
        }
        report
    }

    /// Read a text file and parse it.
    pub fn parse_path(
        &self,
        path: &Path,
        lookup: &dyn SecurityLookup,
    ) -> crate::error::Result<DocumentReport> {
        let document = RawDocument::read(path)?;
        Ok(self.parse(&document, lookup))
    }
}

impl Default for FormatClassifier {
    fn default() -> Self {
        Self::new()
    }
}
