//! Interpreter for field rule trees over the lines of one segment.
//!
//! Ordered sections search forward from a single cursor and consume the
//! lines they match; a line is never matched twice by ordered sections.
//! Detached sections search the whole segment, skip consumed lines and
//! leave the cursor alone.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::context::ParsingContext;
use crate::error::ExtractionError;
use crate::models::money::{CurrencyCode, Money, AMOUNT_SCALE};
use crate::numbers::{self, LocaleMode};

use super::rule::{RuleNode, Section};

/// Named values captured by one successful section match.
///
/// Captured values remember the document line they came from so that
/// parse errors can point at it. Values merged from the parsing context
/// carry no line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    section: String,
    values: BTreeMap<String, String>,
    origins: BTreeMap<String, usize>,
    lines: BTreeMap<usize, String>,
    locale: LocaleMode,
}

impl FieldMap {
    pub fn new(section: impl Into<String>, locale: LocaleMode) -> Self {
        Self {
            section: section.into(),
            values: BTreeMap::new(),
            origins: BTreeMap::new(),
            lines: BTreeMap::new(),
            locale,
        }
    }

    /// Add a value captured on document line `line_no` (zero based).
    pub fn capture(&mut self, name: &str, value: &str, line_no: usize, line: &str) {
        self.values.insert(name.to_string(), value.to_string());
        self.origins.insert(name.to_string(), line_no);
        self.lines.insert(line_no, line.to_string());
    }

    /// Add a value that did not come from a line.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    /// Label of the section that produced the map.
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn locale(&self) -> LocaleMode {
        self.locale
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&str, ExtractionError> {
        self.get(name)
            .ok_or_else(|| ExtractionError::MissingField(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Zero-based document line the value was captured on.
    pub fn line_of(&self, name: &str) -> Option<usize> {
        self.origins.get(name).copied()
    }

    /// First document line of the match.
    pub fn first_line(&self) -> Option<usize> {
        self.lines.keys().next().copied()
    }

    fn numeric_error(&self, name: &str, value: &str) -> ExtractionError {
        let line_no = self.line_of(name);
        ExtractionError::NumericParse {
            field: name.to_string(),
            value: value.to_string(),
            line_no: line_no.map(|n| n + 1).unwrap_or(0),
            line: line_no
                .and_then(|n| self.lines.get(&n))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// A decimal number such as a share count or rate.
    pub fn decimal(&self, name: &str) -> Result<Decimal, ExtractionError> {
        let value = self.require(name)?;
        self.locale
            .parse(value)
            .ok_or_else(|| self.numeric_error(name, value))
    }

    pub fn shares(&self, name: &str) -> Result<Decimal, ExtractionError> {
        self.decimal(name)
    }

    /// An amount in minor units.
    pub fn amount(&self, name: &str) -> Result<i64, ExtractionError> {
        let value = self.require(name)?;
        self.locale
            .parse_scaled(value, AMOUNT_SCALE)
            .ok_or_else(|| self.numeric_error(name, value))
    }

    pub fn currency(&self, name: &str) -> Result<CurrencyCode, ExtractionError> {
        let value = self.require(name)?;
        CurrencyCode::new(value).ok_or_else(|| ExtractionError::Validation {
            field: name.to_string(),
            reason: format!("'{}' is not a currency code", value),
        })
    }

    /// Amount and currency captured under two names.
    pub fn money(&self, amount: &str, currency: &str) -> Result<Money, ExtractionError> {
        Ok(Money::of(self.currency(currency)?, self.amount(amount)?))
    }

    pub fn date(&self, name: &str) -> Result<NaiveDate, ExtractionError> {
        let value = self.require(name)?;
        numbers::parse_date(value).ok_or_else(|| ExtractionError::DateParse {
            field: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Date with an optional time captured under `time`.
    pub fn date_time(&self, date: &str, time: &str) -> Result<NaiveDateTime, ExtractionError> {
        let date_value = self.require(date)?;
        let time_value = self.get(time);
        numbers::parse_date_time(date_value, time_value).ok_or_else(|| {
            ExtractionError::DateParse {
                field: date.to_string(),
                value: match time_value {
                    Some(t) => format!("{} {}", date_value, t),
                    None => date_value.to_string(),
                },
            }
        })
    }
}

/// Outcome of evaluating one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Number of section matches delivered.
    Matched(usize),
    /// An optional node did not match.
    Skipped,
}

struct Miss {
    matched: usize,
    reason: Option<ExtractionError>,
}

struct Hit {
    fields: FieldMap,
    lines: Vec<usize>,
}

/// Evaluates field rule trees against a segment's lines.
pub struct FieldRuleEngine<'a> {
    lines: &'a [String],
    offset: usize,
    cursor: usize,
    consumed: Vec<bool>,
    locale: LocaleMode,
}

impl<'a> FieldRuleEngine<'a> {
    /// `offset` is the document line number of `lines[0]`.
    pub fn new(lines: &'a [String], offset: usize, locale: LocaleMode) -> Self {
        Self {
            lines,
            offset,
            cursor: 0,
            consumed: vec![false; lines.len()],
            locale,
        }
    }

    /// Position of the next unread line, relative to the segment.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether a segment line was consumed by an ordered section.
    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed.get(index).copied().unwrap_or(false)
    }

    /// Evaluate nodes in order, delivering each match to `on_match`.
    ///
    /// The first failing required node, or the first error returned by
    /// `on_match`, stops evaluation.
    pub fn run<S, F>(
        &mut self,
        nodes: &[RuleNode<S>],
        ctx: &mut ParsingContext,
        mut on_match: F,
    ) -> Result<(), ExtractionError>
    where
        F: FnMut(&S, FieldMap, &mut ParsingContext) -> Result<(), ExtractionError>,
    {
        for node in nodes {
            self.evaluate(node, ctx, &mut on_match)?;
        }
        Ok(())
    }

    /// Evaluate nodes and collect the matches with their payloads.
    pub fn collect<'r, S>(
        &mut self,
        nodes: &'r [RuleNode<S>],
        ctx: &mut ParsingContext,
    ) -> Result<Vec<(&'r S, FieldMap)>, ExtractionError> {
        let mut matches = Vec::new();
        for node in nodes {
            self.evaluate(node, ctx, &mut |payload: &'r S, fields, _ctx: &mut ParsingContext| {
                matches.push((payload, fields));
                Ok(())
            })?;
        }
        Ok(matches)
    }

    /// Evaluate a single node.
    pub fn evaluate<'r, S, F>(
        &mut self,
        node: &'r RuleNode<S>,
        ctx: &mut ParsingContext,
        on_match: &mut F,
    ) -> Result<NodeOutcome, ExtractionError>
    where
        F: FnMut(&'r S, FieldMap, &mut ParsingContext) -> Result<(), ExtractionError>,
    {
        match node {
            RuleNode::Required(section) => match self.attempt(section, self.start_for(section), ctx) {
                Ok(hit) => {
                    self.deliver(section, hit, ctx, on_match)?;
                    Ok(NodeOutcome::Matched(1))
                }
                Err(miss) => Err(self.mismatch(section, miss)),
            },

            RuleNode::Optional(section) => match self.attempt(section, self.start_for(section), ctx) {
                Ok(hit) => {
                    self.deliver(section, hit, ctx, on_match)?;
                    Ok(NodeOutcome::Matched(1))
                }
                Err(miss) => {
                    trace!(
                        "Optional section {} skipped after {} patterns",
                        section.label(),
                        miss.matched
                    );
                    Ok(NodeOutcome::Skipped)
                }
            },

            RuleNode::OneOf {
                alternatives,
                optional,
            } => {
                let mut details = Vec::new();
                for section in alternatives {
                    match self.attempt(section, self.start_for(section), ctx) {
                        Ok(hit) => {
                            self.deliver(section, hit, ctx, on_match)?;
                            return Ok(NodeOutcome::Matched(1));
                        }
                        Err(miss) => details.push(format!(
                            "{} {}/{}",
                            section.label(),
                            miss.matched,
                            section.patterns().len()
                        )),
                    }
                }
                if *optional {
                    trace!("Optional one-of skipped: {}", details.join(", "));
                    Ok(NodeOutcome::Skipped)
                } else {
                    let (start, end) = self.span();
                    Err(ExtractionError::NoAlternativeMatched {
                        alternatives: alternatives.len(),
                        start,
                        end,
                        details: details.join(", "),
                    })
                }
            }

            RuleNode::Repeat { section, min, max } => {
                let mut found = 0;
                let mut from = self.start_for(section);
                while max.is_none_or(|m| found < m) {
                    let Ok(hit) = self.attempt(section, from, ctx) else {
                        break;
                    };
                    from = hit.lines.last().map(|l| l + 1).unwrap_or(self.lines.len());
                    self.deliver(section, hit, ctx, on_match)?;
                    found += 1;
                }
                if found < *min {
                    return Err(ExtractionError::RepeatTooFew {
                        section: section.label(),
                        found,
                        min: *min,
                    });
                }
                Ok(NodeOutcome::Matched(found))
            }
        }
    }

    fn start_for<S>(&self, section: &Section<S>) -> usize {
        if section.is_detached() { 0 } else { self.cursor }
    }

    /// One-based document line span of the segment.
    fn span(&self) -> (usize, usize) {
        (self.offset + 1, self.offset + self.lines.len())
    }

    fn mismatch<S>(&self, section: &Section<S>, miss: Miss) -> ExtractionError {
        if let Some(reason) = miss.reason {
            return reason;
        }
        let (start, end) = self.span();
        ExtractionError::RequiredFieldMismatch {
            section: section.label(),
            matched: miss.matched,
            expected: section.patterns().len(),
            start,
            end,
        }
    }

    /// Match a section's patterns in order starting at segment line `from`.
    fn attempt<S>(&self, section: &Section<S>, from: usize, ctx: &ParsingContext) -> Result<Hit, Miss> {
        let mut fields = FieldMap::new(section.label(), self.locale);
        let mut matched_lines = Vec::with_capacity(section.patterns().len());
        let mut position = from;

        for (matched, pattern) in section.patterns().iter().enumerate() {
            let found = (position..self.lines.len())
                .filter(|&i| !self.consumed[i])
                .find_map(|i| pattern.captures(&self.lines[i]).map(|caps| (i, caps)));

            let Some((index, captures)) = found else {
                return Err(Miss {
                    matched,
                    reason: None,
                });
            };

            let line_no = self.offset + index;
            for (name, value) in captures {
                fields.capture(&name, &value, line_no, &self.lines[index]);
            }
            matched_lines.push(index);
            position = index + 1;
        }

        let matched = matched_lines.len();
        for key in section.context_attributes() {
            match ctx.get(key) {
                Some(value) => fields.insert(key, value),
                None => {
                    return Err(Miss {
                        matched,
                        reason: Some(ExtractionError::MissingContext(key.clone())),
                    });
                }
            }
        }

        let anchor = self.offset + matched_lines.first().copied().unwrap_or(from);
        for attribute in section.range_attributes() {
            match ctx.range_value(attribute, anchor) {
                Some(value) => fields.insert(attribute, value),
                None => {
                    return Err(Miss {
                        matched,
                        reason: Some(ExtractionError::MissingRange {
                            attribute: attribute.clone(),
                            line_no: anchor + 1,
                        }),
                    });
                }
            }
        }

        Ok(Hit {
            fields,
            lines: matched_lines,
        })
    }

    fn deliver<'r, S, F>(
        &mut self,
        section: &'r Section<S>,
        hit: Hit,
        ctx: &mut ParsingContext,
        on_match: &mut F,
    ) -> Result<(), ExtractionError>
    where
        F: FnMut(&'r S, FieldMap, &mut ParsingContext) -> Result<(), ExtractionError>,
    {
        if !section.is_detached() {
            for &index in &hit.lines {
                self.consumed[index] = true;
            }
            if let Some(&last) = hit.lines.last() {
                self.cursor = last + 1;
            }
        }
        debug!(
            "Section {} matched lines {:?}",
            section.label(),
            hit.lines.iter().map(|i| self.offset + i + 1).collect::<Vec<_>>()
        );
        on_match(section.payload(), hit.fields, ctx)
    }
}
