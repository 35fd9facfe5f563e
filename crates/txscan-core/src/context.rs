//! Per-document parsing context shared by all rules of one classified document.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};

use crate::models::money::{CurrencyCode, ExchangeRate};

/// Values captured by a context range together with the lines they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    pub start: usize,
    pub end: usize,
    pub values: BTreeMap<String, String>,
}

/// Mutable store for one document parse.
///
/// Holds three scopes:
/// - document values and typed objects, living as long as the document;
/// - occurrence flags, cleared at the start of every segment occurrence;
/// - context ranges, attribute maps valid for a span of lines.
#[derive(Default)]
pub struct ParsingContext {
    values: BTreeMap<String, String>,
    types: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    flags: BTreeMap<String, String>,
    ranges: Vec<RangeEntry>,
    rates: Vec<ExchangeRate>,
}

impl std::fmt::Debug for ParsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsingContext")
            .field("values", &self.values)
            .field("types", &self.types.len())
            .field("flags", &self.flags)
            .field("ranges", &self.ranges)
            .field("rates", &self.rates)
            .finish()
    }
}

impl ParsingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything; the classifier calls this before each format rule
    /// parses a document.
    pub fn clear(&mut self) {
        self.values.clear();
        self.types.clear();
        self.flags.clear();
        self.ranges.clear();
        self.rates.clear();
    }

    /// Start a new segment occurrence: clear flags and the named document keys.
    pub fn begin_occurrence(&mut self, reset_keys: &[String]) {
        self.flags.clear();
        for key in reset_keys {
            self.values.remove(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Store a typed helper object, replacing one of the same type.
    pub fn put_type<T: Any + Send + Sync>(&mut self, value: T) {
        self.types.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_type<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.types
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove_type<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.types
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Set an occurrence-scoped flag.
    pub fn set_flag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.flags.insert(key.into(), value.into());
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    /// Record an exchange rate seen in this document.
    pub fn add_exchange_rate(&mut self, rate: ExchangeRate) {
        self.rates.push(rate);
    }

    /// Most recently recorded rate relating the two currencies.
    pub fn exchange_rate(&self, a: &CurrencyCode, b: &CurrencyCode) -> Option<&ExchangeRate> {
        self.rates.iter().rev().find(|r| r.relates(a, b))
    }

    pub fn exchange_rates(&self) -> &[ExchangeRate] {
        &self.rates
    }

    pub(crate) fn set_ranges(&mut self, ranges: Vec<RangeEntry>) {
        self.ranges = ranges;
    }

    /// Value of `attribute` from the first context range covering `line_no`.
    pub fn range_value(&self, attribute: &str, line_no: usize) -> Option<&str> {
        self.ranges
            .iter()
            .filter(|r| line_no >= r.start && line_no <= r.end)
            .find_map(|r| r.values.get(attribute))
            .map(String::as_str)
    }
}
