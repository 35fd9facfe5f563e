//! Core library for bank statement conversion.
//!
//! This crate provides:
//! - Segment scanning over line-oriented statement text
//! - Declarative field rules (required, optional, one-of, repeat)
//! - Draft assembly with multi-currency reconciliation of taxes and fees
//! - Format classification and rule tables for built-in institutions

pub mod context;
pub mod currency;
pub mod document;
pub mod error;
pub mod extract;
pub mod formats;
pub mod models;
pub mod numbers;

pub use context::ParsingContext;
pub use currency::{ChargeOutcome, CurrencyReconciler};
pub use document::RawDocument;
pub use error::{ExtractionError, Result, RuleError, ScanError};
pub use extract::{
    Converter, DocumentReport, DraftAssembler, DraftMutation, FieldMap, FieldRuleEngine,
    FormatClassifier, FormatRule, ImportSummary, RuleNode, Section, SecurityCatalog,
    SecurityLookup, Segment, SegmentRule,
};
pub use models::config::TxscanConfig;
pub use models::money::{CurrencyCode, ExchangeRate, Money, RoundingPolicy};
pub use models::transaction::{DraftKind, OutputItem, Security, SecurityRef, TransactionDraft};
pub use numbers::{LocaleMode, NumberLocale};
