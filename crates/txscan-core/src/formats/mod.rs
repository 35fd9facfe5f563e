//! Built-in rule tables.
//!
//! Each submodule describes the documents of one institution as a
//! [`Converter`]. The tables are plain data built from the
//! [`crate::extract`] combinators.

pub mod dadat;
pub mod genobroker;

use rust_decimal::Decimal;

use crate::error::{ExtractionError, RuleError};
use crate::extract::{
    step, Converter, DraftMutation, FieldMap, FormatClassifier, MutationStep, Section,
};
use crate::models::money::{CurrencyCode, ExchangeRate};
use crate::models::transaction::{SecurityRef, UnitKind};

/// All built-in converters.
pub fn converters() -> Result<Vec<Converter>, RuleError> {
    Ok(vec![dadat::converter()?, genobroker::converter()?])
}

/// Register every built-in converter.
pub fn register_all(classifier: &mut FormatClassifier) -> Result<(), RuleError> {
    for converter in converters()? {
        classifier.register(converter)?;
    }
    Ok(())
}

/// A classifier with every built-in converter registered.
pub fn default_classifier() -> Result<FormatClassifier, RuleError> {
    let mut classifier = FormatClassifier::new();
    register_all(&mut classifier)?;
    Ok(classifier)
}

/// Detached section attaching a tax or fee captured as `amount` and
/// `currency`.
pub(crate) fn charge(id: &str, kind: UnitKind) -> Section<MutationStep> {
    Section::new(step(move |v, _| {
        Ok(vec![DraftMutation::Charge {
            kind,
            money: v.money("amount", "currency")?,
        }])
    }))
    .id(id)
    .detached()
}

/// Rate where one `base` buys `rate` units of `term`.
pub(crate) fn exchange_rate(
    base: CurrencyCode,
    term: CurrencyCode,
    rate: Decimal,
) -> Result<ExchangeRate, ExtractionError> {
    ExchangeRate::new(base, term, rate).ok_or_else(|| ExtractionError::Validation {
        field: "exchange rate".to_string(),
        reason: format!("{} is not positive", rate),
    })
}

/// Security reference from the captures present in `v`.
pub(crate) fn security_ref(v: &FieldMap, name: String) -> SecurityRef {
    SecurityRef {
        isin: v.get("isin").map(str::to_string),
        wkn: v.get("wkn").map(str::to_string),
        ticker: None,
        name: Some(name),
        currency: v.get("currency").and_then(CurrencyCode::new),
    }
}
