//! Multi-currency reconciliation of gross values, taxes and fees.
//!
//! The rounding policy is a parameter of the reconciler, so every rule table
//! declares the convention of its source format instead of inheriting a
//! global default.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::context::ParsingContext;
use crate::error::ExtractionError;
use crate::models::money::{CurrencyCode, ExchangeRate, Money, RoundingPolicy};
use crate::models::transaction::{TransactionDraft, Unit, UnitKind};

/// Outcome of attaching a tax or fee amount to a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Zero amounts are ignored.
    Skipped,
    /// Attached in the settlement currency.
    Attached,
    /// Converted with a rate from the parsing context and attached.
    Converted,
    /// No rate known; the draft is flagged as failed.
    Unconvertible,
}

/// Converts and attaches monetary units using a declared rounding policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyReconciler {
    rounding: RoundingPolicy,
}

impl CurrencyReconciler {
    pub fn new(rounding: RoundingPolicy) -> Self {
        Self { rounding }
    }

    pub fn rounding(&self) -> RoundingPolicy {
        self.rounding
    }

    /// Convert `money` into `to` following the stored direction of `rate`.
    pub fn convert_with(
        &self,
        money: &Money,
        to: &CurrencyCode,
        rate: &ExchangeRate,
    ) -> Result<Money, ExtractionError> {
        if &money.currency == to {
            return Ok(money.clone());
        }
        rate.directed(&money.currency, to)
            .and_then(|r| r.convert(money, self.rounding))
            .ok_or_else(|| unavailable(&money.currency, to))
    }

    /// Convert `money` into `to` using the latest rate recorded in the context.
    pub fn convert(
        &self,
        money: &Money,
        to: &CurrencyCode,
        ctx: &ParsingContext,
    ) -> Result<Money, ExtractionError> {
        if &money.currency == to {
            return Ok(money.clone());
        }
        let rate = ctx
            .exchange_rate(&money.currency, to)
            .ok_or_else(|| unavailable(&money.currency, to))?;
        self.convert_with(money, to, rate)
    }

    /// Gross-value unit holding `amount` and its equivalent in `security_currency`.
    pub fn gross_value_unit(
        &self,
        amount: &Money,
        rate: &ExchangeRate,
        security_currency: &CurrencyCode,
    ) -> Result<Unit, ExtractionError> {
        let forex = self.convert_with(amount, security_currency, rate)?;
        let back = rate
            .directed(security_currency, &amount.currency)
            .ok_or_else(|| unavailable(security_currency, &amount.currency))?;
        Ok(Unit::with_forex(
            UnitKind::GrossValue,
            amount.clone(),
            forex,
            back.rate,
        ))
    }

    /// Attach a gross-value unit when the draft's security trades in another
    /// currency and the context knows a rate for the pair.
    ///
    /// A stated `forex` amount in the security currency is kept as is,
    /// otherwise it is computed from the rate. Returns whether a unit was
    /// attached.
    pub fn apply_gross_value(
        &self,
        draft: &mut TransactionDraft,
        amount: &Money,
        forex: Option<&Money>,
        ctx: &ParsingContext,
    ) -> Result<bool, ExtractionError> {
        let Some(security_currency) = draft.security_currency().cloned() else {
            return Ok(false);
        };
        if security_currency == amount.currency {
            return Ok(false);
        }
        let Some(rate) = ctx.exchange_rate(&amount.currency, &security_currency) else {
            debug!(
                "No {}/{} rate in context, gross value unit skipped",
                amount.currency, security_currency
            );
            return Ok(false);
        };
        let unit = match forex {
            Some(fx) if fx.currency == security_currency => {
                let back = rate
                    .directed(&security_currency, &amount.currency)
                    .ok_or_else(|| unavailable(&security_currency, &amount.currency))?;
                Unit::with_forex(UnitKind::GrossValue, amount.clone(), fx.clone(), back.rate)
            }
            _ => self.gross_value_unit(amount, rate, &security_currency)?,
        };
        draft.remove_units(UnitKind::GrossValue);
        draft.add_unit(unit);
        Ok(true)
    }

    /// Attach a gross value stated only in a foreign currency, converting it
    /// into the settlement currency with the context rate.
    ///
    /// Returns the converted gross value.
    pub fn apply_forex_gross(
        &self,
        draft: &mut TransactionDraft,
        forex: &Money,
        ctx: &ParsingContext,
    ) -> Result<Money, ExtractionError> {
        let settlement = draft
            .currency()
            .cloned()
            .ok_or_else(|| ExtractionError::MissingField("currency".to_string()))?;
        if forex.currency == settlement {
            return Ok(forex.clone());
        }
        let rate = ctx
            .exchange_rate(&forex.currency, &settlement)
            .ok_or_else(|| unavailable(&forex.currency, &settlement))?;
        let directed = rate
            .directed(&forex.currency, &settlement)
            .ok_or_else(|| unavailable(&forex.currency, &settlement))?;
        let amount = self.convert_with(forex, &settlement, rate)?;
        draft.remove_units(UnitKind::GrossValue);
        draft.add_unit(Unit::with_forex(
            UnitKind::GrossValue,
            amount.clone(),
            forex.clone(),
            directed.rate,
        ));
        Ok(amount)
    }

    /// Attach a tax or fee amount to the draft.
    ///
    /// Amounts in the settlement currency are attached directly. Other
    /// currencies are converted with the rate recorded in the context. When
    /// no rate exists the amount is kept as a note and the draft is flagged,
    /// so it finalizes as a failed item.
    pub fn apply_charge(
        &self,
        draft: &mut TransactionDraft,
        kind: UnitKind,
        money: Money,
        ctx: &ParsingContext,
    ) -> Result<ChargeOutcome, ExtractionError> {
        if !kind.is_charge() {
            return Err(ExtractionError::Validation {
                field: "unit".to_string(),
                reason: format!("{:?} is not a tax or fee", kind),
            });
        }
        if money.is_zero() {
            return Ok(ChargeOutcome::Skipped);
        }

        let Some(settlement) = draft.currency().cloned() else {
            let diagnostic = format!(
                "{:?} of {} found before the settlement currency",
                kind, money
            );
            warn!("{}", diagnostic);
            draft.append_note(&format!("unassigned {:?} {}", kind, money));
            draft.fail(diagnostic);
            return Ok(ChargeOutcome::Unconvertible);
        };

        if money.currency == settlement {
            draft.add_unit(Unit::new(kind, money));
            return Ok(ChargeOutcome::Attached);
        }

        match ctx.exchange_rate(&money.currency, &settlement) {
            Some(rate) => {
                let converted = self.convert_with(&money, &settlement, rate)?;
                let directed = rate
                    .directed(&money.currency, &settlement)
                    .ok_or_else(|| unavailable(&money.currency, &settlement))?;
                debug!("Converted {:?} {} to {}", kind, money, converted);
                draft.add_unit(Unit::with_forex(kind, converted, money, directed.rate));
                Ok(ChargeOutcome::Converted)
            }
            None => {
                let error = unavailable(&money.currency, &settlement);
                warn!("{:?} of {} not attached: {}", kind, money, error);
                draft.append_note(&format!("unconverted {:?} {}", kind, money));
                draft.fail(error.to_string());
                Ok(ChargeOutcome::Unconvertible)
            }
        }
    }

    /// Re-derive the gross-value unit from settlement amount and charges
    /// when the reported unit disagrees with them.
    ///
    /// Returns whether the unit was replaced.
    pub fn fix_gross_value(&self, draft: &mut TransactionDraft) -> Result<bool, ExtractionError> {
        let Some(unit) = draft.unit(UnitKind::GrossValue).cloned() else {
            return Ok(false);
        };
        let Some(expected) = draft.expected_gross() else {
            return Ok(false);
        };
        if expected == unit.amount {
            return Ok(false);
        }

        let replacement = match (&unit.forex, unit.exchange_rate) {
            (Some(forex), Some(rate)) if rate > Decimal::ZERO => {
                let amount = self
                    .rounding
                    .round_minor(Decimal::from(expected.amount) / rate)
                    .ok_or_else(|| ExtractionError::Validation {
                        field: "gross value".to_string(),
                        reason: format!("{} out of range", expected),
                    })?;
                Unit::with_forex(
                    UnitKind::GrossValue,
                    expected.clone(),
                    Money::of(forex.currency.clone(), amount),
                    rate,
                )
            }
            _ => Unit::new(UnitKind::GrossValue, expected.clone()),
        };

        debug!("Gross value {} corrected to {}", unit.amount, expected);
        draft.remove_units(UnitKind::GrossValue);
        draft.add_unit(replacement);
        Ok(true)
    }

    /// Compute the settlement amount from a gross value and the attached charges.
    pub fn settle_from_gross(
        &self,
        draft: &mut TransactionDraft,
        gross: &Money,
    ) -> Result<(), ExtractionError> {
        draft.set_currency(gross.currency.clone())?;
        let charges = draft.charges().ok_or_else(|| ExtractionError::Validation {
            field: "charges".to_string(),
            reason: "charges are not all in the settlement currency".to_string(),
        })?;
        let settlement = if draft.kind.charges_added() {
            gross.checked_add(&charges)
        } else {
            gross.checked_sub(&charges)
        }
        .ok_or_else(|| ExtractionError::Validation {
            field: "amount".to_string(),
            reason: format!("cannot settle {} with charges {}", gross, charges),
        })?;
        draft.set_settlement(settlement)
    }
}

fn unavailable(from: &CurrencyCode, to: &CurrencyCode) -> ExtractionError {
    ExtractionError::CurrencyConversionUnavailable {
        from: from.to_string(),
        to: to.to_string(),
    }
}
