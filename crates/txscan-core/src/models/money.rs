//! Currency codes, minor-unit amounts and exchange rates.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Number of decimal places stored in a minor-unit amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Decimal places kept when an exchange rate is inverted.
const INVERSE_RATE_SCALE: u32 = 10;

/// ISO 4217 style three letter currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a currency code, normalizing to upper case.
    pub fn new(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount in minor units (hundredths) of a currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub currency: CurrencyCode,
    pub amount: i64,
}

impl Money {
    pub fn of(currency: CurrencyCode, amount: i64) -> Self {
        Self { currency, amount }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self::of(currency, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Sum of two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::of(self.currency.clone(), self.amount.checked_add(other.amount)?))
    }

    /// Difference of two amounts of the same currency.
    pub fn checked_sub(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::of(self.currency.clone(), self.amount.checked_sub(other.amount)?))
    }

    /// Amount in major units.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.amount, AMOUNT_SCALE)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.as_decimal())
    }
}

/// Rounding applied when a converted amount is brought back to minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Ties round away from zero.
    #[default]
    HalfUp,
    /// Ties round towards zero.
    HalfDown,
    /// Ties round to the even neighbour.
    HalfEven,
}

impl RoundingPolicy {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingPolicy::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingPolicy::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingPolicy::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }

    /// Round a fractional minor-unit value to a whole minor unit.
    pub fn round_minor(self, value: Decimal) -> Option<i64> {
        value.round_dp_with_strategy(0, self.strategy()).to_i64()
    }
}

/// Exchange rate where one unit of `base` buys `rate` units of `term`.
///
/// Conversion only runs from base to term. Converting the other way
/// requires an explicit call to [`ExchangeRate::inverse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: CurrencyCode,
    pub term: CurrencyCode,
    pub rate: Decimal,
}

impl ExchangeRate {
    /// Create a rate. Returns `None` for non-positive rates.
    pub fn new(base: CurrencyCode, term: CurrencyCode, rate: Decimal) -> Option<Self> {
        if rate <= Decimal::ZERO {
            return None;
        }
        Some(Self { base, term, rate })
    }

    /// The reciprocal rate converting term into base.
    pub fn inverse(&self) -> ExchangeRate {
        let rate = (Decimal::ONE / self.rate)
            .round_dp_with_strategy(INVERSE_RATE_SCALE, RoundingStrategy::MidpointTowardZero);
        ExchangeRate {
            base: self.term.clone(),
            term: self.base.clone(),
            rate,
        }
    }

    /// Whether the rate relates exactly these two currencies (either way).
    pub fn relates(&self, a: &CurrencyCode, b: &CurrencyCode) -> bool {
        (&self.base == a && &self.term == b) || (&self.base == b && &self.term == a)
    }

    /// A rate converting `from` into `to`, inverting this one when needed.
    pub fn directed(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<ExchangeRate> {
        if &self.base == from && &self.term == to {
            Some(self.clone())
        } else if &self.base == to && &self.term == from {
            Some(self.inverse())
        } else {
            None
        }
    }

    /// Convert an amount in the base currency into the term currency.
    pub fn convert(&self, money: &Money, rounding: RoundingPolicy) -> Option<Money> {
        if money.currency != self.base {
            return None;
        }
        let amount = rounding.round_minor(Decimal::from(money.amount) * self.rate)?;
        Some(Money::of(self.term.clone(), amount))
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.base, self.term, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn cur(code: &str) -> CurrencyCode {
        CurrencyCode::new(code).unwrap()
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(cur("eur").as_str(), "EUR");
        assert!(CurrencyCode::new("EURO").is_none());
        assert!(CurrencyCode::new("E1R").is_none());
    }

    #[test]
    fn test_rounding_policies_differ_on_ties() {
        let tie = Decimal::from_str("12.5").unwrap();
        assert_eq!(RoundingPolicy::HalfUp.round_minor(tie), Some(13));
        assert_eq!(RoundingPolicy::HalfDown.round_minor(tie), Some(12));
        assert_eq!(RoundingPolicy::HalfEven.round_minor(tie), Some(12));
        let tie = Decimal::from_str("13.5").unwrap();
        assert_eq!(RoundingPolicy::HalfEven.round_minor(tie), Some(14));
    }

    #[test]
    fn test_convert_only_base_to_term() {
        let rate = ExchangeRate::new(cur("EUR"), cur("USD"), Decimal::from_str("1.1234").unwrap())
            .unwrap();
        let eur = Money::of(cur("EUR"), 10_000);
        let usd = rate.convert(&eur, RoundingPolicy::HalfUp).unwrap();
        assert_eq!(usd, Money::of(cur("USD"), 11_234));
        assert!(rate.convert(&usd, RoundingPolicy::HalfUp).is_none());
    }

    #[test]
    fn test_round_trip_within_one_minor_unit() {
        let rates = ["1.1234", "0.8571", "1.4915", "149.37", "0.0067"];
        let amounts = [1, 99, 10_726, 1_650, 123_456_789];

        for r in rates {
            let rate =
                ExchangeRate::new(cur("EUR"), cur("USD"), Decimal::from_str(r).unwrap()).unwrap();
            for a in amounts {
                let g = Money::of(cur("EUR"), a);
                let there = rate.convert(&g, RoundingPolicy::HalfUp).unwrap();
                let back = rate.inverse().convert(&there, RoundingPolicy::HalfUp).unwrap();
                assert_eq!(back.currency, g.currency);
                // Rounding there loses half a target unit, worth 0.5/rate source
                // units, and rounding back loses another half; ceil(1/rate) covers both.
                let tolerance = (Decimal::ONE / rate.rate).ceil().to_i64().unwrap().max(1);
                assert!(
                    (back.amount - g.amount).abs() <= tolerance,
                    "{} -> {} -> {} at {}",
                    g,
                    there,
                    back,
                    r
                );
            }
        }
    }

    #[test]
    fn test_directed() {
        let rate = ExchangeRate::new(cur("EUR"), cur("CAD"), Decimal::from_str("1.4915").unwrap())
            .unwrap();
        let d = rate.directed(&cur("CAD"), &cur("EUR")).unwrap();
        assert_eq!(d.base, cur("CAD"));
        assert!(rate.directed(&cur("USD"), &cur("EUR")).is_none());
        assert!(rate.relates(&cur("CAD"), &cur("EUR")));
    }
}
