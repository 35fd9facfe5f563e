//! Transaction drafts produced by the extraction engine.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{CurrencyCode, Money};
use crate::error::ExtractionError;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Buy,
    Sell,
}

/// Single-amount account movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementType {
    Dividend,
    Interest,
    Tax,
    TaxRefund,
    Fee,
    FeeRefund,
    Deposit,
    Removal,
}

/// Delivery of securities without a cash leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Inbound,
    Outbound,
}

/// Shape of a transaction draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "type", rename_all = "snake_case")]
pub enum DraftKind {
    Trade(TradeType),
    CashMovement(CashMovementType),
    SecurityTransfer(TransferType),
}

impl DraftKind {
    /// Whether fees and taxes are paid on top of the gross value.
    ///
    /// For purchases the settlement amount is gross plus charges; for sales
    /// and income it is gross minus charges.
    pub fn charges_added(&self) -> bool {
        matches!(
            self,
            DraftKind::Trade(TradeType::Buy)
                | DraftKind::CashMovement(CashMovementType::Removal)
                | DraftKind::CashMovement(CashMovementType::Fee)
                | DraftKind::CashMovement(CashMovementType::Tax)
                | DraftKind::SecurityTransfer(TransferType::Inbound)
        )
    }

    /// Whether a committed draft of this kind must reference a security.
    pub fn requires_security(&self) -> bool {
        matches!(
            self,
            DraftKind::Trade(_)
                | DraftKind::SecurityTransfer(_)
                | DraftKind::CashMovement(CashMovementType::Dividend)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DraftKind::Trade(TradeType::Buy) => "buy",
            DraftKind::Trade(TradeType::Sell) => "sell",
            DraftKind::CashMovement(CashMovementType::Dividend) => "dividend",
            DraftKind::CashMovement(CashMovementType::Interest) => "interest",
            DraftKind::CashMovement(CashMovementType::Tax) => "tax",
            DraftKind::CashMovement(CashMovementType::TaxRefund) => "tax_refund",
            DraftKind::CashMovement(CashMovementType::Fee) => "fee",
            DraftKind::CashMovement(CashMovementType::FeeRefund) => "fee_refund",
            DraftKind::CashMovement(CashMovementType::Deposit) => "deposit",
            DraftKind::CashMovement(CashMovementType::Removal) => "removal",
            DraftKind::SecurityTransfer(TransferType::Inbound) => "inbound_delivery",
            DraftKind::SecurityTransfer(TransferType::Outbound) => "outbound_delivery",
        }
    }
}

/// Security identification as captured from a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wkn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Trading currency, when the statement states it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<CurrencyCode>,
}

impl SecurityRef {
    /// Whether any identifying attribute was captured.
    pub fn is_empty(&self) -> bool {
        self.isin.is_none() && self.wkn.is_none() && self.ticker.is_none() && self.name.is_none()
    }

    /// Short human readable description for diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(isin) = &self.isin {
            parts.push(format!("ISIN {}", isin));
        }
        if let Some(wkn) = &self.wkn {
            parts.push(format!("WKN {}", wkn));
        }
        if let Some(ticker) = &self.ticker {
            parts.push(format!("ticker {}", ticker));
        }
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if parts.is_empty() {
            "unidentified security".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A security resolved against the caller's domain model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wkn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,

    pub name: String,

    pub currency: CurrencyCode,
}

/// Kind of an auxiliary value unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    GrossValue,
    Tax,
    WithholdingTax,
    Fee,
}

impl UnitKind {
    /// Units that are charged against the gross value.
    pub fn is_charge(&self) -> bool {
        !matches!(self, UnitKind::GrossValue)
    }
}

/// Auxiliary amount attached to a draft, optionally with its forex origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub kind: UnitKind,

    pub amount: Money,

    /// Amount in the original currency when converted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forex: Option<Money>,

    /// Rate converting `forex` into `amount`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<Decimal>,
}

impl Unit {
    pub fn new(kind: UnitKind, amount: Money) -> Self {
        Self {
            kind,
            amount,
            forex: None,
            exchange_rate: None,
        }
    }

    pub fn with_forex(kind: UnitKind, amount: Money, forex: Money, exchange_rate: Decimal) -> Self {
        Self {
            kind,
            amount,
            forex: Some(forex),
            exchange_rate: Some(exchange_rate),
        }
    }
}

/// An in-progress transaction built from one segment occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub kind: DraftKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<CurrencyCode>,

    amount: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<Unit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Source document name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Diagnostic that prevents commitment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TransactionDraft {
    pub fn new(kind: DraftKind) -> Self {
        Self {
            kind,
            security: None,
            shares: None,
            date: None,
            currency: None,
            amount: 0,
            units: Vec::new(),
            note: None,
            source: None,
            failure: None,
        }
    }

    pub fn trade(trade_type: TradeType) -> Self {
        Self::new(DraftKind::Trade(trade_type))
    }

    pub fn cash(movement: CashMovementType) -> Self {
        Self::new(DraftKind::CashMovement(movement))
    }

    pub fn transfer(transfer: TransferType) -> Self {
        Self::new(DraftKind::SecurityTransfer(transfer))
    }

    /// Settlement currency, once set.
    pub fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    /// Settlement amount in minor units.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Settlement amount with its currency.
    pub fn settlement(&self) -> Option<Money> {
        self.currency
            .as_ref()
            .map(|c| Money::of(c.clone(), self.amount))
    }

    /// Set the settlement currency. It cannot change once set.
    pub fn set_currency(&mut self, currency: CurrencyCode) -> Result<(), ExtractionError> {
        match &self.currency {
            Some(existing) if *existing != currency => Err(ExtractionError::Validation {
                field: "currency".to_string(),
                reason: format!(
                    "settlement currency already {}, refusing {}",
                    existing, currency
                ),
            }),
            _ => {
                self.currency = Some(currency);
                Ok(())
            }
        }
    }

    /// Set currency and amount together.
    pub fn set_settlement(&mut self, money: Money) -> Result<(), ExtractionError> {
        self.set_currency(money.currency)?;
        self.amount = money.amount;
        Ok(())
    }

    /// Currency of the referenced security, when resolved.
    pub fn security_currency(&self) -> Option<&CurrencyCode> {
        self.security.as_ref().map(|s| &s.currency)
    }

    pub fn add_unit(&mut self, unit: Unit) {
        self.units.push(unit);
    }

    /// First unit of the given kind.
    pub fn unit(&self, kind: UnitKind) -> Option<&Unit> {
        self.units.iter().find(|u| u.kind == kind)
    }

    /// Remove all units of the given kind.
    pub fn remove_units(&mut self, kind: UnitKind) {
        self.units.retain(|u| u.kind != kind);
    }

    /// Sum of all charge units (fees and taxes) in settlement currency.
    pub fn charges(&self) -> Option<Money> {
        let currency = self.currency.clone()?;
        let mut total = Money::zero(currency);
        for unit in self.units.iter().filter(|u| u.kind.is_charge()) {
            total = total.checked_add(&unit.amount)?;
        }
        Some(total)
    }

    /// Gross value implied by settlement amount and charges.
    pub fn expected_gross(&self) -> Option<Money> {
        let settlement = self.settlement()?;
        let charges = self.charges()?;
        if self.kind.charges_added() {
            settlement.checked_sub(&charges)
        } else {
            settlement.checked_add(&charges)
        }
    }

    /// Append to the note, separated by " | ".
    pub fn append_note(&mut self, note: &str) {
        match &mut self.note {
            Some(existing) if !existing.is_empty() => {
                existing.push_str(" | ");
                existing.push_str(note);
            }
            _ => self.note = Some(note.to_string()),
        }
    }

    /// Flag the draft as not committable. The first diagnostic wins,
    /// later ones are appended.
    pub fn fail(&mut self, diagnostic: impl Into<String>) {
        let diagnostic = diagnostic.into();
        match &mut self.failure {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&diagnostic);
            }
            None => self.failure = Some(diagnostic),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// A finalized draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputItem {
    /// Ready for the caller's domain mapping.
    Committed { draft: TransactionDraft },

    /// The occurrence carries no postable transaction.
    Discarded { reason: String },

    /// The draft cannot be committed; the diagnostic explains why.
    Failed {
        draft: TransactionDraft,
        diagnostic: String,
    },
}

impl OutputItem {
    pub fn is_committed(&self) -> bool {
        matches!(self, OutputItem::Committed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OutputItem::Failed { .. })
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, OutputItem::Discarded { .. })
    }

    /// The underlying draft, unless discarded.
    pub fn draft(&self) -> Option<&TransactionDraft> {
        match self {
            OutputItem::Committed { draft } | OutputItem::Failed { draft, .. } => Some(draft),
            OutputItem::Discarded { .. } => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            OutputItem::Committed { .. } => "committed",
            OutputItem::Discarded { .. } => "discarded",
            OutputItem::Failed { .. } => "failed",
        }
    }
}
