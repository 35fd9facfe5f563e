//! Data models: money, transaction drafts and configuration.

pub mod config;
pub mod money;
pub mod transaction;

pub use money::{CurrencyCode, ExchangeRate, Money, RoundingPolicy, AMOUNT_SCALE};
pub use transaction::{
    CashMovementType, DraftKind, OutputItem, Security, SecurityRef, TradeType, TransactionDraft,
    TransferType, Unit, UnitKind,
};
