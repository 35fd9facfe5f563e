//! DADAT Bankhaus: trade confirmations, income statements and the
//! monthly account statement.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ExtractionError, RuleError};
use crate::extract::{
    step, Converter, DraftAssembler, DraftMutation, FieldMap, FormatRule, MutationStep,
    PostProcess, Section, SegmentRule,
};
use crate::models::money::{CurrencyCode, Money, RoundingPolicy, AMOUNT_SCALE};
use crate::models::transaction::{
    CashMovementType, DraftKind, TradeType, TransactionDraft, UnitKind,
};
use crate::numbers::parse_date_time;

use super::{charge, exchange_rate, security_ref};

pub const LABEL: &str = "DADAT / Bankhaus Schelhammer & Schattera AG";

lazy_static! {
    /// Lines ending in a currency and a balance; the last one names the
    /// account currency.
    static ref ACCOUNT_CURRENCY: Regex =
        Regex::new(r"^.* (?<currency>[A-Z]{3}) [.,\d]+-?$").unwrap();
}

pub fn converter() -> Result<Converter, RuleError> {
    Ok(Converter::new(LABEL)
        .bank_identifier("DADAT - Bankhaus")
        .bank_identifier("DADAT-Bank")
        .format(trade_confirmation()?)
        .format(income_statement()?)
        .format(account_statement()?))
}

fn trade_confirmation() -> Result<FormatRule, RuleError> {
    let assembler = DraftAssembler::new("trade", |_| TransactionDraft::trade(TradeType::Buy))
        .required(
            Section::new(step(|v, _| {
                let trade = match v.require("type")? {
                    "Verkauf" => TradeType::Sell,
                    _ => TradeType::Buy,
                };
                Ok(vec![DraftMutation::Kind(DraftKind::Trade(trade))])
            }))
            .id("type")
            .pattern(r"(Geschäftsart: )?(?<type>Kauf|Verkauf)"),
        )
        .required(
            titled_security()
                .id("security")
                .pattern(r"Titel: (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) +(?<name>.*)")
                .pattern(r"(?<name1>.*)"),
        )
        .required(
            Section::new(step(|v, _| Ok(vec![DraftMutation::Shares(v.shares("shares")?)])))
                .id("shares")
                .pattern(r"(Zugang|Abgang): (?<shares>[.,\d]+) Stk.*"),
        )
        .optional(
            Section::new(step(|v, _| {
                Ok(vec![DraftMutation::Date(v.date_time("date", "time")?)])
            }))
            .id("date")
            .pattern(
                r"Handelszeit: (?<date>\d{1,2}\.\d{1,2}\.\d{4})( um)? (?<time>\d{1,2}:\d{2}(:\d{2})?).*",
            ),
        )
        .one_of(vec![
            settlement("debit")
                .pattern(r"Zu Lasten .* -(?<amount>[.\d]+(,\d{2})?)(,--)? (?<currency>[A-Z]{3}).*"),
            settlement("credit")
                .pattern(r"Zu Gunsten .* (?<amount>[.\d]+(,\d{2})?)(,--)? (?<currency>[A-Z]{3}).*"),
        ]);

    Ok(FormatRule::new("Kauf/Verkauf")
        .must_include(r"(Kauf|Verkauf)")
        .must_not_include("KONTOAUSZUG")
        .segment(
            SegmentRule::new(r"(Geschäftsart: )?(Kauf|Verkauf)")?,
            with_charges(assembler),
        ))
}

fn income_statement() -> Result<FormatRule, RuleError> {
    let assembler =
        DraftAssembler::new("income", |_| TransactionDraft::cash(CashMovementType::Dividend))
            .with_rounding(RoundingPolicy::HalfDown)
            .required(
                titled_security()
                    .id("security")
                    .pattern(r"(?<shares>[.,\d]+) Stk.*")
                    .pattern(r"Titel: (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) +(?<name>.*)")
                    .pattern(r"(?<name1>.*)")
                    .pattern(r"Dividende: [.,\d]+ (?<currency>[A-Z]{3}).*"),
            )
            .required(
                Section::new(step(|v, _| {
                    Ok(vec![DraftMutation::Date(v.date_time("date", "time")?)])
                }))
                .id("date")
                .pattern(r"Extag: (?<date>\d{1,2}\.\d{1,2}\.\d{4}).*"),
            )
            .optional(
                settlement("credit")
                    .pattern(r"Zu Gunsten .* (?<amount>[.\d]+(,\d{2})?) (?<currency>[A-Z]{3}).*"),
            )
            .optional(
                Section::new(step(|v, _| {
                    let settlement = v.currency("currency")?;
                    let forex = v.money("fxAmount", "fxCurrency")?;
                    let rate = exchange_rate(settlement, forex.currency.clone(), v.decimal("rate")?)?;
                    Ok(vec![
                        DraftMutation::ExchangeRate(rate),
                        DraftMutation::ForexGross(forex),
                    ])
                }))
                .id("forex")
                .detached()
                .pattern(r"ZINSERTRAG: (?<fxAmount>[.,\d]+) (?<fxCurrency>[A-Z]{3}).*")
                .pattern(
                    r"Devisenkurs: (?<rate>[.,\d]+) \(\d{1,2}\.\d{1,2}\.\d{4}\) [.,\d]+ (?<currency>[A-Z]{3}).*",
                ),
            );

    Ok(FormatRule::new("Ertrag")
        .must_include("Geschäftsart: Ertrag")
        .segment(
            SegmentRule::new("Geschäftsart: Ertrag")?,
            with_charges(assembler).conclude(PostProcess::FixGrossValue),
        ))
}

fn account_statement() -> Result<FormatRule, RuleError> {
    let trade = DraftAssembler::new("statement trade", |_| {
        TransactionDraft::trade(TradeType::Buy)
    })
    .with_rounding(RoundingPolicy::HalfDown)
    .required(
        Section::new(step(|v, _| {
            let trade = match v.require("type")? {
                "Verkauf" => TradeType::Sell,
                _ => TradeType::Buy,
            };
            let mut mutations = booking(v, DraftKind::Trade(trade))?;
            let forex = v.currency("currency")?;
            if forex != v.currency("account_currency")? {
                mutations.push(DraftMutation::Flag {
                    key: "forex_amount".to_string(),
                    value: v.require("gross")?.to_string(),
                });
                mutations.push(DraftMutation::Flag {
                    key: "forex_currency".to_string(),
                    value: forex.to_string(),
                });
            }
            Ok(mutations)
        }))
        .id("booking")
        .pattern(
            r"(?<date>\d+\.\d+) (?<type>Kauf aus Dauerauftrag|Kauf|Verkauf) +Depot +\d+/(?<year>\d{4})\d+-\d+ \d+\.\d+ (?<amount>[.,\d]+)-?",
        )
        .pattern(r"ISIN (?<isin>[A-Z0-9]{12}) (?<name>.*) +(?<shares>[.,\d]+) STK")
        .pattern(r".* KURSWERT +-?(?<gross>[.,\d]+) (?<currency>[A-Z]{3})-?")
        .context("account_currency"),
    )
    .optional(
        Section::new(step(|v, ctx| {
            let (Some(amount), Some(currency)) =
                (ctx.flag("forex_amount"), ctx.flag("forex_currency"))
            else {
                return Ok(Vec::new());
            };
            let currency = CurrencyCode::new(currency).ok_or_else(|| {
                ExtractionError::MissingField("forex currency".to_string())
            })?;
            let amount = v
                .locale()
                .parse_scaled(amount, AMOUNT_SCALE)
                .ok_or_else(|| ExtractionError::Validation {
                    field: "forex_amount".to_string(),
                    reason: format!("'{}' is not an amount", amount),
                })?;
            let rate = exchange_rate(v.currency("account_currency")?, currency.clone(), v.decimal("rate")?)?;
            Ok(vec![
                DraftMutation::ExchangeRate(rate),
                DraftMutation::ForexGross(Money::of(currency, amount)),
            ])
        }))
        .id("forex")
        .detached()
        .pattern(r"DevKurs +(?<rate>[.,\d]+)/.*")
        .context("account_currency"),
    )
    .conclude(PostProcess::FixGrossValue);

    let income = DraftAssembler::new("statement income", |_| {
        TransactionDraft::cash(CashMovementType::Dividend)
    })
    .with_rounding(RoundingPolicy::HalfDown)
    .required(
        Section::new(step(|v, _| {
            booking(v, DraftKind::CashMovement(CashMovementType::Dividend))
        }))
        .id("booking")
        .pattern(
            r"(?<date>\d+\.\d+) Ertrag +Depot +\d+/(?<year>\d{4})\d+-\d+ \d+\.\d+ (?<amount>[.,\d]+)-?",
        )
        .pattern(r"ISIN (?<isin>[A-Z0-9]{12}) (?<name>.*) +(?<shares>[.,\d]+) STK")
        .pattern(r".* ZINSERTRAG +-?[.,\d]+ (?<currency>[A-Z]{3})")
        .context("account_currency"),
    );

    Ok(FormatRule::new("Kontoauszug")
        .must_include("KONTOAUSZUG")
        .initializer(|ctx, lines| {
            for line in lines {
                if let Some(caps) = ACCOUNT_CURRENCY.captures(line) {
                    ctx.put("account_currency", &caps["currency"]);
                }
            }
        })
        .segment(
            SegmentRule::new(r"\d+\.\d+ (Kauf aus Dauerauftrag|Kauf|Verkauf) .*")?.with_max_size(5),
            with_charges(trade),
        )
        .segment(
            SegmentRule::new(r"\d+\.\d+ Ertrag .*")?.with_max_size(5),
            with_charges(income),
        ))
}

/// Security from a "Titel:" line and its continuation, which is part of
/// the name unless it already holds the price.
fn titled_security() -> Section<MutationStep> {
    Section::new(step(|v, _| {
        let mut name = v.require("name")?.to_string();
        let name1 = v.get("name1").unwrap_or_default();
        if !name1.is_empty() && !name1.starts_with("Kurs:") && !name1.starts_with("Dividende:") {
            name = format!("{} {}", name, name1);
        }
        let mut mutations = vec![DraftMutation::Security(security_ref(v, name))];
        if v.contains("shares") {
            mutations.push(DraftMutation::Shares(v.shares("shares")?));
        }
        Ok(mutations)
    }))
}

fn settlement(id: &str) -> Section<MutationStep> {
    Section::new(step(|v, _| {
        Ok(vec![DraftMutation::Settlement(v.money("amount", "currency")?)])
    }))
    .id(id)
}

/// Account statement booking: day and month on the first line, the year
/// inside the order reference and the amount in the account currency.
fn booking(v: &FieldMap, kind: DraftKind) -> Result<Vec<DraftMutation>, ExtractionError> {
    let day = format!("{}.{}", v.require("date")?, v.require("year")?);
    let date = parse_date_time(&day, None).ok_or_else(|| ExtractionError::DateParse {
        field: "date".to_string(),
        value: day.clone(),
    })?;
    Ok(vec![
        DraftMutation::Kind(kind),
        DraftMutation::Date(date),
        DraftMutation::Settlement(v.money("amount", "account_currency")?),
        DraftMutation::Shares(v.shares("shares")?),
        DraftMutation::Security(security_ref(v, v.require("name")?.to_string())),
    ])
}

fn with_charges(assembler: DraftAssembler) -> DraftAssembler {
    assembler
        .repeat(
            charge("withholding tax", UnitKind::WithholdingTax)
                .pattern(r"QUELLENSTEUER: -(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("withholding tax rate", UnitKind::WithholdingTax)
                .pattern(r"Quellensteuer [.,\d]+ % (?<currency>[A-Z]{3}) (?<amount>[.,\d]+)"),
        )
        .repeat(
            charge("foreign capital gains tax", UnitKind::Tax)
                .pattern(r"Auslands-KESt: -(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("capital gains tax", UnitKind::Tax)
                .pattern(r".*KEST +-(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("dadat fee", UnitKind::Fee)
                .pattern(r".*DADAT Handelsspesen +-(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("trading fee", UnitKind::Fee)
                .pattern(r"Handelsspesen +-(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("clearing fee", UnitKind::Fee)
                .pattern(r".*Clearing Gebühr +-(?<amount>[.,\d]+) (?<currency>[A-Z]{3}).*"),
        )
}
