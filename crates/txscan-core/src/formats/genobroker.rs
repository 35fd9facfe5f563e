//! GENO Broker: securities settlements, dividend credits and corporate
//! action deliveries.

use crate::error::RuleError;
use crate::extract::{
    step, Converter, DraftAssembler, DraftMutation, FormatRule, MutationStep, PostProcess,
    Section, SegmentRule,
};
use crate::models::transaction::{
    CashMovementType, DraftKind, TradeType, TransactionDraft, TransferType, UnitKind,
};

use super::{charge, exchange_rate, security_ref};

pub const LABEL: &str = "GENO Broker GmbH";

pub fn converter() -> Result<Converter, RuleError> {
    Ok(Converter::new(LABEL)
        .bank_identifier("GENO Broker GmbH")
        .format(settlement_note()?)
        .format(dividend_credit()?)
        .format(corporate_action()?))
}

fn settlement_note() -> Result<FormatRule, RuleError> {
    let assembler = DraftAssembler::new("trade", |_| TransactionDraft::trade(TradeType::Buy))
        .optional(
            Section::new(step(|v, _| {
                let trade = match v.require("type")? {
                    "Verkauf" => TradeType::Sell,
                    _ => TradeType::Buy,
                };
                Ok(vec![DraftMutation::Kind(DraftKind::Trade(trade))])
            }))
            .id("type")
            .pattern(r"Wertpapier Abrechnung (?<type>Kauf|Verkauf).*"),
        )
        .required(
            Section::new(step(|v, _| {
                let mut name = v.require("name")?.to_string();
                let name1 = v.get("name1").unwrap_or_default();
                if !name1.starts_with("Handels-/Ausführungsplatz") {
                    name = format!("{} {}", name, name1);
                }
                Ok(vec![
                    DraftMutation::Shares(v.shares("shares")?),
                    DraftMutation::Security(security_ref(v, name)),
                ])
            }))
            .id("security")
            .pattern(r"Nominale Wertpapierbezeichnung ISIN \(WKN\)")
            .pattern(
                r"St.ck (?<shares>[.,\d]+) (?<name>.*) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) \((?<wkn>[A-Z0-9]{6})\)",
            )
            .pattern(r"(?<name1>.*)")
            .pattern(r".*Ausf.hrungskurs [.,\d]+ (?<currency>[A-Z]{3}) .*"),
        )
        .required(
            Section::new(step(|v, _| {
                Ok(vec![DraftMutation::Date(v.date_time("date", "time")?)])
            }))
            .id("date")
            .pattern(r"Schlusstag/-Zeit (?<date>\d{2}\.\d{2}\.\d{4}) (?<time>\d{2}:\d{2}).*"),
        )
        .required(
            Section::new(step(|v, _| {
                Ok(vec![DraftMutation::Settlement(v.money("amount", "currency")?)])
            }))
            .id("amount")
            .pattern(r"Ausmachender Betrag (?<amount>[.,\d]+)-? (?<currency>[A-Z]{3}).*"),
        )
        .optional_one_of(vec![
            order_note("order").pattern(r"Auftragsnummer: (?<note>\d+).*"),
            order_note("order reference").pattern(r"Auftragsnummer (?<note>\d+)/[.\d]+ .*"),
        ]);

    Ok(FormatRule::new("Wertpapier Abrechnung")
        .must_include("Wertpapier Abrechnung (Kauf|Verkauf)")
        .segment(
            SegmentRule::new(r".*Kundennummer.*")?.with_end(r"Den Gegenwert buchen wir.*")?,
            with_fees(with_taxes(assembler)),
        ))
}

fn dividend_credit() -> Result<FormatRule, RuleError> {
    let assembler =
        DraftAssembler::new("dividend", |_| TransactionDraft::cash(CashMovementType::Dividend))
            .required(
                Section::new(step(|v, _| {
                    Ok(vec![
                        DraftMutation::Shares(v.shares("shares")?),
                        DraftMutation::Security(security_ref(v, v.require("name")?.to_string())),
                    ])
                }))
                .id("security")
                .pattern(r"St.ck (?<shares>[.,\d]+) +(?<name>.*)")
                .pattern(r"(?<nameContinued>.*)")
                .pattern(r"(?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) +\((?<wkn>[A-Z0-9]{6})\)")
                .pattern(r"Dividende pro St.ck .* (?<currency>[A-Z]{3})"),
            )
            .required(
                Section::new(step(|v, _| {
                    Ok(vec![DraftMutation::Date(v.date_time("date", "time")?)])
                }))
                .id("date")
                .detached()
                .pattern(r"Zahlbarkeitstag +(?<date>\d{2}\.\d{2}\.\d{4}).*"),
            )
            .required(
                Section::new(step(|v, _| {
                    Ok(vec![DraftMutation::Settlement(v.money("amount", "currency")?)])
                }))
                .id("amount")
                .detached()
                .pattern(r"Ausmachender Betrag +(?<amount>[.,\d]+)\+ +(?<currency>[A-Z]{3}).*"),
            )
            .optional(
                Section::new(step(|v, _| {
                    let rate =
                        exchange_rate(v.currency("base")?, v.currency("term")?, v.decimal("rate")?)?;
                    Ok(vec![
                        DraftMutation::ExchangeRate(rate),
                        DraftMutation::GrossValue {
                            amount: v.money("gross", "currency")?,
                            forex: Some(v.money("fxGross", "fxCurrency")?),
                        },
                    ])
                }))
                .id("forex")
                .detached()
                .pattern(r"Devisenkurs +(?<base>[A-Z]{3}) / (?<term>[A-Z]{3}) +(?<rate>[.,\d]+)")
                .pattern(
                    r"Dividendengutschrift +(?<fxGross>[.,\d]+) +(?<fxCurrency>[A-Z]{3}) +(?<gross>[.,\d]+)\+ +(?<currency>[A-Z]{3})",
                ),
            )
            .optional(
                Section::new(step(|v, _| {
                    Ok(vec![DraftMutation::Note(format!(
                        "Abrechnungsnr. {}",
                        v.require("note")?
                    ))])
                }))
                .id("note")
                .detached()
                .pattern(r"Abrechnungsnr\. (?<note>\d+).*"),
            );

    Ok(FormatRule::new("Dividendengutschrift")
        .must_include("Dividendengutschrift")
        .segment(
            SegmentRule::new(r".* Kundenservice .*")?,
            with_taxes(assembler).conclude(PostProcess::FixGrossValue),
        ))
}

/// Deliveries have no cash leg and the documents never name the account
/// currency; GENO Broker accounts are held in euro.
const DELIVERY_CURRENCY: &str = "EUR";

/// Mergers and spin-offs book shares in and out without a cash leg; the
/// ex-date is stated once for the whole document.
fn corporate_action() -> Result<FormatRule, RuleError> {
    let assembler = DraftAssembler::new("delivery", |_| {
        TransactionDraft::transfer(TransferType::Inbound)
    })
    .required(
        Section::new(step(|v, _| {
            let transfer = match v.require("type")? {
                "Ausbuchung" => TransferType::Outbound,
                _ => TransferType::Inbound,
            };
            Ok(vec![DraftMutation::Kind(DraftKind::SecurityTransfer(transfer))])
        }))
        .id("type")
        .pattern(r"(?<type>Einbuchung|Ausbuchung).*"),
    )
    .required(
        Section::new(step(|v, _| {
            Ok(vec![
                DraftMutation::Currency(v.currency("currency")?),
                DraftMutation::Shares(v.shares("shares")?),
                DraftMutation::Security(security_ref(v, v.require("name")?.to_string())),
                DraftMutation::Date(v.date_time("date", "time")?),
            ])
        }))
        .id("security")
        .pattern(
            r"St.ck (?<shares>[.,\d]+)-? (?<name>.*) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) \((?<wkn>[A-Z0-9]{6})\)",
        )
        .context("date")
        .context("currency"),
    );

    Ok(FormatRule::new("Fusion")
        .must_include("Fusion")
        .initializer(|ctx, lines| {
            ctx.put("currency", DELIVERY_CURRENCY);
            if let Some(date) = lines.iter().find_map(|l| l.strip_prefix("Ex-Tag: ")) {
                ctx.put("date", date.trim());
            }
        })
        .segment(SegmentRule::new(r"(Einbuchung|Ausbuchung).*")?, assembler))
}

fn order_note(id: &str) -> Section<MutationStep> {
    Section::new(step(|v, _| {
        Ok(vec![DraftMutation::Note(format!(
            "Auftragsnummer: {}",
            v.require("note")?
        ))])
    }))
    .id(id)
    .detached()
}

fn with_taxes(assembler: DraftAssembler) -> DraftAssembler {
    assembler
        .repeat(
            charge("withholding tax", UnitKind::WithholdingTax).pattern(
                r"Einbehaltene Quellensteuer [.,\d]+ % .* (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*",
            ),
        )
        .repeat(
            charge("capital gains tax", UnitKind::Tax).pattern(
                r"Kapitalertragsteuer [.,\d]+ % .* (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*",
            ),
        )
        .repeat(
            charge("solidarity surcharge", UnitKind::Tax).pattern(
                r"Solidarit.tszuschlag [.,\d]+ % .* (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*",
            ),
        )
        .repeat(
            charge("church tax", UnitKind::Tax).pattern(
                r"Kirchensteuer [.,\d]+ % .* (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*",
            ),
        )
}

fn with_fees(assembler: DraftAssembler) -> DraftAssembler {
    assembler
        .repeat(
            charge("commission", UnitKind::Fee)
                .pattern(r"Provision (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*"),
        )
        .repeat(
            charge("commission rate", UnitKind::Fee)
                .pattern(r"Provision [.,\d]+ % .* (?<amount>[.,\d]+)- *(?<currency>[A-Z]{3}).*"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawDocument;
    use crate::extract::{FormatClassifier, SecurityCatalog};
    use crate::models::money::{CurrencyCode, Money};
    use crate::models::transaction::OutputItem;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn classifier() -> FormatClassifier {
        let mut classifier = FormatClassifier::new();
        classifier.register(converter().unwrap()).unwrap();
        classifier
    }

    fn money(code: &str, amount: i64) -> Money {
        Money::of(CurrencyCode::new(code).unwrap(), amount)
    }

    fn only_committed(items: &[OutputItem]) -> &TransactionDraft {
        assert_eq!(items.len(), 1, "{:?}", items);
        match &items[0] {
            OutputItem::Committed { draft } => draft,
            other => panic!("expected committed, got {:?}", other),
        }
    }

    #[test]
    fn test_buy_settlement() {
        let doc = RawDocument::from_lines(
            "kauf.txt",
            [
                "GENO Broker GmbH",
                "Kundennummer 1234567 Depotnummer 7654321",
                "Wertpapier Abrechnung Kauf",
                "Nominale Wertpapierbezeichnung ISIN (WKN)",
                "Stück 30 Carbios SA Anrechte Aktie FR001400IRI9 (A3EJEH)",
                "Handels-/Ausführungsplatz Tradegate",
                "1Ausführungskurs 30,88 EUR Auftraggeber Mustermann",
                "Schlusstag/-Zeit 30.06.2023 09:57:4 Fällig am 07.07.2023",
                "Kurswert 926,40- EUR",
                "Provision 32,95-EUR",
                "Provision 0,1900 % vom Kurswert 1,76- EUR",
                "Ausmachender Betrag 961,11- EUR",
                "Auftragsnummer: 210796978 Kundenportfolio",
                "Den Gegenwert buchen wir mit Valuta 04.07.2023",
            ],
        );
        let report = classifier().parse(&doc, &SecurityCatalog::new().create_missing(true));

        let draft = only_committed(&report.items);
        assert_eq!(draft.kind, DraftKind::Trade(TradeType::Buy));
        assert_eq!(draft.settlement(), Some(money("EUR", 96_111)));
        assert_eq!(draft.charges(), Some(money("EUR", 3_471)));
        assert_eq!(draft.shares, Some(Decimal::from(30)));
        assert_eq!(draft.note.as_deref(), Some("Auftragsnummer: 210796978"));
        let security = draft.security.as_ref().unwrap();
        assert_eq!(security.name, "Carbios SA Anrechte Aktie");
        assert_eq!(security.wkn.as_deref(), Some("A3EJEH"));
        assert_eq!(draft.date.unwrap().to_string(), "2023-06-30 09:57:00");
    }

    #[test]
    fn test_dividend_with_domestic_taxes() {
        let doc = RawDocument::from_lines(
            "dividende.txt",
            [
                "GENO Broker GmbH",
                "Ihr Kundenservice Telefon 0800 1234567",
                "Dividendengutschrift",
                "Stück 1.000 CROPENERGIES AG",
                "INHABER-AKTIEN O.N.",
                "DE000A0LAUP1 (A0LAUP)",
                "Dividende pro Stück 0,60 EUR",
                "Zahlbarkeitstag 14.07.2023",
                "Abrechnungsnr. 12345678",
                "Kapitalertragsteuer 25 % auf 600,00 EUR 150,00- EUR",
                "Solidaritätszuschlag 5,5 % auf 150,00 EUR 8,25- EUR",
                "Ausmachender Betrag 441,75+ EUR",
            ],
        );
        let report = classifier().parse(&doc, &SecurityCatalog::new().create_missing(true));

        let draft = only_committed(&report.items);
        assert_eq!(draft.settlement(), Some(money("EUR", 44_175)));
        assert_eq!(draft.charges(), Some(money("EUR", 15_825)));
        assert_eq!(draft.shares, Some(Decimal::from(1_000)));
        assert_eq!(draft.note.as_deref(), Some("Abrechnungsnr. 12345678"));
        assert!(draft.unit(UnitKind::GrossValue).is_none());
    }

    #[test]
    fn test_dividend_in_foreign_currency() {
        let doc = RawDocument::from_lines(
            "dividende-cad.txt",
            [
                "GENO Broker GmbH",
                "Ihr Kundenservice Telefon 0800 1234567",
                "Dividendengutschrift",
                "Stück 2.500 BARRICK GOLD CORP.",
                "REGISTERED SHARES O.N.",
                "CA0679011084 (870450)",
                "Dividende pro Stück 5,6532 CAD",
                "Zahlbarkeitstag 15.09.2023",
                "Devisenkurs EUR / CAD 1,4915",
                "Dividendengutschrift 14.133,00 CAD 9.475,70+ EUR",
                "Einbehaltene Quellensteuer 25 % auf 14.133,00 CAD 2.368,93- EUR",
                "Ausmachender Betrag 7.106,77+ EUR",
            ],
        );
        let report = classifier().parse(&doc, &SecurityCatalog::new().create_missing(true));

        let draft = only_committed(&report.items);
        assert_eq!(draft.settlement(), Some(money("EUR", 710_677)));
        assert_eq!(
            draft.unit(UnitKind::WithholdingTax).unwrap().amount,
            money("EUR", 236_893)
        );
        let gross = draft.unit(UnitKind::GrossValue).unwrap();
        assert_eq!(gross.amount, money("EUR", 947_570));
        assert_eq!(gross.forex, Some(money("CAD", 1_413_300)));
        assert_eq!(
            draft.security.as_ref().unwrap().currency,
            CurrencyCode::new("CAD").unwrap()
        );
    }

    #[test]
    fn test_corporate_action_deliveries() {
        let doc = RawDocument::from_lines(
            "fusion.txt",
            [
                "GENO Broker GmbH",
                "Fusion",
                "Ex-Tag: 12.08.2023",
                "Ausbuchung",
                "Stück 50- PDC ENERGY INC. US69327R1014 (A1JZ02)",
                "REGISTERED SHARES DL -,01",
                "Einbuchung",
                "Stück 44,2 CHEVRON CORP. US1667641005 (852552)",
                "REGISTERED SHARES DL-,75",
            ],
        );
        let report = classifier().parse(&doc, &SecurityCatalog::new().create_missing(true));

        assert_eq!(report.count("committed"), 2, "{:?}", report);
        let kinds: Vec<DraftKind> = report
            .items
            .iter()
            .filter_map(|i| i.draft())
            .map(|d| d.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                DraftKind::SecurityTransfer(TransferType::Outbound),
                DraftKind::SecurityTransfer(TransferType::Inbound),
            ]
        );
        let inbound = report.items[1].draft().unwrap();
        assert_eq!(inbound.shares, Some(Decimal::new(442, 1)));
        assert_eq!(inbound.amount(), 0);
        assert_eq!(inbound.currency().map(|c| c.as_str()), Some(DELIVERY_CURRENCY));
        assert_eq!(inbound.date.unwrap().date().to_string(), "2023-08-12");
    }
}
