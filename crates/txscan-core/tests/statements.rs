use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use txscan_core::formats;
use txscan_core::models::transaction::{TradeType, UnitKind};
use txscan_core::{
    CurrencyCode, DocumentReport, DraftKind, ImportSummary, Money, OutputItem, RawDocument,
    Security, SecurityCatalog,
};

fn eur(amount: i64) -> Money {
    Money::of(CurrencyCode::new("EUR").unwrap(), amount)
}

fn parse(document: &RawDocument, catalog: &SecurityCatalog) -> DocumentReport {
    formats::default_classifier()
        .unwrap()
        .parse(document, catalog)
}

fn bayer_buy() -> RawDocument {
    RawDocument::from_lines(
        "bayer.txt",
        [
            "DADAT - Bankhaus",
            "Kauf",
            "Titel: DE000BAY0017 Bayer AG",
            "Namens-Aktien o.N.",
            "Kurs: 53,47 EUR",
            "Zugang: 2 Stk",
            "Handelszeit: 03.05.2021 13:45:18",
            "Zu Lasten IBAN ... -107,26 EUR",
        ],
    )
}

fn two_dividends() -> RawDocument {
    RawDocument::from_lines(
        "ertraege.txt",
        [
            "DADAT - Bankhaus",
            "Geschäftsart: Ertrag",
            "100 Stk",
            "Titel: US0378331005 Apple Inc.",
            "Registered Shares o.N.",
            "Dividende: 0,22 EUR",
            "Extag: 5.8.2022",
            "Zu Gunsten IBAN AT12 3456 7890 22,00 EUR",
            "Geschäftsart: Ertrag",
            "40 Stk",
            "Titel: FR0000120271 TotalEnergies SE",
            "Actions au Porteur EO 2,50",
            "Dividende: 1,375 EUR",
            "Extag: 19.6.2023",
            "Quellensteuer 30,00 % EUR 16,50",
            "Zu Gunsten IBAN AT12 3456 7890 38,50 EUR",
        ],
    )
}

fn total_energies() -> Security {
    Security {
        isin: Some("FR0000120271".to_string()),
        wkn: None,
        ticker: None,
        name: "TotalEnergies SE".to_string(),
        currency: CurrencyCode::new("EUR").unwrap(),
    }
}

#[test]
fn buy_confirmation_commits_trade() {
    let report = parse(&bayer_buy(), &SecurityCatalog::new().create_missing(true));

    assert_eq!(report.items.len(), 1, "{:?}", report);
    let OutputItem::Committed { draft } = &report.items[0] else {
        panic!("expected committed, got {:?}", report.items[0]);
    };
    assert_eq!(draft.kind, DraftKind::Trade(TradeType::Buy));
    assert_eq!(draft.settlement(), Some(eur(10_726)));
    assert_eq!(draft.shares, Some(Decimal::from(2)));
    let security = draft.security.as_ref().unwrap();
    assert_eq!(security.isin.as_deref(), Some("DE000BAY0017"));
    assert_eq!(security.currency, CurrencyCode::new("EUR").unwrap());
}

#[test]
fn rate_based_withholding_tax_keeps_settlement() {
    let catalog = SecurityCatalog::new().create_missing(true);
    let report = parse(&two_dividends(), &catalog);

    let draft = report
        .committed()
        .filter_map(|i| i.draft())
        .find(|d| d.security.as_ref().map(|s| s.name.starts_with("TotalEnergies")) == Some(true))
        .unwrap();
    assert_eq!(draft.unit(UnitKind::WithholdingTax).unwrap().amount, eur(1_650));
    assert_eq!(draft.settlement(), Some(eur(3_850)));
}

#[test]
fn unresolved_security_fails_only_its_occurrence() {
    let catalog = SecurityCatalog::new().with_security(total_energies());
    let report = parse(&two_dividends(), &catalog);

    assert_eq!(report.items.len(), 2, "{:?}", report);
    match &report.items[0] {
        OutputItem::Failed { diagnostic, .. } => {
            assert!(diagnostic.contains("security not found"), "{}", diagnostic);
            assert!(diagnostic.contains("US0378331005"), "{}", diagnostic);
        }
        other => panic!("expected failed, got {:?}", other),
    }
    let OutputItem::Committed { draft } = &report.items[1] else {
        panic!("expected committed, got {:?}", report.items[1]);
    };
    assert_eq!(draft.security, Some(total_energies()));
}

#[test]
fn charge_in_unconvertible_currency_fails_draft() {
    let document = RawDocument::from_lines(
        "kauf-usd-spesen.txt",
        [
            "DADAT - Bankhaus",
            "Kauf",
            "Titel: DE000BAY0017 Bayer AG",
            "Namens-Aktien o.N.",
            "Zugang: 2 Stk",
            "Handelsspesen -3,66 USD",
            "Zu Lasten IBAN AT12 3456 7890 -110,92 EUR",
        ],
    );
    let report = parse(&document, &SecurityCatalog::new().create_missing(true));

    assert_eq!(report.items.len(), 1, "{:?}", report);
    assert!(report.items[0].is_failed());
}

#[test]
fn parsing_is_deterministic() {
    let catalog = SecurityCatalog::new().create_missing(true);
    let first = parse(&two_dividends(), &catalog);
    let second = parse(&two_dividends(), &catalog);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn import_summary_counts_every_document() {
    let catalog = SecurityCatalog::new().with_security(total_energies());
    let unknown = RawDocument::from_lines("brief.txt", ["Sehr geehrte Kundin", "Mit freundlichen Grüßen"]);

    let reports = vec![
        parse(&bayer_buy(), &catalog),
        parse(&two_dividends(), &catalog),
        parse(&unknown, &catalog),
    ];
    let summary = ImportSummary::from_reports(&reports);

    assert_eq!(summary.documents, 3);
    assert_eq!(summary.unrecognized, 1);
    assert_eq!(summary.committed, 1);
    // Bayer and Apple are unknown to the catalog
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.diagnostics.len(), 3);
    assert!(summary.diagnostics.iter().any(|d| d.starts_with("brief.txt:")));
}
