//! Assembly of transaction drafts from field rule matches.
//!
//! A [`DraftAssembler`] pairs each section of a rule tree with a mutation
//! step. Steps are pure functions from captured fields and the parsing
//! context to a list of [`DraftMutation`]s; the assembler applies them to
//! the occurrence's draft, runs post-processing and finalizes the draft
//! into an [`OutputItem`].

use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::context::ParsingContext;
use crate::currency::CurrencyReconciler;
use crate::error::{ExtractionError, RuleError};
use crate::models::money::{CurrencyCode, ExchangeRate, Money, RoundingPolicy};
use crate::models::transaction::{
    DraftKind, OutputItem, SecurityRef, TransactionDraft, TransferType, UnitKind,
};
use crate::numbers::LocaleMode;

use super::classifier::SecurityLookup;
use super::engine::{FieldMap, FieldRuleEngine};
use super::rule::{validate_nodes, RuleNode, Section};

/// A change requested by a mutation step.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftMutation {
    /// Replace the draft kind, e.g. after reading "Kauf" or "Verkauf".
    Kind(DraftKind),
    /// Resolve and attach a security.
    Security(SecurityRef),
    Shares(Decimal),
    Date(NaiveDateTime),
    /// Settlement currency and amount.
    Settlement(Money),
    /// Settlement currency only.
    Currency(CurrencyCode),
    /// Stated gross value, optionally with its stated equivalent in the
    /// security currency; attaches a gross-value unit when the security
    /// trades in another currency.
    GrossValue { amount: Money, forex: Option<Money> },
    /// Gross value stated only in a foreign currency; converted into the
    /// settlement currency with the context rate.
    ForexGross(Money),
    /// Tax or fee to reconcile against the settlement currency.
    Charge { kind: UnitKind, money: Money },
    /// Record an exchange rate in the parsing context.
    ExchangeRate(ExchangeRate),
    /// Occurrence-scope flag.
    Flag { key: String, value: String },
    Note(String),
    /// Mark the draft as not committable.
    Fail(String),
}

/// Mutation step attached to a section.
pub type MutationStep = Arc<
    dyn Fn(&FieldMap, &ParsingContext) -> Result<Vec<DraftMutation>, ExtractionError> + Send + Sync,
>;

/// Creates the empty draft for one occurrence.
pub type DraftFactory = Arc<dyn Fn(&ParsingContext) -> TransactionDraft + Send + Sync>;

/// Wrap a closure as a [`MutationStep`].
pub fn step<F>(f: F) -> MutationStep
where
    F: Fn(&FieldMap, &ParsingContext) -> Result<Vec<DraftMutation>, ExtractionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Post-processing run once all sections were evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcess {
    /// Re-derive the gross-value unit from settlement amount and charges.
    FixGrossValue,
    /// Compute the settlement amount from the stated gross value.
    SettleFromGross,
}

#[derive(Default)]
struct Occurrence {
    stated_gross: Option<Money>,
    /// Reference waiting for the settlement currency before a new security
    /// can be created.
    pending_security: Option<SecurityRef>,
}

/// Builds one transaction draft per segment occurrence.
pub struct DraftAssembler {
    label: String,
    factory: DraftFactory,
    nodes: Vec<RuleNode<MutationStep>>,
    post: Vec<PostProcess>,
    rounding: Option<RoundingPolicy>,
}

impl DraftAssembler {
    pub fn new<F>(label: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ParsingContext) -> TransactionDraft + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            factory: Arc::new(factory),
            nodes: Vec::new(),
            post: Vec::new(),
            rounding: None,
        }
    }

    /// Add a node to the rule tree.
    pub fn node(mut self, node: RuleNode<MutationStep>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn required(self, section: Section<MutationStep>) -> Self {
        self.node(RuleNode::required(section))
    }

    pub fn optional(self, section: Section<MutationStep>) -> Self {
        self.node(RuleNode::optional(section))
    }

    pub fn one_of(self, alternatives: Vec<Section<MutationStep>>) -> Self {
        self.node(RuleNode::one_of(alternatives))
    }

    pub fn optional_one_of(self, alternatives: Vec<Section<MutationStep>>) -> Self {
        self.node(RuleNode::optional_one_of(alternatives))
    }

    pub fn repeat(self, section: Section<MutationStep>) -> Self {
        self.node(RuleNode::repeat(section))
    }

    pub fn conclude(mut self, post: PostProcess) -> Self {
        self.post.push(post);
        self
    }

    /// Rounding convention of the source format.
    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.rounding = Some(rounding);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn nodes(&self) -> &[RuleNode<MutationStep>] {
        &self.nodes
    }

    pub fn rounding(&self) -> Option<RoundingPolicy> {
        self.rounding
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        validate_nodes(&self.nodes)
    }

    /// Build the draft for one segment occurrence and finalize it.
    ///
    /// `offset` is the document line number of `lines[0]`. An error means
    /// the occurrence produced no item.
    pub fn assemble(
        &self,
        lines: &[String],
        offset: usize,
        ctx: &mut ParsingContext,
        env: &AssemblyEnv<'_>,
    ) -> Result<OutputItem, ExtractionError> {
        let reconciler = CurrencyReconciler::new(self.rounding.unwrap_or(env.default_rounding));
        let mut draft = (self.factory)(ctx);
        draft.source = env.source.map(str::to_string);
        let mut occurrence = Occurrence::default();

        let mut engine = FieldRuleEngine::new(lines, offset, env.locale);
        engine.run(&self.nodes, ctx, |step, fields, ctx| {
            for mutation in step(&fields, ctx)? {
                apply(
                    mutation,
                    &mut draft,
                    &mut occurrence,
                    ctx,
                    &reconciler,
                    env.lookup,
                )?;
            }
            Ok(())
        })?;

        if let Some(reference) = occurrence.pending_security.take() {
            resolve_security(&mut draft, &reference, env.lookup);
        }

        for post in &self.post {
            match post {
                PostProcess::FixGrossValue => {
                    reconciler.fix_gross_value(&mut draft)?;
                }
                PostProcess::SettleFromGross => {
                    let gross = occurrence
                        .stated_gross
                        .as_ref()
                        .ok_or_else(|| ExtractionError::MissingField("gross value".to_string()))?;
                    reconciler.settle_from_gross(&mut draft, gross)?;
                }
            }
        }

        Ok(finalize(draft))
    }
}

impl std::fmt::Debug for DraftAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftAssembler")
            .field("label", &self.label)
            .field("nodes", &self.nodes.len())
            .field("post", &self.post)
            .field("rounding", &self.rounding)
            .finish()
    }
}

/// Document-level settings shared by all occurrences.
#[derive(Clone, Copy)]
pub struct AssemblyEnv<'a> {
    pub locale: LocaleMode,
    pub default_rounding: RoundingPolicy,
    pub lookup: &'a dyn SecurityLookup,
    pub source: Option<&'a str>,
}

fn apply(
    mutation: DraftMutation,
    draft: &mut TransactionDraft,
    occurrence: &mut Occurrence,
    ctx: &mut ParsingContext,
    reconciler: &CurrencyReconciler,
    lookup: &dyn SecurityLookup,
) -> Result<(), ExtractionError> {
    match mutation {
        DraftMutation::Kind(kind) => draft.kind = kind,
        DraftMutation::Security(reference) => {
            if reference.currency.is_none() && draft.currency().is_none() {
                if let Some(security) = lookup.resolve(&reference, None) {
                    draft.security = Some(security);
                } else {
                    occurrence.pending_security = Some(reference);
                }
            } else {
                occurrence.pending_security = None;
                resolve_security(draft, &reference, lookup);
            }
        }
        DraftMutation::Shares(shares) => draft.shares = Some(shares),
        DraftMutation::Date(date) => draft.date = Some(date),
        DraftMutation::Settlement(money) => draft.set_settlement(money)?,
        DraftMutation::Currency(currency) => draft.set_currency(currency)?,
        DraftMutation::GrossValue { amount, forex } => {
            draft.set_currency(amount.currency.clone())?;
            reconciler.apply_gross_value(draft, &amount, forex.as_ref(), ctx)?;
            occurrence.stated_gross = Some(amount);
        }
        DraftMutation::ForexGross(forex) => {
            let amount = reconciler.apply_forex_gross(draft, &forex, ctx)?;
            occurrence.stated_gross = Some(amount);
        }
        DraftMutation::Charge { kind, money } => {
            reconciler.apply_charge(draft, kind, money, ctx)?;
        }
        DraftMutation::ExchangeRate(rate) => {
            debug!("Exchange rate {}", rate);
            ctx.add_exchange_rate(rate);
        }
        DraftMutation::Flag { key, value } => ctx.set_flag(key, value),
        DraftMutation::Note(note) => draft.append_note(&note),
        DraftMutation::Fail(diagnostic) => draft.fail(diagnostic),
    }
    Ok(())
}

fn resolve_security(draft: &mut TransactionDraft, reference: &SecurityRef, lookup: &dyn SecurityLookup) {
    match lookup.resolve(reference, draft.currency()) {
        Some(security) => draft.security = Some(security),
        None => {
            let diagnostic = format!("security not found: {}", reference.describe());
            warn!("{}", diagnostic);
            draft.fail(diagnostic);
        }
    }
}

/// Map a draft to its output item.
///
/// Flagged drafts fail, so no amount is ever dropped without a diagnostic.
/// Drafts without settlement currency, or with a zero amount, carry no
/// postable transaction and are discarded. Security transfers may carry a
/// zero amount.
pub fn finalize(draft: TransactionDraft) -> OutputItem {
    if let Some(diagnostic) = draft.failure.clone() {
        return OutputItem::Failed { draft, diagnostic };
    }
    if draft.currency().is_none() {
        return OutputItem::Discarded {
            reason: format!("{} without settlement currency", draft.kind.label()),
        };
    }
    let transfer = matches!(
        draft.kind,
        DraftKind::SecurityTransfer(TransferType::Inbound | TransferType::Outbound)
    );
    if draft.amount() == 0 && !transfer {
        return OutputItem::Discarded {
            reason: format!("{} with zero amount", draft.kind.label()),
        };
    }
    if draft.kind.requires_security() && draft.security.is_none() {
        let diagnostic = format!("{} without security", draft.kind.label());
        return OutputItem::Failed { draft, diagnostic };
    }
    OutputItem::Committed { draft }
}
