//! Purchase invoice service.
//!
//! Invoices are drafted against goods receipt lines and posted exactly once.
//! Posting is the only flow that mutates the cumulative invoiced counters on
//! purchase order and receipt lines; it locks those rows, re-validates every
//! balance against their current state, and accumulates quantities in memory
//! so several invoice lines drawing on the same row compound correctly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{AuditEntry, Auditor};
use crate::auth::OperationContext;
use crate::db::DbPool;
use crate::entities::goods_receipt_lines;
use crate::entities::purchase_invoice_lines;
use crate::entities::purchase_invoices::{self, PurchaseInvoiceStatus};
use crate::entities::purchase_order_lines;
use crate::entities::purchase_orders::{self, PurchaseOrderStatus};
use crate::errors::ServiceError;
use crate::events::accounting::{
    dispatch_best_effort, AccountingEntry, AccountingEventBus, AccountingEventPayload,
    EntryDirection,
};
use crate::events::{Event, EventSender};
use crate::rounding::{
    exceeds_available, remaining, round_cost, round_money, round_quantity, QTY_EPSILON,
};
use crate::services::numbering;
use crate::state_machine::{NoHooks, StateDocument, StateMachineEngine};

#[derive(Clone, Debug)]
pub struct PurchaseInvoiceLineInput {
    pub purchase_order_line_id: Uuid,
    pub goods_receipt_line_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Clone, Debug)]
pub struct CreatePurchaseInvoice {
    pub purchase_order_id: Uuid,
    pub invoice_date: Option<DateTime<Utc>>,
    /// Overrides the purchase order's exchange rate when set.
    pub exchange_rate: Option<Decimal>,
    pub lines: Vec<PurchaseInvoiceLineInput>,
}

#[derive(Clone, Debug)]
pub struct UpdatePurchaseInvoice {
    pub invoice_date: Option<DateTime<Utc>>,
    pub exchange_rate: Option<Decimal>,
    pub lines: Vec<PurchaseInvoiceLineInput>,
}

#[derive(Clone, Debug)]
pub struct PurchaseInvoiceAggregate {
    pub invoice: purchase_invoices::Model,
    pub lines: Vec<purchase_invoice_lines::Model>,
}

/// A fully derived invoice line, ready to persist or to apply to counters.
#[derive(Clone, Debug)]
struct PreparedLine {
    purchase_order_line_id: Uuid,
    goods_receipt_line_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
    quantity_base: Decimal,
    unit_price: Decimal,
    tax_amount: Decimal,
    line_total: Decimal,
    line_total_base: Decimal,
    tax_amount_base: Decimal,
    grn_value_base: Decimal,
    ppv_amount: Decimal,
}

#[derive(Clone)]
pub struct PurchaseInvoiceService {
    db: Arc<DbPool>,
    engine: StateMachineEngine,
    auditor: Arc<Auditor>,
    accounting: Arc<dyn AccountingEventBus>,
    event_sender: Option<EventSender>,
    enforce_maker_checker: bool,
}

impl PurchaseInvoiceService {
    pub fn new(
        db: Arc<DbPool>,
        engine: StateMachineEngine,
        auditor: Arc<Auditor>,
        accounting: Arc<dyn AccountingEventBus>,
        event_sender: Option<EventSender>,
        enforce_maker_checker: bool,
    ) -> Self {
        Self {
            db,
            engine,
            auditor,
            accounting,
            event_sender,
            enforce_maker_checker,
        }
    }

    /// Drafts an invoice against a receivable purchase order.
    ///
    /// Every line is validated against the remaining balance of both its
    /// goods receipt line and its purchase order line; no counters are
    /// mutated until [`post`](Self::post).
    #[instrument(skip(self, input, ctx), fields(purchase_order_id = %input.purchase_order_id))]
    pub async fn create(
        &self,
        input: CreatePurchaseInvoice,
        ctx: &OperationContext,
    ) -> Result<PurchaseInvoiceAggregate, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "an invoice requires at least one line".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = load_order(&txn, input.purchase_order_id).await?;
        assert_invoiceable(&order)?;

        let exchange_rate = input.exchange_rate.unwrap_or(order.exchange_rate);
        if exchange_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "exchange rate must be positive".into(),
            ));
        }

        let (po_lines, grn_lines) = load_referenced_lines(&txn, &input.lines, false).await?;
        let prepared = prepare_lines(&input.lines, &po_lines, &grn_lines, exchange_rate)?;

        let now = Utc::now();
        let series = numbering::series_prefix(
            numbering::PURCHASE_INVOICE_PREFIX,
            order.company_id,
            order.branch_id,
            now,
        );
        let latest = purchase_invoices::Entity::find()
            .filter(purchase_invoices::Column::BranchId.eq(order.branch_id))
            .filter(purchase_invoices::Column::InvoiceNumber.starts_with(&series))
            .order_by_desc(purchase_invoices::Column::InvoiceNumber)
            .one(&txn)
            .await?;
        let invoice_number =
            numbering::next_in_series(&series, latest.as_ref().map(|m| m.invoice_number.as_str()));

        let totals = Totals::from_lines(&prepared);
        let invoice_id = Uuid::new_v4();
        let invoice = purchase_invoices::ActiveModel {
            id: Set(invoice_id),
            invoice_number: Set(invoice_number.clone()),
            purchase_order_id: Set(order.id),
            company_id: Set(order.company_id),
            branch_id: Set(order.branch_id),
            supplier_id: Set(order.supplier_id),
            currency_code: Set(order.currency_code.clone()),
            exchange_rate: Set(exchange_rate),
            status: Set(PurchaseInvoiceStatus::Draft),
            invoice_date: Set(input.invoice_date.unwrap_or(now)),
            subtotal: Set(totals.subtotal),
            tax_total: Set(totals.tax_total),
            total_amount: Set(totals.total_amount),
            grn_value_base: Set(totals.grn_value_base),
            ppv_amount: Set(totals.ppv_amount),
            posted_at: Set(None),
            posted_by: Set(None),
            created_by: Set(ctx.actor.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let lines = insert_lines(&txn, invoice_id, &prepared, now).await?;

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("created", purchase_invoices::Model::ENTITY_TYPE, invoice_id)
                    .states(
                        json!(null),
                        json!({
                            "invoice_number": invoice_number,
                            "total_amount": totals.total_amount,
                        }),
                    ),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseInvoiceCreated(invoice_id))
                .await;
        }
        info!("Purchase invoice {} drafted", invoice.invoice_number);

        Ok(PurchaseInvoiceAggregate { invoice, lines })
    }

    /// Rewrites a draft invoice's lines and header figures.
    #[instrument(skip(self, input, ctx), fields(invoice_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdatePurchaseInvoice,
        ctx: &OperationContext,
    ) -> Result<PurchaseInvoiceAggregate, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "an invoice requires at least one line".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let invoice = load_invoice(&txn, id).await?;
        assert_invoice_draft(&invoice)?;
        let order = load_order(&txn, invoice.purchase_order_id).await?;

        let exchange_rate = input.exchange_rate.unwrap_or(order.exchange_rate);
        if exchange_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "exchange rate must be positive".into(),
            ));
        }

        let (po_lines, grn_lines) = load_referenced_lines(&txn, &input.lines, false).await?;
        let prepared = prepare_lines(&input.lines, &po_lines, &grn_lines, exchange_rate)?;

        purchase_invoice_lines::Entity::delete_many()
            .filter(purchase_invoice_lines::Column::PurchaseInvoiceId.eq(id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let totals = Totals::from_lines(&prepared);
        let before_total = invoice.total_amount;
        let mut active: purchase_invoices::ActiveModel = invoice.into();
        if let Some(invoice_date) = input.invoice_date {
            active.invoice_date = Set(invoice_date);
        }
        active.exchange_rate = Set(exchange_rate);
        active.subtotal = Set(totals.subtotal);
        active.tax_total = Set(totals.tax_total);
        active.total_amount = Set(totals.total_amount);
        active.grn_value_base = Set(totals.grn_value_base);
        active.ppv_amount = Set(totals.ppv_amount);
        active.updated_at = Set(now);
        let invoice = active.update(&txn).await?;

        let lines = insert_lines(&txn, id, &prepared, now).await?;

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("updated", purchase_invoices::Model::ENTITY_TYPE, id)
                    .states(
                        json!({ "total_amount": before_total }),
                        json!({ "total_amount": totals.total_amount }),
                    )
                    .changed(json!(["lines", "total_amount"])),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseInvoiceUpdated(id)).await;
        }

        Ok(PurchaseInvoiceAggregate { invoice, lines })
    }

    /// Deletes a draft invoice. Posted invoices are immutable.
    #[instrument(skip(self, ctx), fields(invoice_id = %id))]
    pub async fn delete(&self, id: Uuid, ctx: &OperationContext) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let invoice = load_invoice(&txn, id).await?;
        assert_invoice_draft(&invoice)?;

        purchase_invoice_lines::Entity::delete_many()
            .filter(purchase_invoice_lines::Column::PurchaseInvoiceId.eq(id))
            .exec(&txn)
            .await?;
        purchase_invoices::Entity::delete_by_id(id).exec(&txn).await?;

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("deleted", purchase_invoices::Model::ENTITY_TYPE, id).states(
                    json!({ "invoice_number": invoice.invoice_number }),
                    json!(null),
                ),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseInvoiceDeleted(id)).await;
        }
        Ok(())
    }

    /// Posts a draft invoice.
    ///
    /// Locks every referenced purchase order and goods receipt line, then
    /// re-derives each invoice line and re-checks its balance against the
    /// locked row state: a concurrent posting may have consumed the balance
    /// since the draft was written, and the second committer must fail with a
    /// balance error rather than overdraw. On success the invoiced counters
    /// are accumulated, the invoice transitions to `Posted`, the parent order
    /// is closed when its receiving is fully consumed, and an accounting
    /// event goes out best-effort after commit.
    #[instrument(skip(self, ctx), fields(invoice_id = %id, actor = %ctx.actor.id))]
    pub async fn post(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<PurchaseInvoiceAggregate, ServiceError> {
        let ctx = ctx.clone().with_maker_checker(self.enforce_maker_checker);

        let txn = self.db.begin().await?;
        // The invoice row lock comes first: the draft check must run against
        // the committed status, not a snapshot a concurrent poster already
        // moved past.
        let invoice = purchase_invoices::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase invoice {id} not found")))?;
        assert_invoice_draft(&invoice)?;
        let order = load_order(&txn, invoice.purchase_order_id).await?;

        let stored_lines = purchase_invoice_lines::Entity::find()
            .filter(purchase_invoice_lines::Column::PurchaseInvoiceId.eq(id))
            .order_by_asc(purchase_invoice_lines::Column::CreatedAt)
            .all(&txn)
            .await?;
        if stored_lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "an invoice requires at least one line".into(),
            ));
        }

        let inputs: Vec<PurchaseInvoiceLineInput> = stored_lines
            .iter()
            .map(|l| {
                let grn_line_id = l.goods_receipt_line_id.ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "invoice line {} has no goods receipt line",
                        l.id
                    ))
                })?;
                Ok(PurchaseInvoiceLineInput {
                    purchase_order_line_id: l.purchase_order_line_id,
                    goods_receipt_line_id: grn_line_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    tax_amount: l.tax_amount,
                })
            })
            .collect::<Result<_, ServiceError>>()?;

        // Locked once for the whole batch; every line re-validates and
        // accumulates against these maps so lines sharing a row compound.
        let (mut po_lines, mut grn_lines) = load_referenced_lines(&txn, &inputs, true).await?;
        let po_before = po_lines.clone();
        let grn_before = grn_lines.clone();

        let mut prepared = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let po_line = po_lines
                .get(&input.purchase_order_line_id)
                .ok_or_else(|| line_not_found("purchase order", input.purchase_order_line_id))?;
            let grn_line = grn_lines
                .get(&input.goods_receipt_line_id)
                .ok_or_else(|| line_not_found("goods receipt", input.goods_receipt_line_id))?;

            let line = prepare_line(input, po_line, grn_line, invoice.exchange_rate)?;
            apply_to_counters(
                &line,
                po_lines.get_mut(&line.purchase_order_line_id).unwrap(),
                grn_lines.get_mut(&line.goods_receipt_line_id).unwrap(),
            );
            prepared.push(line);
        }

        let now = Utc::now();
        self.persist_counter_updates(&txn, &ctx, &po_before, &po_lines, &grn_before, &grn_lines)
            .await?;

        // Rewrite each stored line with the values derived at posting time.
        for (stored, line) in stored_lines.iter().zip(&prepared) {
            let mut active: purchase_invoice_lines::ActiveModel = stored.clone().into();
            active.quantity = Set(line.quantity);
            active.quantity_base = Set(line.quantity_base);
            active.unit_price = Set(line.unit_price);
            active.tax_amount = Set(line.tax_amount);
            active.line_total = Set(line.line_total);
            active.line_total_base = Set(line.line_total_base);
            active.grn_value_base = Set(line.grn_value_base);
            active.ppv_amount = Set(line.ppv_amount);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let totals = Totals::from_lines(&prepared);
        let mut active: purchase_invoices::ActiveModel = invoice.clone().into();
        active.subtotal = Set(totals.subtotal);
        active.tax_total = Set(totals.tax_total);
        active.total_amount = Set(totals.total_amount);
        active.grn_value_base = Set(totals.grn_value_base);
        active.ppv_amount = Set(totals.ppv_amount);
        active.posted_at = Set(Some(now));
        active.posted_by = Set(Some(ctx.actor.id));
        active.updated_at = Set(now);
        let invoice = active.update(&txn).await?;

        let invoice = self
            .engine
            .transition_to(&txn, &invoice, PurchaseInvoiceStatus::Posted, &ctx, &NoHooks)
            .await?;

        self.close_order_if_consumed(&txn, &order, &ctx).await?;

        txn.commit().await?;

        dispatch_best_effort(
            self.accounting.as_ref(),
            posting_payload(&invoice, &totals, &ctx),
        )
        .await;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseInvoicePosted {
                    invoice_id: invoice.id,
                    purchase_order_id: invoice.purchase_order_id,
                    total_amount: invoice.total_amount,
                    ppv_amount: invoice.ppv_amount,
                })
                .await;
        }
        info!(
            "Purchase invoice {} posted, PPV {}",
            invoice.invoice_number, invoice.ppv_amount
        );

        let lines = purchase_invoice_lines::Entity::find()
            .filter(purchase_invoice_lines::Column::PurchaseInvoiceId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(PurchaseInvoiceAggregate { invoice, lines })
    }

    /// Loads an invoice with its lines.
    pub async fn get(&self, id: Uuid) -> Result<Option<PurchaseInvoiceAggregate>, ServiceError> {
        let Some(invoice) = purchase_invoices::Entity::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };
        let lines = purchase_invoice_lines::Entity::find()
            .filter(purchase_invoice_lines::Column::PurchaseInvoiceId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(Some(PurchaseInvoiceAggregate { invoice, lines }))
    }

    /// Persists the accumulated invoiced counters and records one audit row
    /// per mutated line with its before/after counter values.
    async fn persist_counter_updates(
        &self,
        txn: &DatabaseTransaction,
        ctx: &OperationContext,
        po_before: &HashMap<Uuid, purchase_order_lines::Model>,
        po_lines: &HashMap<Uuid, purchase_order_lines::Model>,
        grn_before: &HashMap<Uuid, goods_receipt_lines::Model>,
        grn_lines: &HashMap<Uuid, goods_receipt_lines::Model>,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        for (id, model) in po_lines {
            let mut active: purchase_order_lines::ActiveModel = model.clone().into();
            active.quantity_invoiced = Set(model.quantity_invoiced);
            active.quantity_invoiced_base = Set(model.quantity_invoiced_base);
            active.amount_invoiced = Set(model.amount_invoiced);
            active.updated_at = Set(now);
            active.update(txn).await?;

            if let Some(before) = po_before.get(id) {
                self.auditor
                    .record(
                        txn,
                        ctx,
                        AuditEntry::new("invoiced", "purchase_order_line", *id)
                            .states(
                                json!({
                                    "quantity_invoiced": before.quantity_invoiced,
                                    "quantity_invoiced_base": before.quantity_invoiced_base,
                                    "amount_invoiced": before.amount_invoiced,
                                }),
                                json!({
                                    "quantity_invoiced": model.quantity_invoiced,
                                    "quantity_invoiced_base": model.quantity_invoiced_base,
                                    "amount_invoiced": model.amount_invoiced,
                                }),
                            )
                            .changed(json!([
                                "quantity_invoiced",
                                "quantity_invoiced_base",
                                "amount_invoiced"
                            ])),
                    )
                    .await?;
            }
        }
        for (id, model) in grn_lines {
            let mut active: goods_receipt_lines::ActiveModel = model.clone().into();
            active.quantity_invoiced = Set(model.quantity_invoiced);
            active.quantity_invoiced_base = Set(model.quantity_invoiced_base);
            active.amount_invoiced = Set(model.amount_invoiced);
            active.updated_at = Set(now);
            active.update(txn).await?;

            if let Some(before) = grn_before.get(id) {
                self.auditor
                    .record(
                        txn,
                        ctx,
                        AuditEntry::new("invoiced", "goods_receipt_line", *id)
                            .states(
                                json!({
                                    "quantity_invoiced": before.quantity_invoiced,
                                    "quantity_invoiced_base": before.quantity_invoiced_base,
                                    "amount_invoiced": before.amount_invoiced,
                                }),
                                json!({
                                    "quantity_invoiced": model.quantity_invoiced,
                                    "quantity_invoiced_base": model.quantity_invoiced_base,
                                    "amount_invoiced": model.amount_invoiced,
                                }),
                            )
                            .changed(json!([
                                "quantity_invoiced",
                                "quantity_invoiced_base",
                                "amount_invoiced"
                            ])),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Closes the order when every line's post-return received quantity is
    /// fully invoiced.
    async fn close_order_if_consumed(
        &self,
        txn: &DatabaseTransaction,
        order: &purchase_orders::Model,
        ctx: &OperationContext,
    ) -> Result<(), ServiceError> {
        if !matches!(
            order.status,
            PurchaseOrderStatus::PartiallyReceived | PurchaseOrderStatus::Received
        ) {
            return Ok(());
        }

        let lines = purchase_order_lines::Entity::find()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(order.id))
            .all(txn)
            .await?;
        let consumed = lines.iter().all(|l| {
            (l.quantity_received - l.quantity_returned) - l.quantity_invoiced <= QTY_EPSILON
        });
        if consumed {
            self.engine
                .transition_to(txn, order, PurchaseOrderStatus::Closed, ctx, &NoHooks)
                .await?;
        }
        Ok(())
    }
}

struct Totals {
    subtotal: Decimal,
    tax_total: Decimal,
    total_amount: Decimal,
    total_amount_base: Decimal,
    grn_value_base: Decimal,
    ppv_amount: Decimal,
}

impl Totals {
    fn from_lines(lines: &[PreparedLine]) -> Self {
        let subtotal = round_money(lines.iter().map(|l| l.line_total).sum());
        let tax_total = round_money(lines.iter().map(|l| l.tax_amount).sum());
        let total_amount_base = round_money(
            lines
                .iter()
                .map(|l| l.line_total_base + l.tax_amount_base)
                .sum(),
        );
        Self {
            subtotal,
            tax_total,
            total_amount: round_money(subtotal + tax_total),
            total_amount_base,
            grn_value_base: round_cost(lines.iter().map(|l| l.grn_value_base).sum()),
            ppv_amount: round_money(lines.iter().map(|l| l.ppv_amount).sum()),
        }
    }
}

async fn load_order(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> Result<purchase_orders::Model, ServiceError> {
    purchase_orders::Entity::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {id} not found")))
}

async fn load_invoice(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> Result<purchase_invoices::Model, ServiceError> {
    purchase_invoices::Entity::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase invoice {id} not found")))
}

fn line_not_found(kind: &str, id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("{kind} line {id} not found"))
}

fn assert_invoiceable(order: &purchase_orders::Model) -> Result<(), ServiceError> {
    match order.status {
        PurchaseOrderStatus::PartiallyReceived
        | PurchaseOrderStatus::Received
        | PurchaseOrderStatus::Closed => Ok(()),
        other => Err(ServiceError::InvalidStatus(format!(
            "purchase order {} is {}, not invoiceable",
            order.order_number, other
        ))),
    }
}

fn assert_invoice_draft(invoice: &purchase_invoices::Model) -> Result<(), ServiceError> {
    if invoice.status != PurchaseInvoiceStatus::Draft {
        return Err(ServiceError::InvalidStatus(format!(
            "purchase invoice {} is {}, expected Draft",
            invoice.invoice_number, invoice.status
        )));
    }
    Ok(())
}

/// Fetches the distinct purchase order and goods receipt lines referenced by
/// `inputs`, keyed by id. With `for_update` the rows are read under exclusive
/// row locks, once for the whole batch.
async fn load_referenced_lines(
    txn: &DatabaseTransaction,
    inputs: &[PurchaseInvoiceLineInput],
    for_update: bool,
) -> Result<
    (
        HashMap<Uuid, purchase_order_lines::Model>,
        HashMap<Uuid, goods_receipt_lines::Model>,
    ),
    ServiceError,
> {
    let mut po_ids: Vec<Uuid> = inputs.iter().map(|l| l.purchase_order_line_id).collect();
    po_ids.sort_unstable();
    po_ids.dedup();
    let mut grn_ids: Vec<Uuid> = inputs.iter().map(|l| l.goods_receipt_line_id).collect();
    grn_ids.sort_unstable();
    grn_ids.dedup();

    let mut po_query = purchase_order_lines::Entity::find()
        .filter(purchase_order_lines::Column::Id.is_in(po_ids.clone()));
    let mut grn_query = goods_receipt_lines::Entity::find()
        .filter(goods_receipt_lines::Column::Id.is_in(grn_ids.clone()));
    if for_update {
        po_query = po_query.lock_exclusive();
        grn_query = grn_query.lock_exclusive();
    }

    let po_lines: HashMap<Uuid, _> = po_query
        .all(txn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();
    let grn_lines: HashMap<Uuid, _> = grn_query
        .all(txn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    for id in &po_ids {
        if !po_lines.contains_key(id) {
            return Err(line_not_found("purchase order", *id));
        }
    }
    for id in &grn_ids {
        if !grn_lines.contains_key(id) {
            return Err(line_not_found("goods receipt", *id));
        }
    }
    Ok((po_lines, grn_lines))
}

fn prepare_lines(
    inputs: &[PurchaseInvoiceLineInput],
    po_lines: &HashMap<Uuid, purchase_order_lines::Model>,
    grn_lines: &HashMap<Uuid, goods_receipt_lines::Model>,
    exchange_rate: Decimal,
) -> Result<Vec<PreparedLine>, ServiceError> {
    // Draft validation runs against row snapshots, so lines drawing on the
    // same receipt line must compound here too.
    let mut po_lines = po_lines.clone();
    let mut grn_lines = grn_lines.clone();

    let mut prepared = Vec::with_capacity(inputs.len());
    for input in inputs {
        let po_line = po_lines
            .get(&input.purchase_order_line_id)
            .ok_or_else(|| line_not_found("purchase order", input.purchase_order_line_id))?;
        let grn_line = grn_lines
            .get(&input.goods_receipt_line_id)
            .ok_or_else(|| line_not_found("goods receipt", input.goods_receipt_line_id))?;

        let line = prepare_line(input, po_line, grn_line, exchange_rate)?;
        apply_to_counters(
            &line,
            po_lines.get_mut(&line.purchase_order_line_id).unwrap(),
            grn_lines.get_mut(&line.goods_receipt_line_id).unwrap(),
        );
        prepared.push(line);
    }
    Ok(prepared)
}

/// Validates one invoice line against the current balances of its receipt and
/// order lines and derives its monetary fields.
fn prepare_line(
    input: &PurchaseInvoiceLineInput,
    po_line: &purchase_order_lines::Model,
    grn_line: &goods_receipt_lines::Model,
    exchange_rate: Decimal,
) -> Result<PreparedLine, ServiceError> {
    if input.quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "invoice line quantity must be positive".into(),
        ));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "invoice line unit price must not be negative".into(),
        ));
    }
    if grn_line.purchase_order_line_id != po_line.id {
        return Err(ServiceError::ValidationError(format!(
            "goods receipt line {} does not belong to purchase order line {}",
            grn_line.id, po_line.id
        )));
    }

    let quantity = round_quantity(input.quantity);

    // The receipt line bounds against one physical receipt; the order line
    // bounds against the order as a whole, which may be fed by several
    // receipts. Both must hold.
    let grn_available = remaining(
        grn_line.quantity,
        grn_line.quantity_invoiced + grn_line.quantity_returned,
    );
    if exceeds_available(quantity, grn_available) {
        return Err(ServiceError::BalanceExceeded(format!(
            "goods receipt line {}: requested {} exceeds remaining {}",
            grn_line.id, quantity, grn_available
        )));
    }
    let po_available = remaining(
        po_line.quantity_received - po_line.quantity_returned,
        po_line.quantity_invoiced,
    );
    if exceeds_available(quantity, po_available) {
        return Err(ServiceError::BalanceExceeded(format!(
            "purchase order line {}: requested {} exceeds remaining {}",
            po_line.id, quantity, po_available
        )));
    }

    // Base quantity follows the receipt's own conversion ratio; a degenerate
    // receipt falls back to the order line's ratio.
    let ratio = if grn_line.quantity > Decimal::ZERO {
        grn_line.quantity_base / grn_line.quantity
    } else if po_line.quantity > Decimal::ZERO {
        po_line.quantity_base / po_line.quantity
    } else {
        Decimal::ONE
    };
    let quantity_base = round_quantity(quantity * ratio);

    let line_total = round_money(quantity * input.unit_price);
    let line_total_base = round_cost(line_total * exchange_rate);
    let tax_amount = round_money(input.tax_amount);
    let tax_amount_base = round_cost(tax_amount * exchange_rate);
    let grn_value_base = round_cost(quantity_base * grn_line.unit_cost_base);
    let ppv_amount = round_money(line_total_base + tax_amount_base - grn_value_base);

    Ok(PreparedLine {
        purchase_order_line_id: po_line.id,
        goods_receipt_line_id: grn_line.id,
        product_id: grn_line.product_id,
        quantity,
        quantity_base,
        unit_price: input.unit_price,
        tax_amount,
        line_total,
        line_total_base,
        tax_amount_base,
        grn_value_base,
        ppv_amount,
    })
}

/// Accumulates one prepared line's invoiced quantities onto the in-memory
/// copies of its order and receipt lines.
fn apply_to_counters(
    line: &PreparedLine,
    po_line: &mut purchase_order_lines::Model,
    grn_line: &mut goods_receipt_lines::Model,
) {
    po_line.quantity_invoiced = round_quantity(po_line.quantity_invoiced + line.quantity);
    po_line.quantity_invoiced_base =
        round_quantity(po_line.quantity_invoiced_base + line.quantity_base);
    po_line.amount_invoiced = round_money(po_line.amount_invoiced + line.line_total);

    grn_line.quantity_invoiced = round_quantity(grn_line.quantity_invoiced + line.quantity);
    grn_line.quantity_invoiced_base =
        round_quantity(grn_line.quantity_invoiced_base + line.quantity_base);
    grn_line.amount_invoiced = round_money(grn_line.amount_invoiced + line.line_total);
}

async fn insert_lines(
    txn: &DatabaseTransaction,
    invoice_id: Uuid,
    prepared: &[PreparedLine],
    now: DateTime<Utc>,
) -> Result<Vec<purchase_invoice_lines::Model>, ServiceError> {
    let mut inserted = Vec::with_capacity(prepared.len());
    for line in prepared {
        let model = purchase_invoice_lines::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_invoice_id: Set(invoice_id),
            purchase_order_line_id: Set(line.purchase_order_line_id),
            goods_receipt_line_id: Set(Some(line.goods_receipt_line_id)),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            quantity_base: Set(line.quantity_base),
            unit_price: Set(line.unit_price),
            tax_amount: Set(line.tax_amount),
            line_total: Set(line.line_total),
            line_total_base: Set(line.line_total_base),
            grn_value_base: Set(line.grn_value_base),
            ppv_amount: Set(line.ppv_amount),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;
        inserted.push(model);
    }
    Ok(inserted)
}

/// Journal legs for a posted invoice: receipt value clears GRNI, the variance
/// goes to the PPV account, and the full invoiced value credits the supplier.
fn posting_payload(
    invoice: &purchase_invoices::Model,
    totals: &Totals,
    ctx: &OperationContext,
) -> AccountingEventPayload {
    let mut lines = vec![AccountingEntry {
        role: "grni".into(),
        direction: EntryDirection::Debit,
        amount: round_money(totals.grn_value_base),
    }];
    if totals.ppv_amount != Decimal::ZERO {
        lines.push(AccountingEntry {
            role: "ppv".into(),
            direction: if totals.ppv_amount > Decimal::ZERO {
                EntryDirection::Debit
            } else {
                EntryDirection::Credit
            },
            amount: totals.ppv_amount.abs(),
        });
    }
    lines.push(AccountingEntry {
        role: "ap".into(),
        direction: EntryDirection::Credit,
        amount: totals.total_amount_base,
    });

    AccountingEventPayload {
        event_code: "purchase_invoice.posted".into(),
        company_id: invoice.company_id,
        branch_id: invoice.branch_id,
        document_type: purchase_invoices::Model::ENTITY_TYPE.into(),
        document_id: invoice.id,
        document_number: invoice.invoice_number.clone(),
        currency_code: invoice.currency_code.clone(),
        exchange_rate: invoice.exchange_rate,
        occurred_at: invoice.posted_at.unwrap_or_else(Utc::now),
        actor_id: ctx.actor.id,
        meta: ctx.meta.clone(),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn po_line(quantity: Decimal, received: Decimal, invoiced: Decimal) -> purchase_order_lines::Model {
        purchase_order_lines::Model {
            id: Uuid::new_v4(),
            purchase_order_id: Uuid::new_v4(),
            line_num: 1,
            product_id: Uuid::new_v4(),
            uom_id: Uuid::new_v4(),
            base_uom_id: Uuid::new_v4(),
            quantity,
            quantity_base: quantity,
            unit_price: dec!(10),
            line_total: round_money(quantity * dec!(10)),
            quantity_received: received,
            quantity_received_base: received,
            quantity_invoiced: invoiced,
            quantity_invoiced_base: invoiced,
            quantity_returned: Decimal::ZERO,
            quantity_returned_base: Decimal::ZERO,
            amount_invoiced: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn grn_line(
        po_line: &purchase_order_lines::Model,
        quantity: Decimal,
        invoiced: Decimal,
        unit_cost_base: Decimal,
    ) -> goods_receipt_lines::Model {
        goods_receipt_lines::Model {
            id: Uuid::new_v4(),
            goods_receipt_id: Uuid::new_v4(),
            purchase_order_line_id: po_line.id,
            product_id: po_line.product_id,
            quantity,
            quantity_base: quantity,
            unit_cost: unit_cost_base,
            unit_cost_base,
            quantity_invoiced: invoiced,
            quantity_invoiced_base: invoiced,
            quantity_returned: Decimal::ZERO,
            quantity_returned_base: Decimal::ZERO,
            amount_invoiced: Decimal::ZERO,
            amount_returned: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derives_ppv_for_a_standard_line() {
        let po = po_line(dec!(100), dec!(100), Decimal::ZERO);
        let grn = grn_line(&po, dec!(100), Decimal::ZERO, dec!(10.000000));
        let input = PurchaseInvoiceLineInput {
            purchase_order_line_id: po.id,
            goods_receipt_line_id: grn.id,
            quantity: dec!(40),
            unit_price: dec!(12),
            tax_amount: dec!(4.4),
        };

        let line = prepare_line(&input, &po, &grn, dec!(1)).unwrap();
        assert_eq!(line.line_total, dec!(480.00));
        assert_eq!(line.grn_value_base, dec!(400.000000));
        assert_eq!(line.ppv_amount, dec!(84.40));
    }

    #[test]
    fn rejects_quantity_beyond_receipt_balance() {
        let po = po_line(dec!(100), dec!(100), dec!(40));
        let grn = grn_line(&po, dec!(100), dec!(40), dec!(10));
        let input = PurchaseInvoiceLineInput {
            purchase_order_line_id: po.id,
            goods_receipt_line_id: grn.id,
            quantity: dec!(70),
            unit_price: dec!(12),
            tax_amount: Decimal::ZERO,
        };

        let err = prepare_line(&input, &po, &grn, dec!(1)).unwrap_err();
        assert!(matches!(err, ServiceError::BalanceExceeded(_)));
    }

    #[test]
    fn tolerates_epsilon_overshoot() {
        let po = po_line(dec!(10), dec!(10), Decimal::ZERO);
        let grn = grn_line(&po, dec!(10), Decimal::ZERO, dec!(10));
        let input = PurchaseInvoiceLineInput {
            purchase_order_line_id: po.id,
            goods_receipt_line_id: grn.id,
            quantity: dec!(10.0004),
            unit_price: dec!(1),
            tax_amount: Decimal::ZERO,
        };

        assert!(prepare_line(&input, &po, &grn, dec!(1)).is_ok());
    }

    #[test]
    fn rejects_receipt_line_of_another_order_line() {
        let po = po_line(dec!(10), dec!(10), Decimal::ZERO);
        let other = po_line(dec!(10), dec!(10), Decimal::ZERO);
        let grn = grn_line(&other, dec!(10), Decimal::ZERO, dec!(10));
        let input = PurchaseInvoiceLineInput {
            purchase_order_line_id: po.id,
            goods_receipt_line_id: grn.id,
            quantity: dec!(1),
            unit_price: dec!(1),
            tax_amount: Decimal::ZERO,
        };

        let err = prepare_line(&input, &po, &grn, dec!(1)).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn draft_preparation_compounds_lines_on_one_receipt_line() {
        let po = po_line(dec!(100), dec!(100), Decimal::ZERO);
        let grn = grn_line(&po, dec!(100), Decimal::ZERO, dec!(10));
        let po_map: HashMap<_, _> = [(po.id, po.clone())].into();
        let grn_map: HashMap<_, _> = [(grn.id, grn.clone())].into();

        let line = |quantity| PurchaseInvoiceLineInput {
            purchase_order_line_id: po.id,
            goods_receipt_line_id: grn.id,
            quantity,
            unit_price: dec!(1),
            tax_amount: Decimal::ZERO,
        };

        // 60 + 50 exceeds the 100 on the receipt even though each line alone
        // would fit.
        let err = prepare_lines(
            &[line(dec!(60)), line(dec!(50))],
            &po_map,
            &grn_map,
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::BalanceExceeded(_)));

        let ok = prepare_lines(
            &[line(dec!(60)), line(dec!(40))],
            &po_map,
            &grn_map,
            dec!(1),
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn negative_ppv_credits_the_variance_account() {
        let invoice = purchase_invoices::Model {
            id: Uuid::new_v4(),
            invoice_number: "PI.01001.26.0001".into(),
            purchase_order_id: Uuid::new_v4(),
            company_id: 1,
            branch_id: 1,
            supplier_id: Uuid::new_v4(),
            currency_code: "USD".into(),
            exchange_rate: dec!(1),
            status: PurchaseInvoiceStatus::Posted,
            invoice_date: Utc::now(),
            subtotal: dec!(90),
            tax_total: Decimal::ZERO,
            total_amount: dec!(90),
            grn_value_base: dec!(100),
            ppv_amount: dec!(-10),
            posted_at: Some(Utc::now()),
            posted_by: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let totals = Totals {
            subtotal: dec!(90),
            tax_total: Decimal::ZERO,
            total_amount: dec!(90),
            total_amount_base: dec!(90),
            grn_value_base: dec!(100),
            ppv_amount: dec!(-10),
        };
        let ctx = OperationContext::new(crate::auth::Actor::system());

        let payload = posting_payload(&invoice, &totals, &ctx);
        let ppv = payload.lines.iter().find(|l| l.role == "ppv").unwrap();
        assert_eq!(ppv.direction, EntryDirection::Credit);
        assert_eq!(ppv.amount, dec!(10));
    }
}
