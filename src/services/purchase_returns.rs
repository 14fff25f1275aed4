//! Purchase return service.
//!
//! Returns are raised against a posted goods receipt and have no user-visible
//! draft stage: one transaction validates the returnable balances, inserts
//! the return, locks and reverses the receipt and order counters, issues the
//! stock, and posts the document.

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
use crate::entities::goods_receipts::{self, GoodsReceiptStatus};
use crate::entities::purchase_order_lines;
use crate::entities::purchase_return_lines;
use crate::entities::purchase_returns::{self, PurchaseReturnStatus};
use crate::errors::ServiceError;
use crate::events::accounting::{
    dispatch_best_effort, AccountingEntry, AccountingEventBus, AccountingEventPayload,
    EntryDirection,
};
use crate::events::{Event, EventSender};
use crate::rounding::{exceeds_available, remaining, round_cost, round_money, round_quantity};
use crate::services::inventory::{
    InventoryService, IssueLine, IssueRequest, ValuationMethod,
};
use crate::services::purchase_orders::PurchaseOrderService;
use crate::services::numbering;
use crate::state_machine::{NoHooks, StateDocument, StateMachineEngine};

#[derive(Clone, Debug)]
pub struct PurchaseReturnLineInput {
    pub goods_receipt_line_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Clone, Debug)]
pub struct CreatePurchaseReturn {
    pub goods_receipt_id: Uuid,
    pub return_date: Option<DateTime<Utc>>,
    /// Location the returned stock is issued out of.
    pub location_id: Uuid,
    pub valuation_method: ValuationMethod,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseReturnLineInput>,
}

#[derive(Clone, Debug)]
pub struct PurchaseReturnAggregate {
    pub purchase_return: purchase_returns::Model,
    pub lines: Vec<purchase_return_lines::Model>,
}

#[derive(Clone, Debug)]
struct PreparedReturnLine {
    goods_receipt_line_id: Uuid,
    purchase_order_line_id: Uuid,
    product_id: Uuid,
    base_uom_id: Uuid,
    quantity: Decimal,
    quantity_base: Decimal,
    unit_cost_base: Decimal,
    line_total: Decimal,
    line_total_base: Decimal,
}

#[derive(Clone)]
pub struct PurchaseReturnService {
    db: Arc<DbPool>,
    engine: StateMachineEngine,
    auditor: Arc<Auditor>,
    orders: PurchaseOrderService,
    inventory: Arc<dyn InventoryService>,
    accounting: Arc<dyn AccountingEventBus>,
    event_sender: Option<EventSender>,
    enforce_maker_checker: bool,
}

impl PurchaseReturnService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        engine: StateMachineEngine,
        auditor: Arc<Auditor>,
        orders: PurchaseOrderService,
        inventory: Arc<dyn InventoryService>,
        accounting: Arc<dyn AccountingEventBus>,
        event_sender: Option<EventSender>,
        enforce_maker_checker: bool,
    ) -> Self {
        Self {
            db,
            engine,
            auditor,
            orders,
            inventory,
            accounting,
            event_sender,
            enforce_maker_checker,
        }
    }

    /// Creates and posts a purchase return in one transaction.
    ///
    /// Each line is bounded by its receipt line's remaining balance
    /// (`quantity - quantity_invoiced - quantity_returned`). Posting reverses
    /// the order line's received quantity (floored at zero), records the
    /// returned quantity on both rows, issues the stock through the inventory
    /// boundary, and re-derives the receipt status of every affected order.
    #[instrument(skip(self, input, ctx), fields(goods_receipt_id = %input.goods_receipt_id, actor = %ctx.actor.id))]
    pub async fn create(
        &self,
        input: CreatePurchaseReturn,
        ctx: &OperationContext,
    ) -> Result<PurchaseReturnAggregate, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "a return requires at least one line".into(),
            ));
        }
        let ctx = ctx.clone().with_maker_checker(self.enforce_maker_checker);

        let txn = self.db.begin().await?;
        let receipt = goods_receipts::Entity::find_by_id(input.goods_receipt_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Goods receipt {} not found",
                    input.goods_receipt_id
                ))
            })?;
        assert_returnable(&receipt)?;

        // Both posting flows must take the order line locks before the
        // receipt line locks, or a concurrent invoice posting and return
        // could deadlock. The referenced order lines are discovered through
        // an unlocked read first; a receipt line's order line reference is
        // immutable, so the discovery cannot go stale.
        let discovered = fetch_receipt_lines(&txn, &receipt, &input.lines, false).await?;
        let mut po_lines = lock_order_lines(&txn, &discovered).await?;
        let mut grn_lines = fetch_receipt_lines(&txn, &receipt, &input.lines, true).await?;
        let po_before = po_lines.clone();
        let grn_before = grn_lines.clone();

        let mut prepared = Vec::with_capacity(input.lines.len());
        for line_input in &input.lines {
            let grn_line = grn_lines
                .get(&line_input.goods_receipt_line_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "goods receipt line {} not found on receipt {}",
                        line_input.goods_receipt_line_id, receipt.receipt_number
                    ))
                })?;
            let po_line = po_lines
                .get(&grn_line.purchase_order_line_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "purchase order line {} not found",
                        grn_line.purchase_order_line_id
                    ))
                })?;

            let line = prepare_return_line(line_input, grn_line, po_line)?;
            apply_return_to_counters(
                &line,
                grn_lines.get_mut(&line.goods_receipt_line_id).unwrap(),
                po_lines.get_mut(&line.purchase_order_line_id).unwrap(),
            );
            prepared.push(line);
        }

        let now = Utc::now();
        let return_date = input.return_date.unwrap_or(now);
        let series = numbering::series_prefix(
            numbering::PURCHASE_RETURN_PREFIX,
            receipt.company_id,
            receipt.branch_id,
            now,
        );
        let latest = purchase_returns::Entity::find()
            .filter(purchase_returns::Column::BranchId.eq(receipt.branch_id))
            .filter(purchase_returns::Column::ReturnNumber.starts_with(&series))
            .order_by_desc(purchase_returns::Column::ReturnNumber)
            .one(&txn)
            .await?;
        let return_number =
            numbering::next_in_series(&series, latest.as_ref().map(|m| m.return_number.as_str()));

        let total_amount = round_money(prepared.iter().map(|l| l.line_total).sum());
        let total_amount_base = round_cost(prepared.iter().map(|l| l.line_total_base).sum());

        let return_id = Uuid::new_v4();
        let purchase_return = purchase_returns::ActiveModel {
            id: Set(return_id),
            return_number: Set(return_number.clone()),
            goods_receipt_id: Set(receipt.id),
            company_id: Set(receipt.company_id),
            branch_id: Set(receipt.branch_id),
            supplier_id: Set(receipt.supplier_id),
            currency_code: Set(receipt.currency_code.clone()),
            exchange_rate: Set(receipt.exchange_rate),
            status: Set(PurchaseReturnStatus::Draft),
            return_date: Set(return_date),
            total_amount: Set(total_amount),
            total_amount_base: Set(total_amount_base),
            inventory_transaction_id: Set(None),
            notes: Set(input.notes.clone()),
            created_by: Set(ctx.actor.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(prepared.len());
        for line in &prepared {
            let model = purchase_return_lines::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_return_id: Set(return_id),
                goods_receipt_line_id: Set(line.goods_receipt_line_id),
                purchase_order_line_id: Set(line.purchase_order_line_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                quantity_base: Set(line.quantity_base),
                unit_cost_base: Set(line.unit_cost_base),
                line_total: Set(line.line_total),
                line_total_base: Set(line.line_total_base),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            lines.push(model);
        }

        self.persist_return_counters(&txn, &ctx, &grn_before, &grn_lines, &po_before, &po_lines)
            .await?;

        // Stock leaves the warehouse inside the same transaction; an issue
        // failure aborts the whole return.
        let issue = self
            .inventory
            .issue(IssueRequest {
                date: return_date,
                location_id: input.location_id,
                lines: prepared
                    .iter()
                    .map(|l| IssueLine {
                        variant_id: l.product_id,
                        uom_id: l.base_uom_id,
                        quantity_base: l.quantity_base,
                    })
                    .collect(),
                source_type: purchase_returns::Model::ENTITY_TYPE.into(),
                source_id: return_id,
                notes: input.notes,
                valuation_method: input.valuation_method,
            })
            .await?;

        let mut active: purchase_returns::ActiveModel = purchase_return.into();
        active.inventory_transaction_id = Set(Some(issue.transaction_id));
        active.updated_at = Set(Utc::now());
        let purchase_return = active.update(&txn).await?;

        let purchase_return = self
            .engine
            .transition_to(
                &txn,
                &purchase_return,
                PurchaseReturnStatus::Posted,
                &ctx,
                &NoHooks,
            )
            .await?;

        self.auditor
            .record(
                &txn,
                &ctx,
                AuditEntry::new("created", purchase_returns::Model::ENTITY_TYPE, return_id)
                    .states(
                        json!(null),
                        json!({
                            "return_number": return_number,
                            "total_amount_base": total_amount_base,
                        }),
                    ),
            )
            .await?;

        // A return can reopen receiving on every affected order.
        let mut order_ids: Vec<Uuid> =
            po_lines.values().map(|l| l.purchase_order_id).collect();
        order_ids.sort_unstable();
        order_ids.dedup();
        for order_id in order_ids {
            self.orders.sync_receipt_status(&txn, order_id, &ctx).await?;
        }

        txn.commit().await?;

        dispatch_best_effort(
            self.accounting.as_ref(),
            return_payload(&purchase_return, &ctx),
        )
        .await;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseReturnPosted {
                    return_id: purchase_return.id,
                    goods_receipt_id: purchase_return.goods_receipt_id,
                    total_amount_base: purchase_return.total_amount_base,
                })
                .await;
        }
        info!("Purchase return {} posted", purchase_return.return_number);

        Ok(PurchaseReturnAggregate {
            purchase_return,
            lines,
        })
    }

    /// Persists the reversed counters and records one audit row per mutated
    /// line with its before/after counter values.
    async fn persist_return_counters(
        &self,
        txn: &DatabaseTransaction,
        ctx: &OperationContext,
        grn_before: &HashMap<Uuid, goods_receipt_lines::Model>,
        grn_lines: &HashMap<Uuid, goods_receipt_lines::Model>,
        po_before: &HashMap<Uuid, purchase_order_lines::Model>,
        po_lines: &HashMap<Uuid, purchase_order_lines::Model>,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        for (id, model) in grn_lines {
            let mut active: goods_receipt_lines::ActiveModel = model.clone().into();
            active.quantity_returned = Set(model.quantity_returned);
            active.quantity_returned_base = Set(model.quantity_returned_base);
            active.amount_returned = Set(model.amount_returned);
            active.updated_at = Set(now);
            active.update(txn).await?;

            if let Some(before) = grn_before.get(id) {
                self.auditor
                    .record(
                        txn,
                        ctx,
                        AuditEntry::new("returned", "goods_receipt_line", *id)
                            .states(
                                json!({
                                    "quantity_returned": before.quantity_returned,
                                    "quantity_returned_base": before.quantity_returned_base,
                                    "amount_returned": before.amount_returned,
                                }),
                                json!({
                                    "quantity_returned": model.quantity_returned,
                                    "quantity_returned_base": model.quantity_returned_base,
                                    "amount_returned": model.amount_returned,
                                }),
                            )
                            .changed(json!([
                                "quantity_returned",
                                "quantity_returned_base",
                                "amount_returned"
                            ])),
                    )
                    .await?;
            }
        }
        for (id, model) in po_lines {
            let mut active: purchase_order_lines::ActiveModel = model.clone().into();
            active.quantity_received = Set(model.quantity_received);
            active.quantity_received_base = Set(model.quantity_received_base);
            active.quantity_returned = Set(model.quantity_returned);
            active.quantity_returned_base = Set(model.quantity_returned_base);
            active.updated_at = Set(now);
            active.update(txn).await?;

            if let Some(before) = po_before.get(id) {
                self.auditor
                    .record(
                        txn,
                        ctx,
                        AuditEntry::new("returned", "purchase_order_line", *id)
                            .states(
                                json!({
                                    "quantity_received": before.quantity_received,
                                    "quantity_received_base": before.quantity_received_base,
                                    "quantity_returned": before.quantity_returned,
                                    "quantity_returned_base": before.quantity_returned_base,
                                }),
                                json!({
                                    "quantity_received": model.quantity_received,
                                    "quantity_received_base": model.quantity_received_base,
                                    "quantity_returned": model.quantity_returned,
                                    "quantity_returned_base": model.quantity_returned_base,
                                }),
                            )
                            .changed(json!([
                                "quantity_received",
                                "quantity_received_base",
                                "quantity_returned",
                                "quantity_returned_base"
                            ])),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Loads a return with its lines.
    pub async fn get(&self, id: Uuid) -> Result<Option<PurchaseReturnAggregate>, ServiceError> {
        let Some(purchase_return) =
            purchase_returns::Entity::find_by_id(id).one(&*self.db).await?
        else {
            return Ok(None);
        };
        let lines = purchase_return_lines::Entity::find()
            .filter(purchase_return_lines::Column::PurchaseReturnId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(Some(PurchaseReturnAggregate {
            purchase_return,
            lines,
        }))
    }
}

fn assert_returnable(receipt: &goods_receipts::Model) -> Result<(), ServiceError> {
    if receipt.status != GoodsReceiptStatus::Posted {
        return Err(ServiceError::InvalidStatus(format!(
            "goods receipt {} is {}, only posted receipts are returnable",
            receipt.receipt_number, receipt.status
        )));
    }
    Ok(())
}

async fn fetch_receipt_lines(
    txn: &DatabaseTransaction,
    receipt: &goods_receipts::Model,
    inputs: &[PurchaseReturnLineInput],
    for_update: bool,
) -> Result<HashMap<Uuid, goods_receipt_lines::Model>, ServiceError> {
    let mut ids: Vec<Uuid> = inputs.iter().map(|l| l.goods_receipt_line_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut query = goods_receipt_lines::Entity::find()
        .filter(goods_receipt_lines::Column::Id.is_in(ids.clone()))
        .filter(goods_receipt_lines::Column::GoodsReceiptId.eq(receipt.id));
    if for_update {
        query = query.lock_exclusive();
    }

    let lines: HashMap<Uuid, _> = query
        .all(txn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    for id in &ids {
        if !lines.contains_key(id) {
            return Err(ServiceError::NotFound(format!(
                "goods receipt line {} not found on receipt {}",
                id, receipt.receipt_number
            )));
        }
    }
    Ok(lines)
}

async fn lock_order_lines(
    txn: &DatabaseTransaction,
    grn_lines: &HashMap<Uuid, goods_receipt_lines::Model>,
) -> Result<HashMap<Uuid, purchase_order_lines::Model>, ServiceError> {
    let mut ids: Vec<Uuid> = grn_lines
        .values()
        .map(|l| l.purchase_order_line_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let lines: HashMap<Uuid, _> = purchase_order_lines::Entity::find()
        .filter(purchase_order_lines::Column::Id.is_in(ids.clone()))
        .lock_exclusive()
        .all(txn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    for id in &ids {
        if !lines.contains_key(id) {
            return Err(ServiceError::NotFound(format!(
                "purchase order line {id} not found"
            )));
        }
    }
    Ok(lines)
}

/// Validates one return line against the receipt line's remaining balance and
/// derives its cost fields from the receipt's valuation.
fn prepare_return_line(
    input: &PurchaseReturnLineInput,
    grn_line: &goods_receipt_lines::Model,
    po_line: &purchase_order_lines::Model,
) -> Result<PreparedReturnLine, ServiceError> {
    if input.quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "return line quantity must be positive".into(),
        ));
    }

    let quantity = round_quantity(input.quantity);
    let available = remaining(
        grn_line.quantity,
        grn_line.quantity_invoiced + grn_line.quantity_returned,
    );
    if exceeds_available(quantity, available) {
        return Err(ServiceError::BalanceExceeded(format!(
            "goods receipt line {}: requested {} exceeds returnable {}",
            grn_line.id, quantity, available
        )));
    }

    let ratio = if grn_line.quantity > Decimal::ZERO {
        grn_line.quantity_base / grn_line.quantity
    } else {
        Decimal::ONE
    };
    let quantity_base = round_quantity(quantity * ratio);
    let line_total = round_money(quantity * grn_line.unit_cost);
    let line_total_base = round_cost(quantity_base * grn_line.unit_cost_base);

    Ok(PreparedReturnLine {
        goods_receipt_line_id: grn_line.id,
        purchase_order_line_id: po_line.id,
        product_id: grn_line.product_id,
        base_uom_id: po_line.base_uom_id,
        quantity,
        quantity_base,
        unit_cost_base: grn_line.unit_cost_base,
        line_total,
        line_total_base,
    })
}

/// A return both reverses the order line's received quantity and records a
/// returned quantity. The reversal floors at zero; counters never go
/// negative.
fn apply_return_to_counters(
    line: &PreparedReturnLine,
    grn_line: &mut goods_receipt_lines::Model,
    po_line: &mut purchase_order_lines::Model,
) {
    grn_line.quantity_returned = round_quantity(grn_line.quantity_returned + line.quantity);
    grn_line.quantity_returned_base =
        round_quantity(grn_line.quantity_returned_base + line.quantity_base);
    grn_line.amount_returned = round_money(grn_line.amount_returned + line.line_total);

    po_line.quantity_received =
        round_quantity((po_line.quantity_received - line.quantity).max(Decimal::ZERO));
    po_line.quantity_received_base = round_quantity(
        (po_line.quantity_received_base - line.quantity_base).max(Decimal::ZERO),
    );
    po_line.quantity_returned = round_quantity(po_line.quantity_returned + line.quantity);
    po_line.quantity_returned_base =
        round_quantity(po_line.quantity_returned_base + line.quantity_base);
}

/// Journal legs for a posted return: the receipt accrual is restored and the
/// stock value leaves inventory.
fn return_payload(
    purchase_return: &purchase_returns::Model,
    ctx: &OperationContext,
) -> AccountingEventPayload {
    let amount = round_money(purchase_return.total_amount_base);
    AccountingEventPayload {
        event_code: "purchase_return.posted".into(),
        company_id: purchase_return.company_id,
        branch_id: purchase_return.branch_id,
        document_type: purchase_returns::Model::ENTITY_TYPE.into(),
        document_id: purchase_return.id,
        document_number: purchase_return.return_number.clone(),
        currency_code: purchase_return.currency_code.clone(),
        exchange_rate: purchase_return.exchange_rate,
        occurred_at: purchase_return.return_date,
        actor_id: ctx.actor.id,
        meta: ctx.meta.clone(),
        lines: vec![
            AccountingEntry {
                role: "grni".into(),
                direction: EntryDirection::Debit,
                amount,
            },
            AccountingEntry {
                role: "inventory".into(),
                direction: EntryDirection::Credit,
                amount,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn po_line(received: Decimal) -> purchase_order_lines::Model {
        purchase_order_lines::Model {
            id: Uuid::new_v4(),
            purchase_order_id: Uuid::new_v4(),
            line_num: 1,
            product_id: Uuid::new_v4(),
            uom_id: Uuid::new_v4(),
            base_uom_id: Uuid::new_v4(),
            quantity: dec!(100),
            quantity_base: dec!(100),
            unit_price: dec!(10),
            line_total: dec!(1000),
            quantity_received: received,
            quantity_received_base: received,
            quantity_invoiced: Decimal::ZERO,
            quantity_invoiced_base: Decimal::ZERO,
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
        returned: Decimal,
    ) -> goods_receipt_lines::Model {
        goods_receipt_lines::Model {
            id: Uuid::new_v4(),
            goods_receipt_id: Uuid::new_v4(),
            purchase_order_line_id: po_line.id,
            product_id: po_line.product_id,
            quantity,
            quantity_base: quantity,
            unit_cost: dec!(10),
            unit_cost_base: dec!(10),
            quantity_invoiced: invoiced,
            quantity_invoiced_base: invoiced,
            quantity_returned: returned,
            quantity_returned_base: returned,
            amount_invoiced: Decimal::ZERO,
            amount_returned: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn return_reverses_received_and_records_returned() {
        let mut po = po_line(dec!(100));
        let mut grn = grn_line(&po, dec!(100), Decimal::ZERO, Decimal::ZERO);
        let input = PurchaseReturnLineInput {
            goods_receipt_line_id: grn.id,
            quantity: dec!(10),
        };

        let line = prepare_return_line(&input, &grn, &po).unwrap();
        apply_return_to_counters(&line, &mut grn, &mut po);

        assert_eq!(po.quantity_received, dec!(90));
        assert_eq!(po.quantity_returned, dec!(10));
        assert_eq!(grn.quantity_returned, dec!(10));
        assert_eq!(grn.amount_returned, dec!(100.00));
    }

    #[test]
    fn reversal_floors_received_at_zero() {
        let mut po = po_line(dec!(5));
        let mut grn = grn_line(&po, dec!(10), Decimal::ZERO, Decimal::ZERO);
        let input = PurchaseReturnLineInput {
            goods_receipt_line_id: grn.id,
            quantity: dec!(8),
        };

        let line = prepare_return_line(&input, &grn, &po).unwrap();
        apply_return_to_counters(&line, &mut grn, &mut po);

        assert_eq!(po.quantity_received, Decimal::ZERO);
        assert_eq!(po.quantity_returned, dec!(8));
    }

    #[test]
    fn rejects_return_beyond_receipt_balance() {
        let po = po_line(dec!(100));
        // 100 received, 40 invoiced, 50 already returned: 10 left.
        let grn = grn_line(&po, dec!(100), dec!(40), dec!(50));
        let input = PurchaseReturnLineInput {
            goods_receipt_line_id: grn.id,
            quantity: dec!(11),
        };

        let err = prepare_return_line(&input, &grn, &po).unwrap_err();
        assert!(matches!(err, ServiceError::BalanceExceeded(_)));
    }

    #[test]
    fn values_return_at_receipt_cost() {
        let po = po_line(dec!(100));
        let grn = grn_line(&po, dec!(100), Decimal::ZERO, Decimal::ZERO);
        let input = PurchaseReturnLineInput {
            goods_receipt_line_id: grn.id,
            quantity: dec!(10),
        };

        let line = prepare_return_line(&input, &grn, &po).unwrap();
        assert_eq!(line.unit_cost_base, dec!(10));
        assert_eq!(line.line_total_base, dec!(100.000000));
    }
}
