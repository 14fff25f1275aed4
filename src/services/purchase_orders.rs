use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{AuditEntry, Auditor};
use crate::auth::OperationContext;
use crate::db::DbPool;
use crate::entities::purchase_order_lines;
use crate::entities::purchase_orders::{self, PurchaseOrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::rounding::{round_money, round_quantity, QTY_EPSILON};
use crate::services::inventory::UomConverter;
use crate::services::numbering;
use crate::state_machine::{NoHooks, StateDocument, StateMachineEngine, TransitionHooks};

#[derive(Clone, Debug)]
pub struct PurchaseOrderLineInput {
    pub product_id: Uuid,
    pub uom_id: Uuid,
    pub base_uom_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug)]
pub struct CreatePurchaseOrder {
    pub company_id: i32,
    pub branch_id: i32,
    pub supplier_id: Uuid,
    pub currency_code: String,
    pub exchange_rate: Decimal,
    pub order_date: Option<DateTime<Utc>>,
    pub tax_total: Decimal,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseOrderLineInput>,
}

#[derive(Clone, Debug)]
pub struct UpdatePurchaseOrder {
    pub supplier_id: Uuid,
    pub currency_code: String,
    pub exchange_rate: Decimal,
    pub order_date: Option<DateTime<Utc>>,
    pub tax_total: Decimal,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseOrderLineInput>,
}

#[derive(Clone, Debug)]
pub struct PurchaseOrderAggregate {
    pub order: purchase_orders::Model,
    pub lines: Vec<purchase_order_lines::Model>,
}

/// Stamps approver and approval time once the approval edge has executed.
struct ApprovalStamp {
    actor_id: Uuid,
}

#[async_trait]
impl TransitionHooks<purchase_orders::Model> for ApprovalStamp {
    async fn after(
        &self,
        txn: &DatabaseTransaction,
        doc: &purchase_orders::Model,
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    ) -> Result<(), ServiceError> {
        if from == PurchaseOrderStatus::Draft && to == PurchaseOrderStatus::Approved {
            let mut active: purchase_orders::ActiveModel = doc.clone().into();
            active.approved_by = Set(Some(self.actor_id));
            active.approved_at = Set(Some(Utc::now()));
            active.update(txn).await?;
        }
        Ok(())
    }
}

/// Service for creating and steering purchase orders through their lifecycle.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DbPool>,
    engine: StateMachineEngine,
    auditor: Arc<Auditor>,
    uom: Arc<dyn UomConverter>,
    event_sender: Option<EventSender>,
    enforce_maker_checker: bool,
}

impl PurchaseOrderService {
    pub fn new(
        db: Arc<DbPool>,
        engine: StateMachineEngine,
        auditor: Arc<Auditor>,
        uom: Arc<dyn UomConverter>,
        event_sender: Option<EventSender>,
        enforce_maker_checker: bool,
    ) -> Self {
        Self {
            db,
            engine,
            auditor,
            uom,
            event_sender,
            enforce_maker_checker,
        }
    }

    /// Creates a purchase order in `Draft` with its lines.
    #[instrument(skip(self, input, ctx), fields(actor = %ctx.actor.id))]
    pub async fn create(
        &self,
        input: CreatePurchaseOrder,
        ctx: &OperationContext,
    ) -> Result<PurchaseOrderAggregate, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "a purchase order requires at least one line".into(),
            ));
        }
        if input.exchange_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "exchange rate must be positive".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_date = input.order_date.unwrap_or(now);

        let series = numbering::series_prefix(
            numbering::PURCHASE_ORDER_PREFIX,
            input.company_id,
            input.branch_id,
            now,
        );
        let latest = purchase_orders::Entity::find()
            .filter(purchase_orders::Column::BranchId.eq(input.branch_id))
            .filter(purchase_orders::Column::OrderNumber.starts_with(&series))
            .order_by_desc(purchase_orders::Column::OrderNumber)
            .one(&txn)
            .await?;
        let order_number =
            numbering::next_in_series(&series, latest.as_ref().map(|m| m.order_number.as_str()));

        let order_id = Uuid::new_v4();
        let (lines, subtotal) = self
            .build_lines(&txn, order_id, input.company_id, &input.lines)
            .await?;

        let tax_total = round_money(input.tax_total);
        let total_amount = round_money(subtotal + tax_total);

        let order = purchase_orders::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            company_id: Set(input.company_id),
            branch_id: Set(input.branch_id),
            supplier_id: Set(input.supplier_id),
            currency_code: Set(input.currency_code),
            exchange_rate: Set(input.exchange_rate),
            status: Set(PurchaseOrderStatus::Draft),
            order_date: Set(order_date),
            subtotal: Set(subtotal),
            tax_total: Set(tax_total),
            total_amount: Set(total_amount),
            notes: Set(input.notes),
            created_by: Set(ctx.actor.id),
            approved_by: Set(None),
            approved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            inserted.push(line.insert(&txn).await?);
        }

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("created", purchase_orders::Model::ENTITY_TYPE, order.id)
                    .states(
                        json!(null),
                        json!({ "order_number": order_number, "total_amount": total_amount }),
                    ),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderCreated(order.id)).await;
        }
        info!("Purchase order {} created", order.order_number);

        Ok(PurchaseOrderAggregate {
            order,
            lines: inserted,
        })
    }

    /// Rewrites a draft purchase order: header fields and the full line set.
    #[instrument(skip(self, input, ctx), fields(order_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdatePurchaseOrder,
        ctx: &OperationContext,
    ) -> Result<PurchaseOrderAggregate, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "a purchase order requires at least one line".into(),
            ));
        }
        if input.exchange_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "exchange rate must be positive".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = self.load_order(&txn, id).await?;
        assert_draft(&order)?;

        purchase_order_lines::Entity::delete_many()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(id))
            .exec(&txn)
            .await?;

        let (lines, subtotal) = self
            .build_lines(&txn, id, order.company_id, &input.lines)
            .await?;
        let tax_total = round_money(input.tax_total);
        let total_amount = round_money(subtotal + tax_total);

        let before_total = order.total_amount;
        let mut active: purchase_orders::ActiveModel = order.into();
        active.supplier_id = Set(input.supplier_id);
        active.currency_code = Set(input.currency_code);
        active.exchange_rate = Set(input.exchange_rate);
        if let Some(order_date) = input.order_date {
            active.order_date = Set(order_date);
        }
        active.notes = Set(input.notes);
        active.subtotal = Set(subtotal);
        active.tax_total = Set(tax_total);
        active.total_amount = Set(total_amount);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            inserted.push(line.insert(&txn).await?);
        }

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("updated", purchase_orders::Model::ENTITY_TYPE, id)
                    .states(
                        json!({ "total_amount": before_total }),
                        json!({ "total_amount": total_amount }),
                    )
                    .changed(json!(["lines", "total_amount"])),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderUpdated(id)).await;
        }

        Ok(PurchaseOrderAggregate {
            order,
            lines: inserted,
        })
    }

    /// Deletes a draft purchase order and its lines.
    #[instrument(skip(self, ctx), fields(order_id = %id))]
    pub async fn delete(&self, id: Uuid, ctx: &OperationContext) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let order = self.load_order(&txn, id).await?;
        assert_draft(&order)?;

        purchase_order_lines::Entity::delete_many()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(id))
            .exec(&txn)
            .await?;
        purchase_orders::Entity::delete_by_id(id).exec(&txn).await?;

        self.auditor
            .record(
                &txn,
                ctx,
                AuditEntry::new("deleted", purchase_orders::Model::ENTITY_TYPE, id)
                    .states(json!({ "order_number": order.order_number }), json!(null)),
            )
            .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderDeleted(id)).await;
        }
        Ok(())
    }

    /// Approves a draft order. Subject to maker-checker when configured.
    #[instrument(skip(self, ctx), fields(order_id = %id))]
    pub async fn approve(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<purchase_orders::Model, ServiceError> {
        let ctx = self.lifecycle_context(ctx);
        let txn = self.db.begin().await?;
        let order = self.load_order(&txn, id).await?;
        let stamp = ApprovalStamp {
            actor_id: ctx.actor.id,
        };
        self.engine
            .transition_to(&txn, &order, PurchaseOrderStatus::Approved, &ctx, &stamp)
            .await?;
        // Re-read to pick up the approval stamp written by the hook.
        let order = self.load_order(&txn, id).await?;
        txn.commit().await?;
        Ok(order)
    }

    /// Marks an approved order as sent to the supplier.
    #[instrument(skip(self, ctx), fields(order_id = %id))]
    pub async fn send(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<purchase_orders::Model, ServiceError> {
        self.transition(id, PurchaseOrderStatus::Sent, ctx).await
    }

    /// Cancels an order that has not started receiving.
    #[instrument(skip(self, ctx), fields(order_id = %id))]
    pub async fn cancel(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<purchase_orders::Model, ServiceError> {
        self.transition(id, PurchaseOrderStatus::Cancelled, ctx).await
    }

    /// Target statuses the actor may currently move the order to.
    pub async fn allowed_transitions(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<Vec<PurchaseOrderStatus>, ServiceError> {
        let order = purchase_orders::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {id} not found")))?;
        let ctx = self.lifecycle_context(ctx);
        Ok(self.engine.allowed_transitions(&order, &ctx).await)
    }

    /// Loads an order with its lines.
    pub async fn get(&self, id: Uuid) -> Result<Option<PurchaseOrderAggregate>, ServiceError> {
        let Some(order) = purchase_orders::Entity::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };
        let lines = purchase_order_lines::Entity::find()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(id))
            .order_by_asc(purchase_order_lines::Column::LineNum)
            .all(&*self.db)
            .await?;
        Ok(Some(PurchaseOrderAggregate { order, lines }))
    }

    /// Recomputes the order's receiving status from its line balances: any
    /// line with ordered quantity not yet covered by (post-return) receipts
    /// keeps the order `PartiallyReceived`, otherwise it is `Received`.
    pub async fn sync_receipt_status(
        &self,
        txn: &DatabaseTransaction,
        po_id: Uuid,
        ctx: &OperationContext,
    ) -> Result<PurchaseOrderStatus, ServiceError> {
        let order = self.load_order(txn, po_id).await?;
        if !matches!(
            order.status,
            PurchaseOrderStatus::PartiallyReceived | PurchaseOrderStatus::Received
        ) {
            return Ok(order.status);
        }

        let lines = purchase_order_lines::Entity::find()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(po_id))
            .all(txn)
            .await?;
        let any_outstanding = lines
            .iter()
            .any(|l| l.quantity - l.quantity_received > QTY_EPSILON);
        let target = if any_outstanding {
            PurchaseOrderStatus::PartiallyReceived
        } else {
            PurchaseOrderStatus::Received
        };

        if order.status != target {
            let updated = self
                .engine
                .transition_to(txn, &order, target, ctx, &NoHooks)
                .await?;
            return Ok(updated.status);
        }
        Ok(order.status)
    }

    fn lifecycle_context(&self, ctx: &OperationContext) -> OperationContext {
        ctx.clone().with_maker_checker(self.enforce_maker_checker)
    }

    async fn transition(
        &self,
        id: Uuid,
        target: PurchaseOrderStatus,
        ctx: &OperationContext,
    ) -> Result<purchase_orders::Model, ServiceError> {
        let ctx = self.lifecycle_context(ctx);
        let txn = self.db.begin().await?;
        let order = self.load_order(&txn, id).await?;
        let updated = self
            .engine
            .transition_to(&txn, &order, target, &ctx, &NoHooks)
            .await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn load_order(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<purchase_orders::Model, ServiceError> {
        purchase_orders::Entity::find_by_id(id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {id} not found")))
    }

    /// Validates and converts the line inputs, returning the rows to insert
    /// and their rounded subtotal.
    async fn build_lines(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        company_id: i32,
        inputs: &[PurchaseOrderLineInput],
    ) -> Result<(Vec<purchase_order_lines::ActiveModel>, Decimal), ServiceError> {
        let _ = txn; // conversions may later consult company-scoped tables
        let now = Utc::now();
        let mut subtotal = Decimal::ZERO;
        let mut lines = Vec::with_capacity(inputs.len());
        for (idx, input) in inputs.iter().enumerate() {
            if input.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: quantity must be positive",
                    idx + 1
                )));
            }
            if input.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: unit price must not be negative",
                    idx + 1
                )));
            }

            let quantity = round_quantity(input.quantity);
            let quantity_base = round_quantity(
                self.uom
                    .to_base(
                        company_id,
                        input.product_id,
                        input.uom_id,
                        input.base_uom_id,
                        quantity,
                    )
                    .await?,
            );
            let line_total = round_money(quantity * input.unit_price);
            subtotal += line_total;

            lines.push(purchase_order_lines::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(order_id),
                line_num: Set((idx + 1) as i32),
                product_id: Set(input.product_id),
                uom_id: Set(input.uom_id),
                base_uom_id: Set(input.base_uom_id),
                quantity: Set(quantity),
                quantity_base: Set(quantity_base),
                unit_price: Set(input.unit_price),
                line_total: Set(line_total),
                quantity_received: Set(Decimal::ZERO),
                quantity_received_base: Set(Decimal::ZERO),
                quantity_invoiced: Set(Decimal::ZERO),
                quantity_invoiced_base: Set(Decimal::ZERO),
                quantity_returned: Set(Decimal::ZERO),
                quantity_returned_base: Set(Decimal::ZERO),
                amount_invoiced: Set(Decimal::ZERO),
                created_at: Set(now),
                updated_at: Set(now),
            });
        }
        Ok((lines, round_money(subtotal)))
    }
}

pub(crate) fn assert_draft(order: &purchase_orders::Model) -> Result<(), ServiceError> {
    if order.status != PurchaseOrderStatus::Draft {
        return Err(ServiceError::InvalidStatus(format!(
            "purchase order {} is {}, expected Draft",
            order.order_number, order.status
        )));
    }
    Ok(())
}
