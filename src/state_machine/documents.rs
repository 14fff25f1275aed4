//! Transition tables and [`StateDocument`] wiring for the purchasing
//! documents.

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use uuid::Uuid;

use super::{StateDocument, Transition, TransitionTable};
use crate::entities::purchase_invoices::{self, PurchaseInvoiceStatus};
use crate::entities::purchase_orders::{self, PurchaseOrderStatus};
use crate::entities::purchase_returns::{self, PurchaseReturnStatus};
use crate::errors::ServiceError;

pub mod abilities {
    pub const PURCHASE_ORDER_APPROVE: &str = "purchase_order.approve";
    pub const PURCHASE_ORDER_SEND: &str = "purchase_order.send";
    pub const PURCHASE_ORDER_CANCEL: &str = "purchase_order.cancel";
    pub const PURCHASE_INVOICE_POST: &str = "purchase_invoice.post";
    pub const PURCHASE_RETURN_POST: &str = "purchase_return.post";
}

fn order_has_value(po: &purchase_orders::Model) -> bool {
    po.total_amount > Decimal::ZERO
}

static PURCHASE_ORDER_TRANSITIONS: Lazy<TransitionTable<purchase_orders::Model>> =
    Lazy::new(|| {
        use PurchaseOrderStatus::*;
        TransitionTable::new(vec![
            Transition::new(Draft, Approved)
                .ability(abilities::PURCHASE_ORDER_APPROVE)
                .guard(order_has_value),
            Transition::new(Draft, Cancelled).ability(abilities::PURCHASE_ORDER_CANCEL),
            Transition::new(Approved, Sent).ability(abilities::PURCHASE_ORDER_SEND),
            Transition::new(Approved, Cancelled).ability(abilities::PURCHASE_ORDER_CANCEL),
            Transition::new(Sent, Cancelled).ability(abilities::PURCHASE_ORDER_CANCEL),
            Transition::new(Sent, PartiallyReceived),
            Transition::new(Sent, Received),
            Transition::new(PartiallyReceived, Received),
            // A posted return can reopen receiving on a fully received order.
            Transition::new(Received, PartiallyReceived),
            Transition::new(PartiallyReceived, Closed),
            Transition::new(Received, Closed),
        ])
    });

static PURCHASE_INVOICE_TRANSITIONS: Lazy<TransitionTable<purchase_invoices::Model>> =
    Lazy::new(|| {
        use PurchaseInvoiceStatus::*;
        TransitionTable::new(vec![
            Transition::new(Draft, Posted).ability(abilities::PURCHASE_INVOICE_POST)
        ])
    });

static PURCHASE_RETURN_TRANSITIONS: Lazy<TransitionTable<purchase_returns::Model>> =
    Lazy::new(|| {
        use PurchaseReturnStatus::*;
        TransitionTable::new(vec![
            Transition::new(Draft, Posted).ability(abilities::PURCHASE_RETURN_POST)
        ])
    });

#[async_trait]
impl StateDocument for purchase_orders::Model {
    type Status = PurchaseOrderStatus;

    const ENTITY_TYPE: &'static str = "purchase_order";

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> Self::Status {
        self.status
    }

    fn created_by(&self) -> Option<Uuid> {
        Some(self.created_by)
    }

    fn transitions() -> &'static TransitionTable<Self> {
        &PURCHASE_ORDER_TRANSITIONS
    }

    async fn write_status(
        txn: &DatabaseTransaction,
        id: Uuid,
        from: Self::Status,
        to: Self::Status,
    ) -> Result<Self, ServiceError> {
        let result = purchase_orders::Entity::update_many()
            .set(purchase_orders::ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(purchase_orders::Column::Id.eq(id))
            .filter(purchase_orders::Column::Status.eq(from))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        purchase_orders::Entity::find_by_id(id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {id} not found")))
    }
}

#[async_trait]
impl StateDocument for purchase_invoices::Model {
    type Status = PurchaseInvoiceStatus;

    const ENTITY_TYPE: &'static str = "purchase_invoice";

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> Self::Status {
        self.status
    }

    fn created_by(&self) -> Option<Uuid> {
        Some(self.created_by)
    }

    fn transitions() -> &'static TransitionTable<Self> {
        &PURCHASE_INVOICE_TRANSITIONS
    }

    async fn write_status(
        txn: &DatabaseTransaction,
        id: Uuid,
        from: Self::Status,
        to: Self::Status,
    ) -> Result<Self, ServiceError> {
        let result = purchase_invoices::Entity::update_many()
            .set(purchase_invoices::ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(purchase_invoices::Column::Id.eq(id))
            .filter(purchase_invoices::Column::Status.eq(from))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        purchase_invoices::Entity::find_by_id(id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase invoice {id} not found")))
    }
}

#[async_trait]
impl StateDocument for purchase_returns::Model {
    type Status = PurchaseReturnStatus;

    const ENTITY_TYPE: &'static str = "purchase_return";

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> Self::Status {
        self.status
    }

    fn created_by(&self) -> Option<Uuid> {
        Some(self.created_by)
    }

    fn transitions() -> &'static TransitionTable<Self> {
        &PURCHASE_RETURN_TRANSITIONS
    }

    async fn write_status(
        txn: &DatabaseTransaction,
        id: Uuid,
        from: Self::Status,
        to: Self::Status,
    ) -> Result<Self, ServiceError> {
        let result = purchase_returns::Entity::update_many()
            .set(purchase_returns::ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(purchase_returns::Column::Id.eq(id))
            .filter(purchase_returns::Column::Status.eq(from))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        purchase_returns::Entity::find_by_id(id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase return {id} not found")))
    }
}
