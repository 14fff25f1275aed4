use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchase order line carries the ordered quantity plus four cumulative
/// counters maintained by downstream documents: received, invoiced, and
/// returned quantities (each in order units and base units) and the invoiced
/// amount. Invariant: `quantity_invoiced <= quantity_received -
/// quantity_returned` within the quantity tolerance.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_order_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub line_num: i32,
    pub product_id: Uuid,
    pub uom_id: Uuid,
    pub base_uom_id: Uuid,
    pub quantity: Decimal,
    pub quantity_base: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub quantity_received: Decimal,
    pub quantity_received_base: Decimal,
    pub quantity_invoiced: Decimal,
    pub quantity_invoiced_base: Decimal,
    pub quantity_returned: Decimal,
    pub quantity_returned_base: Decimal,
    pub amount_invoiced: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_orders::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_orders::Column::Id"
    )]
    PurchaseOrder,
    #[sea_orm(has_many = "super::goods_receipt_lines::Entity")]
    GoodsReceiptLines,
    #[sea_orm(has_many = "super::purchase_invoice_lines::Entity")]
    PurchaseInvoiceLines,
}

impl Related<super::purchase_orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl Related<super::goods_receipt_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceiptLines.def()
    }
}

impl Related<super::purchase_invoice_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseInvoiceLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
