use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What was physically received against a purchase order line.
///
/// `unit_cost_base` is the valuation basis for purchase price variance.
/// Invariant: `quantity_invoiced + quantity_returned <= quantity` within the
/// quantity tolerance; several invoices and returns may draw down the same
/// receipt line over its life.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goods_receipt_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub goods_receipt_id: Uuid,
    pub purchase_order_line_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub quantity_base: Decimal,
    pub unit_cost: Decimal,
    pub unit_cost_base: Decimal,
    pub quantity_invoiced: Decimal,
    pub quantity_invoiced_base: Decimal,
    pub quantity_returned: Decimal,
    pub quantity_returned_base: Decimal,
    pub amount_invoiced: Decimal,
    pub amount_returned: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::goods_receipts::Entity",
        from = "Column::GoodsReceiptId",
        to = "super::goods_receipts::Column::Id"
    )]
    GoodsReceipt,
    #[sea_orm(
        belongs_to = "super::purchase_order_lines::Entity",
        from = "Column::PurchaseOrderLineId",
        to = "super::purchase_order_lines::Column::Id"
    )]
    PurchaseOrderLine,
    #[sea_orm(has_many = "super::purchase_return_lines::Entity")]
    PurchaseReturnLines,
}

impl Related<super::goods_receipts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceipt.def()
    }
}

impl Related<super::purchase_order_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLine.def()
    }
}

impl Related<super::purchase_return_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturnLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
