use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A return line references both the originating goods receipt line and the
/// purchase order line whose received quantity it reverses.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_return_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_return_id: Uuid,
    pub goods_receipt_line_id: Uuid,
    pub purchase_order_line_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub quantity_base: Decimal,
    pub unit_cost_base: Decimal,
    pub line_total: Decimal,
    pub line_total_base: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_returns::Entity",
        from = "Column::PurchaseReturnId",
        to = "super::purchase_returns::Column::Id"
    )]
    PurchaseReturn,
    #[sea_orm(
        belongs_to = "super::goods_receipt_lines::Entity",
        from = "Column::GoodsReceiptLineId",
        to = "super::goods_receipt_lines::Column::Id"
    )]
    GoodsReceiptLine,
    #[sea_orm(
        belongs_to = "super::purchase_order_lines::Entity",
        from = "Column::PurchaseOrderLineId",
        to = "super::purchase_order_lines::Column::Id"
    )]
    PurchaseOrderLine,
}

impl Related<super::purchase_returns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturn.def()
    }
}

impl Related<super::goods_receipt_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceiptLine.def()
    }
}

impl Related<super::purchase_order_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
