use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An invoice line references the purchase order line it bills and, until
/// posting completes, the goods receipt line it draws down. `grn_value_base`
/// is what the matched receipt valued that quantity at; `ppv_amount` is the
/// variance between the tax-inclusive invoiced base value and that valuation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_invoice_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_invoice_id: Uuid,
    pub purchase_order_line_id: Uuid,
    pub goods_receipt_line_id: Option<Uuid>,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub quantity_base: Decimal,
    pub unit_price: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub line_total_base: Decimal,
    pub grn_value_base: Decimal,
    pub ppv_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_invoices::Entity",
        from = "Column::PurchaseInvoiceId",
        to = "super::purchase_invoices::Column::Id"
    )]
    PurchaseInvoice,
    #[sea_orm(
        belongs_to = "super::purchase_order_lines::Entity",
        from = "Column::PurchaseOrderLineId",
        to = "super::purchase_order_lines::Column::Id"
    )]
    PurchaseOrderLine,
    #[sea_orm(
        belongs_to = "super::goods_receipt_lines::Entity",
        from = "Column::GoodsReceiptLineId",
        to = "super::goods_receipt_lines::Column::Id"
    )]
    GoodsReceiptLine,
}

impl Related<super::purchase_invoices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseInvoice.def()
    }
}

impl Related<super::purchase_order_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLine.def()
    }
}

impl Related<super::goods_receipt_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceiptLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
