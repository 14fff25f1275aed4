use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PurchaseReturnStatus {
    #[sea_orm(string_value = "Draft")]
    Draft,
    #[sea_orm(string_value = "Posted")]
    Posted,
}

/// A supplier return against a posted goods receipt. Returns have no
/// user-visible draft stage: the row is inserted and posted inside one
/// transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_returns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub return_number: String,
    pub goods_receipt_id: Uuid,
    pub company_id: i32,
    pub branch_id: i32,
    pub supplier_id: Uuid,
    pub currency_code: String,
    pub exchange_rate: Decimal,
    pub status: PurchaseReturnStatus,
    pub return_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub total_amount_base: Decimal,
    pub inventory_transaction_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
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
    #[sea_orm(has_many = "super::purchase_return_lines::Entity")]
    PurchaseReturnLines,
}

impl Related<super::goods_receipts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceipt.def()
    }
}

impl Related<super::purchase_return_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturnLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
