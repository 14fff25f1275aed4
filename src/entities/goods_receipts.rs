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
pub enum GoodsReceiptStatus {
    #[sea_orm(string_value = "Draft")]
    Draft,
    #[sea_orm(string_value = "Posted")]
    Posted,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goods_receipts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub receipt_number: String,
    pub company_id: i32,
    pub branch_id: i32,
    pub supplier_id: Uuid,
    pub currency_code: String,
    pub exchange_rate: Decimal,
    pub status: GoodsReceiptStatus,
    pub received_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::goods_receipt_lines::Entity")]
    GoodsReceiptLines,
    #[sea_orm(has_many = "super::purchase_returns::Entity")]
    PurchaseReturns,
}

impl Related<super::goods_receipt_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoodsReceiptLines.def()
    }
}

impl Related<super::purchase_returns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
