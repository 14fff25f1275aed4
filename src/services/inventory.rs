//! Inventory and unit-of-measure collaborators.
//!
//! The stock-issue subsystem and the UOM conversion tables live outside this
//! crate; the purchasing services consume them through these ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    MovingAverage,
    Fifo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueLine {
    pub variant_id: Uuid,
    pub uom_id: Uuid,
    pub quantity_base: Decimal,
}

/// Request to issue stock out of a location, e.g. for a supplier return.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueRequest {
    pub date: DateTime<Utc>,
    pub location_id: Uuid,
    pub lines: Vec<IssueLine>,
    pub source_type: String,
    pub source_id: Uuid,
    pub notes: Option<String>,
    pub valuation_method: ValuationMethod,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueResult {
    pub transaction_id: Uuid,
}

/// Stock-issue boundary. Called once per posted return, after the quantity
/// counters are locked and updated; a failure aborts the whole transaction.
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn issue(&self, request: IssueRequest) -> Result<IssueResult, ServiceError>;
}

/// UOM conversion boundary. Implementations validate that product, UOM and
/// base UOM belong to the requesting company and convert an ordered quantity
/// into base units, failing with a validation error when no conversion path
/// exists.
#[async_trait]
pub trait UomConverter: Send + Sync {
    async fn to_base(
        &self,
        company_id: i32,
        product_id: Uuid,
        uom_id: Uuid,
        base_uom_id: Uuid,
        quantity: Decimal,
    ) -> Result<Decimal, ServiceError>;
}

/// Converter for setups where ordering always happens in the base unit.
#[derive(Debug, Default)]
pub struct IdentityUomConverter;

#[async_trait]
impl UomConverter for IdentityUomConverter {
    async fn to_base(
        &self,
        _company_id: i32,
        _product_id: Uuid,
        uom_id: Uuid,
        base_uom_id: Uuid,
        quantity: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if uom_id != base_uom_id {
            return Err(ServiceError::ValidationError(format!(
                "no conversion from UOM {uom_id} to base UOM {base_uom_id}"
            )));
        }
        Ok(quantity)
    }
}
