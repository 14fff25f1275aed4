//! Accounting event boundary.
//!
//! Ledger posting is a downstream, retryable side effect: the purchasing
//! services dispatch these payloads best-effort after their quantity and
//! status mutations are in place, and a dispatch failure is logged rather
//! than propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Debit,
    Credit,
}

/// One journal leg of an accounting event. `role` names the account's role in
/// the posting scheme (e.g. "grni", "ap", "ppv"); the account mapping itself
/// lives in the accounting subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountingEntry {
    pub role: String,
    pub direction: EntryDirection,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountingEventPayload {
    pub event_code: String,
    pub company_id: i32,
    pub branch_id: i32,
    pub document_type: String,
    pub document_id: Uuid,
    pub document_number: String,
    pub currency_code: String,
    pub exchange_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Uuid,
    pub meta: Value,
    pub lines: Vec<AccountingEntry>,
}

/// Downstream journal-posting boundary, consumed but not implemented here.
#[async_trait]
pub trait AccountingEventBus: Send + Sync {
    async fn dispatch(&self, payload: AccountingEventPayload) -> Result<(), ServiceError>;
}

/// Bus that only logs the payload. Default wiring for deployments without an
/// accounting subsystem attached.
#[derive(Debug, Default)]
pub struct NoopAccountingEventBus;

#[async_trait]
impl AccountingEventBus for NoopAccountingEventBus {
    async fn dispatch(&self, payload: AccountingEventPayload) -> Result<(), ServiceError> {
        info!(
            event_code = %payload.event_code,
            document = %payload.document_number,
            "Accounting event dropped (no bus attached)"
        );
        Ok(())
    }
}

/// Dispatches an accounting event without letting a downstream failure reach
/// the caller. The triggering operation is already correct at this point;
/// ledger delivery is retryable out of band.
pub async fn dispatch_best_effort(bus: &dyn AccountingEventBus, payload: AccountingEventPayload) {
    let document = payload.document_number.clone();
    let event_code = payload.event_code.clone();
    if let Err(e) = bus.dispatch(payload).await {
        error!(
            event_code = %event_code,
            document = %document,
            "Accounting event dispatch failed: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FailingBus;

    #[async_trait]
    impl AccountingEventBus for FailingBus {
        async fn dispatch(&self, _payload: AccountingEventPayload) -> Result<(), ServiceError> {
            Err(ServiceError::EventError("downstream outage".into()))
        }
    }

    fn payload() -> AccountingEventPayload {
        AccountingEventPayload {
            event_code: "purchase_invoice.posted".into(),
            company_id: 1,
            branch_id: 1,
            document_type: "purchase_invoice".into(),
            document_id: Uuid::new_v4(),
            document_number: "PI.01001.26.0001".into(),
            currency_code: "USD".into(),
            exchange_rate: dec!(1),
            occurred_at: Utc::now(),
            actor_id: Uuid::new_v4(),
            meta: Value::Null,
            lines: vec![AccountingEntry {
                role: "ap".into(),
                direction: EntryDirection::Credit,
                amount: dec!(484.40),
            }],
        }
    }

    #[tokio::test]
    async fn best_effort_dispatch_swallows_failures() {
        // Must complete without propagating the downstream error.
        dispatch_best_effort(&FailingBus, payload()).await;
    }
}
