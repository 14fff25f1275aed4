//! Domain events published by the purchasing services and the state machine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

pub mod accounting;

/// Events that can occur in the purchasing subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Fired by the state machine engine for every executed transition.
    DocumentStatusChanged {
        entity_type: String,
        entity_id: Uuid,
        from_status: String,
        to_status: String,
        actor_id: Uuid,
    },

    // Purchase order events
    PurchaseOrderCreated(Uuid),
    PurchaseOrderUpdated(Uuid),
    PurchaseOrderDeleted(Uuid),

    // Purchase invoice events
    PurchaseInvoiceCreated(Uuid),
    PurchaseInvoiceUpdated(Uuid),
    PurchaseInvoiceDeleted(Uuid),
    PurchaseInvoicePosted {
        invoice_id: Uuid,
        purchase_order_id: Uuid,
        total_amount: Decimal,
        ppv_amount: Decimal,
    },

    // Purchase return events
    PurchaseReturnPosted {
        return_id: Uuid,
        goods_receipt_id: Uuid,
        total_amount_base: Decimal,
    },
}

/// Handle for publishing events onto the application's event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded event channel and the sender half wrapped for the
    /// services.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), crate::errors::ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| crate::errors::ServiceError::EventError(e.to_string()))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Event delivery is never allowed to abort a business operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            error!("Failed to publish event: {}", e);
        }
    }
}
