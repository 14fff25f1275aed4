//! Purchasing services and their wiring.

use std::sync::Arc;

use crate::audit::Auditor;
use crate::auth::AuthorizationGate;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::accounting::AccountingEventBus;
use crate::events::EventSender;
use crate::state_machine::StateMachineEngine;

pub mod inventory;
pub mod numbering;
pub mod purchase_invoices;
pub mod purchase_orders;
pub mod purchase_returns;

pub use purchase_invoices::PurchaseInvoiceService;
pub use purchase_orders::PurchaseOrderService;
pub use purchase_returns::PurchaseReturnService;

/// External collaborators the services depend on.
pub struct ServiceDependencies {
    pub gate: Arc<dyn AuthorizationGate>,
    pub uom: Arc<dyn inventory::UomConverter>,
    pub inventory: Arc<dyn inventory::InventoryService>,
    pub accounting: Arc<dyn AccountingEventBus>,
    pub event_sender: Option<EventSender>,
}

/// The wired-up purchasing services, sharing one pool, engine and auditor.
#[derive(Clone)]
pub struct AppServices {
    pub purchase_orders: PurchaseOrderService,
    pub purchase_invoices: PurchaseInvoiceService,
    pub purchase_returns: PurchaseReturnService,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, config: &AppConfig, deps: ServiceDependencies) -> Self {
        let auditor = Arc::new(Auditor::new());
        let engine = StateMachineEngine::new(
            deps.gate,
            Arc::clone(&auditor),
            deps.event_sender.clone(),
        );

        let purchase_orders = PurchaseOrderService::new(
            Arc::clone(&db),
            engine.clone(),
            Arc::clone(&auditor),
            deps.uom,
            deps.event_sender.clone(),
            config.enforce_maker_checker,
        );
        let purchase_invoices = PurchaseInvoiceService::new(
            Arc::clone(&db),
            engine.clone(),
            Arc::clone(&auditor),
            Arc::clone(&deps.accounting),
            deps.event_sender.clone(),
            config.enforce_maker_checker,
        );
        let purchase_returns = PurchaseReturnService::new(
            db,
            engine,
            auditor,
            purchase_orders.clone(),
            deps.inventory,
            deps.accounting,
            deps.event_sender,
            config.enforce_maker_checker,
        );

        Self {
            purchase_orders,
            purchase_invoices,
            purchase_returns,
        }
    }
}
