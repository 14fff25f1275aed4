//! Shared harness for the integration tests.
//!
//! Tests run against in-memory SQLite with the schema derived from the
//! entity definitions. Row locks degrade to plain selects there, so the
//! posting paths execute unchanged.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, Schema,
};
use uuid::Uuid;

use procure_api::auth::{Actor, AuthorizationGate, MakerCheckerGate, OperationContext};
use procure_api::config::AppConfig;
use procure_api::entities::{
    audit_logs, goods_receipt_lines, goods_receipts, purchase_invoice_lines, purchase_invoices,
    purchase_order_lines, purchase_orders, purchase_return_lines, purchase_returns,
};
use procure_api::entities::goods_receipts::GoodsReceiptStatus;
use procure_api::entities::purchase_orders::PurchaseOrderStatus;
use procure_api::errors::ServiceError;
use procure_api::events::accounting::{AccountingEventBus, AccountingEventPayload};
use procure_api::services::inventory::{
    IdentityUomConverter, InventoryService, IssueRequest, IssueResult,
};
use procure_api::services::{AppServices, ServiceDependencies};

/// Inventory double that records every issue request.
#[derive(Default)]
pub struct RecordingInventory {
    pub issued: Mutex<Vec<IssueRequest>>,
}

#[async_trait]
impl InventoryService for RecordingInventory {
    async fn issue(&self, request: IssueRequest) -> Result<IssueResult, ServiceError> {
        self.issued.lock().unwrap().push(request);
        Ok(IssueResult {
            transaction_id: Uuid::new_v4(),
        })
    }
}

/// Accounting double that records every dispatched payload.
#[derive(Default)]
pub struct RecordingBus {
    pub dispatched: Mutex<Vec<AccountingEventPayload>>,
}

#[async_trait]
impl AccountingEventBus for RecordingBus {
    async fn dispatch(&self, payload: AccountingEventPayload) -> Result<(), ServiceError> {
        self.dispatched.lock().unwrap().push(payload);
        Ok(())
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub inventory: Arc<RecordingInventory>,
    pub accounting: Arc<RecordingBus>,
}

pub async fn setup() -> TestApp {
    setup_with(false).await
}

pub async fn setup_with(enforce_maker_checker: bool) -> TestApp {
    let db = Arc::new(connect_and_migrate().await);
    let inventory = Arc::new(RecordingInventory::default());
    let accounting = Arc::new(RecordingBus::default());

    let mut config = AppConfig::new("sqlite::memory:".into(), "test".into());
    config.enforce_maker_checker = enforce_maker_checker;

    let gate: Arc<dyn AuthorizationGate> = Arc::new(MakerCheckerGate);
    let services = AppServices::new(
        Arc::clone(&db),
        &config,
        ServiceDependencies {
            gate,
            uom: Arc::new(IdentityUomConverter),
            inventory: Arc::clone(&inventory) as Arc<dyn InventoryService>,
            accounting: Arc::clone(&accounting) as Arc<dyn AccountingEventBus>,
            event_sender: None,
        },
    );

    TestApp {
        db,
        services,
        inventory,
        accounting,
    }
}

async fn connect_and_migrate() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("sqlite connection");
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    db.execute(backend.build(&schema.create_table_from_entity(purchase_orders::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(purchase_order_lines::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(goods_receipts::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(goods_receipt_lines::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(purchase_invoices::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(purchase_invoice_lines::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(purchase_returns::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(purchase_return_lines::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(audit_logs::Entity)))
        .await
        .unwrap();

    db
}

pub fn actor(name: &str) -> Actor {
    Actor::new(Uuid::new_v4(), name)
}

pub fn ctx(actor: &Actor) -> OperationContext {
    OperationContext::new(actor.clone())
}

pub struct SeededOrder {
    pub order: purchase_orders::Model,
    pub line: purchase_order_lines::Model,
}

/// Inserts an order with one line directly, bypassing the services, so tests
/// control the status and counters exactly.
pub async fn seed_order(
    db: &DatabaseConnection,
    status: PurchaseOrderStatus,
    quantity: Decimal,
    unit_price: Decimal,
    created_by: Uuid,
) -> SeededOrder {
    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let line_total = quantity * unit_price;

    let order = purchase_orders::ActiveModel {
        id: Set(order_id),
        order_number: Set(format!("PO.01001.26.{}", &order_id.simple().to_string()[..8])),
        company_id: Set(1),
        branch_id: Set(1),
        supplier_id: Set(Uuid::new_v4()),
        currency_code: Set("USD".into()),
        exchange_rate: Set(Decimal::ONE),
        status: Set(status),
        order_date: Set(now),
        subtotal: Set(line_total),
        tax_total: Set(Decimal::ZERO),
        total_amount: Set(line_total),
        notes: Set(None),
        created_by: Set(created_by),
        approved_by: Set(None),
        approved_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let uom_id = Uuid::new_v4();
    let line = purchase_order_lines::ActiveModel {
        id: Set(Uuid::new_v4()),
        purchase_order_id: Set(order_id),
        line_num: Set(1),
        product_id: Set(Uuid::new_v4()),
        uom_id: Set(uom_id),
        base_uom_id: Set(uom_id),
        quantity: Set(quantity),
        quantity_base: Set(quantity),
        unit_price: Set(unit_price),
        line_total: Set(line_total),
        quantity_received: Set(Decimal::ZERO),
        quantity_received_base: Set(Decimal::ZERO),
        quantity_invoiced: Set(Decimal::ZERO),
        quantity_invoiced_base: Set(Decimal::ZERO),
        quantity_returned: Set(Decimal::ZERO),
        quantity_returned_base: Set(Decimal::ZERO),
        amount_invoiced: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    SeededOrder { order, line }
}

pub struct SeededReceipt {
    pub receipt: goods_receipts::Model,
    pub line: goods_receipt_lines::Model,
}

/// Inserts a posted receipt against `order`'s line, bumps the line's received
/// counters, and moves the order to the receiving status the quantities
/// imply.
pub async fn seed_receipt(
    db: &DatabaseConnection,
    seeded: &SeededOrder,
    quantity: Decimal,
    unit_cost_base: Decimal,
) -> SeededReceipt {
    let now = Utc::now();
    let receipt_id = Uuid::new_v4();

    let receipt = goods_receipts::ActiveModel {
        id: Set(receipt_id),
        receipt_number: Set(format!(
            "GR.01001.26.{}",
            &receipt_id.simple().to_string()[..8]
        )),
        company_id: Set(seeded.order.company_id),
        branch_id: Set(seeded.order.branch_id),
        supplier_id: Set(seeded.order.supplier_id),
        currency_code: Set(seeded.order.currency_code.clone()),
        exchange_rate: Set(seeded.order.exchange_rate),
        status: Set(GoodsReceiptStatus::Posted),
        received_at: Set(now),
        notes: Set(None),
        created_by: Set(seeded.order.created_by),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let line = goods_receipt_lines::ActiveModel {
        id: Set(Uuid::new_v4()),
        goods_receipt_id: Set(receipt_id),
        purchase_order_line_id: Set(seeded.line.id),
        product_id: Set(seeded.line.product_id),
        quantity: Set(quantity),
        quantity_base: Set(quantity),
        unit_cost: Set(unit_cost_base),
        unit_cost_base: Set(unit_cost_base),
        quantity_invoiced: Set(Decimal::ZERO),
        quantity_invoiced_base: Set(Decimal::ZERO),
        quantity_returned: Set(Decimal::ZERO),
        quantity_returned_base: Set(Decimal::ZERO),
        amount_invoiced: Set(Decimal::ZERO),
        amount_returned: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let received = seeded.line.quantity_received + quantity;
    let mut po_line: purchase_order_lines::ActiveModel = seeded.line.clone().into();
    po_line.quantity_received = Set(received);
    po_line.quantity_received_base = Set(received);
    po_line.updated_at = Set(now);
    po_line.update(db).await.unwrap();

    let status = if received >= seeded.line.quantity {
        PurchaseOrderStatus::Received
    } else {
        PurchaseOrderStatus::PartiallyReceived
    };
    let mut order: purchase_orders::ActiveModel = seeded.order.clone().into();
    order.status = Set(status);
    order.updated_at = Set(now);
    order.update(db).await.unwrap();

    SeededReceipt { receipt, line }
}

pub async fn reload_po_line(
    db: &DatabaseConnection,
    id: Uuid,
) -> purchase_order_lines::Model {
    purchase_order_lines::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

pub async fn reload_grn_line(
    db: &DatabaseConnection,
    id: Uuid,
) -> goods_receipt_lines::Model {
    goods_receipt_lines::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

pub async fn reload_order(db: &DatabaseConnection, id: Uuid) -> purchase_orders::Model {
    purchase_orders::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

pub async fn audit_rows(db: &DatabaseConnection, entity_id: Uuid) -> Vec<audit_logs::Model> {
    audit_logs::Entity::find()
        .filter(audit_logs::Column::EntityId.eq(entity_id))
        .all(db)
        .await
        .unwrap()
}

pub async fn audit_actions(db: &DatabaseConnection, entity_id: Uuid) -> Vec<String> {
    audit_rows(db, entity_id)
        .await
        .into_iter()
        .map(|row| row.action)
        .collect()
}
