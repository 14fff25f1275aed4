//! Lifecycle tests for the document state machine and the purchase order
//! service built on it.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::TransactionTrait;

use procure_api::audit::Auditor;
use procure_api::auth::AllowAllGate;
use procure_api::entities::purchase_orders::PurchaseOrderStatus;
use procure_api::errors::ServiceError;
use procure_api::services::purchase_orders::{CreatePurchaseOrder, PurchaseOrderLineInput};
use procure_api::state_machine::{NoHooks, StateMachineEngine};

use common::{actor, ctx, seed_order, setup, setup_with};

fn order_input() -> CreatePurchaseOrder {
    let uom_id = uuid::Uuid::new_v4();
    CreatePurchaseOrder {
        company_id: 1,
        branch_id: 1,
        supplier_id: uuid::Uuid::new_v4(),
        currency_code: "USD".into(),
        exchange_rate: dec!(1),
        order_date: None,
        tax_total: dec!(0),
        notes: None,
        lines: vec![PurchaseOrderLineInput {
            product_id: uuid::Uuid::new_v4(),
            uom_id,
            base_uom_id: uom_id,
            quantity: dec!(100),
            unit_price: dec!(10),
        }],
    }
}

#[tokio::test]
async fn draft_cannot_jump_to_closed() {
    let app = setup().await;
    let maker = actor("maker");
    let seeded = seed_order(&app.db, PurchaseOrderStatus::Draft, dec!(10), dec!(1), maker.id).await;

    let engine = StateMachineEngine::new(Arc::new(AllowAllGate), Arc::new(Auditor::new()), None);
    let txn = app.db.begin().await.unwrap();
    let err = engine
        .transition_to(
            &txn,
            &seeded.order,
            PurchaseOrderStatus::Closed,
            &ctx(&maker),
            &NoHooks,
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidTransition(_));
}

#[tokio::test]
async fn transition_to_current_status_is_a_noop() {
    let app = setup().await;
    let maker = actor("maker");
    let seeded = seed_order(&app.db, PurchaseOrderStatus::Draft, dec!(10), dec!(1), maker.id).await;

    let engine = StateMachineEngine::new(Arc::new(AllowAllGate), Arc::new(Auditor::new()), None);
    let txn = app.db.begin().await.unwrap();
    let unchanged = engine
        .transition_to(
            &txn,
            &seeded.order,
            PurchaseOrderStatus::Draft,
            &ctx(&maker),
            &NoHooks,
        )
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(unchanged.status, PurchaseOrderStatus::Draft);
    // No transition happened, so no audit trail either.
    assert!(common::audit_actions(&app.db, seeded.order.id).await.is_empty());
}

#[tokio::test]
async fn approve_stamps_approver_and_audits() {
    let app = setup().await;
    let maker = actor("maker");
    let checker = actor("checker");

    let created = app
        .services
        .purchase_orders
        .create(order_input(), &ctx(&maker))
        .await
        .unwrap();
    assert_eq!(created.order.status, PurchaseOrderStatus::Draft);
    assert_eq!(created.order.total_amount, dec!(1000.00));

    let approved = app
        .services
        .purchase_orders
        .approve(created.order.id, &ctx(&checker))
        .await
        .unwrap();
    assert_eq!(approved.status, PurchaseOrderStatus::Approved);
    assert_eq!(approved.approved_by, Some(checker.id));
    assert!(approved.approved_at.is_some());

    let sent = app
        .services
        .purchase_orders
        .send(approved.id, &ctx(&checker))
        .await
        .unwrap();
    assert_eq!(sent.status, PurchaseOrderStatus::Sent);

    let actions = common::audit_actions(&app.db, created.order.id).await;
    assert!(actions.iter().any(|a| a == "created"));
    assert_eq!(actions.iter().filter(|a| *a == "status_changed").count(), 2);
}

#[tokio::test]
async fn maker_checker_blocks_self_approval() {
    let app = setup_with(true).await;
    let maker = actor("maker");
    let checker = actor("checker");

    let created = app
        .services
        .purchase_orders
        .create(order_input(), &ctx(&maker))
        .await
        .unwrap();

    let err = app
        .services
        .purchase_orders
        .approve(created.order.id, &ctx(&maker))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // A different actor passes.
    let approved = app
        .services
        .purchase_orders
        .approve(created.order.id, &ctx(&checker))
        .await
        .unwrap();
    assert_eq!(approved.status, PurchaseOrderStatus::Approved);
}

#[tokio::test]
async fn zero_value_order_fails_the_approval_guard() {
    let app = setup().await;
    let maker = actor("maker");
    let mut input = order_input();
    input.lines[0].unit_price = dec!(0);

    let created = app
        .services
        .purchase_orders
        .create(input, &ctx(&maker))
        .await
        .unwrap();

    let err = app
        .services
        .purchase_orders
        .approve(created.order.id, &ctx(&maker))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));
}

#[tokio::test]
async fn allowed_transitions_reflect_the_current_status() {
    let app = setup().await;
    let maker = actor("maker");

    let created = app
        .services
        .purchase_orders
        .create(order_input(), &ctx(&maker))
        .await
        .unwrap();

    let from_draft = app
        .services
        .purchase_orders
        .allowed_transitions(created.order.id, &ctx(&maker))
        .await
        .unwrap();
    assert!(from_draft.contains(&PurchaseOrderStatus::Approved));
    assert!(from_draft.contains(&PurchaseOrderStatus::Cancelled));
    assert!(!from_draft.contains(&PurchaseOrderStatus::Closed));

    app.services
        .purchase_orders
        .cancel(created.order.id, &ctx(&maker))
        .await
        .unwrap();
    let from_cancelled = app
        .services
        .purchase_orders
        .allowed_transitions(created.order.id, &ctx(&maker))
        .await
        .unwrap();
    assert!(from_cancelled.is_empty());
}

#[tokio::test]
async fn draft_orders_are_editable_and_deletable() {
    let app = setup().await;
    let maker = actor("maker");

    let created = app
        .services
        .purchase_orders
        .create(order_input(), &ctx(&maker))
        .await
        .unwrap();
    app.services
        .purchase_orders
        .delete(created.order.id, &ctx(&maker))
        .await
        .unwrap();
    assert!(app
        .services
        .purchase_orders
        .get(created.order.id)
        .await
        .unwrap()
        .is_none());

    // Past draft, mutation is refused.
    let approved = app
        .services
        .purchase_orders
        .create(order_input(), &ctx(&maker))
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve(approved.order.id, &ctx(&maker))
        .await
        .unwrap();
    let err = app
        .services
        .purchase_orders
        .delete(approved.order.id, &ctx(&maker))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}
