//! Generic document lifecycle state machine.
//!
//! Each document type declares a static [`TransitionTable`]; the
//! [`StateMachineEngine`] executes transitions against it inside the caller's
//! database transaction: authorization, guard evaluation, status persistence,
//! audit logging, hooks, and event publication all happen atomically with the
//! surrounding business mutation.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::audit::{AuditEntry, Auditor};
use crate::auth::{AbilityCheck, AuthorizationGate, OperationContext};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub mod documents;
mod transition;

pub use documents::abilities;

pub use transition::{Guard, Transition, TransitionTable};

/// A persisted document governed by a transition table.
#[async_trait]
pub trait StateDocument: Clone + Send + Sync + Sized + 'static {
    type Status: Copy + Eq + Display + Send + Sync + 'static;

    const ENTITY_TYPE: &'static str;

    fn id(&self) -> Uuid;
    fn status(&self) -> Self::Status;
    fn created_by(&self) -> Option<Uuid>;
    fn transitions() -> &'static TransitionTable<Self>;

    /// Persists `to` on the row identified by `id` and returns the refreshed
    /// model.
    ///
    /// The write is conditional on the persisted row still being in `from`:
    /// when a concurrent transition got there first, the caller's snapshot is
    /// stale and the write must fail with
    /// [`ServiceError::ConcurrentModification`] instead of overwriting.
    async fn write_status(
        txn: &DatabaseTransaction,
        id: Uuid,
        from: Self::Status,
        to: Self::Status,
    ) -> Result<Self, ServiceError>;
}

/// Hooks run around a transition, on the same transaction. `before_any` and
/// `after_any` fire for every edge of the document type; `before` and `after`
/// receive the edge and match on it when only specific transitions need work.
#[async_trait]
pub trait TransitionHooks<D: StateDocument>: Send + Sync {
    async fn before_any(
        &self,
        txn: &DatabaseTransaction,
        doc: &D,
        from: D::Status,
        to: D::Status,
    ) -> Result<(), ServiceError> {
        let _ = (txn, doc, from, to);
        Ok(())
    }

    async fn before(
        &self,
        txn: &DatabaseTransaction,
        doc: &D,
        from: D::Status,
        to: D::Status,
    ) -> Result<(), ServiceError> {
        let _ = (txn, doc, from, to);
        Ok(())
    }

    async fn after_any(
        &self,
        txn: &DatabaseTransaction,
        doc: &D,
        from: D::Status,
        to: D::Status,
    ) -> Result<(), ServiceError> {
        let _ = (txn, doc, from, to);
        Ok(())
    }

    async fn after(
        &self,
        txn: &DatabaseTransaction,
        doc: &D,
        from: D::Status,
        to: D::Status,
    ) -> Result<(), ServiceError> {
        let _ = (txn, doc, from, to);
        Ok(())
    }
}

/// Hook set that does nothing.
pub struct NoHooks;

impl<D: StateDocument> TransitionHooks<D> for NoHooks {}

/// Generic transition executor shared by every document service.
#[derive(Clone)]
pub struct StateMachineEngine {
    gate: Arc<dyn AuthorizationGate>,
    auditor: Arc<Auditor>,
    event_sender: Option<EventSender>,
}

impl StateMachineEngine {
    pub fn new(
        gate: Arc<dyn AuthorizationGate>,
        auditor: Arc<Auditor>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            gate,
            auditor,
            event_sender,
        }
    }

    /// Moves `doc` to `target`.
    ///
    /// Transitioning to the current status is an idempotent no-op. An
    /// undeclared edge fails with [`ServiceError::InvalidTransition`], a
    /// rejected guard with the same kind, and a gate denial with
    /// [`ServiceError::Forbidden`]. The status write is conditional on the
    /// persisted row still matching `doc`'s status, so a transition replayed
    /// from a stale snapshot fails with
    /// [`ServiceError::ConcurrentModification`]. Everything else executes
    /// atomically on `txn`: hooks, status write, audit row, event.
    pub async fn transition_to<D, H>(
        &self,
        txn: &DatabaseTransaction,
        doc: &D,
        target: D::Status,
        ctx: &OperationContext,
        hooks: &H,
    ) -> Result<D, ServiceError>
    where
        D: StateDocument,
        H: TransitionHooks<D>,
    {
        let current = doc.status();
        if current == target {
            return Ok(doc.clone());
        }

        let table = D::transitions();
        let transition = table.find(current, target).ok_or_else(|| {
            ServiceError::InvalidTransition(format!(
                "{} {} -> {}",
                D::ENTITY_TYPE,
                current,
                target
            ))
        })?;

        self.authorize(transition, doc, ctx).await?;

        hooks.before_any(txn, doc, current, target).await?;
        hooks.before(txn, doc, current, target).await?;

        let updated = D::write_status(txn, doc.id(), current, target).await?;

        self.auditor
            .record(
                txn,
                ctx,
                AuditEntry::new("status_changed", D::ENTITY_TYPE, doc.id())
                    .states(
                        json!({ "status": current.to_string() }),
                        json!({ "status": target.to_string() }),
                    )
                    .changed(json!(["status"])),
            )
            .await?;

        hooks.after_any(txn, &updated, current, target).await?;
        hooks.after(txn, &updated, current, target).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::DocumentStatusChanged {
                    entity_type: D::ENTITY_TYPE.to_string(),
                    entity_id: doc.id(),
                    from_status: current.to_string(),
                    to_status: target.to_string(),
                    actor_id: ctx.actor.id,
                })
                .await;
        }

        debug!(
            entity = D::ENTITY_TYPE,
            id = %doc.id(),
            "transitioned {} -> {}",
            current,
            target
        );

        Ok(updated)
    }

    /// True when a transition to `target` would currently be accepted.
    pub async fn can_transition_to<D>(
        &self,
        doc: &D,
        target: D::Status,
        ctx: &OperationContext,
    ) -> bool
    where
        D: StateDocument,
    {
        let current = doc.status();
        if current == target {
            return true;
        }
        match D::transitions().find(current, target) {
            Some(t) => self.authorize(t, doc, ctx).await.is_ok(),
            None => false,
        }
    }

    /// Target statuses reachable from the document's current status by this
    /// actor. Drives UI affordances without duplicating authorization logic.
    pub async fn allowed_transitions<D>(&self, doc: &D, ctx: &OperationContext) -> Vec<D::Status>
    where
        D: StateDocument,
    {
        let mut allowed = Vec::new();
        for transition in D::transitions().leaving(doc.status()) {
            if self.authorize(transition, doc, ctx).await.is_ok() {
                allowed.push(transition.to);
            }
        }
        allowed
    }

    async fn authorize<D>(
        &self,
        transition: &Transition<D>,
        doc: &D,
        ctx: &OperationContext,
    ) -> Result<(), ServiceError>
    where
        D: StateDocument,
    {
        if let Some(ability) = transition.ability {
            let check = AbilityCheck {
                ability,
                entity_type: D::ENTITY_TYPE,
                entity_id: doc.id(),
                document_created_by: doc.created_by(),
                from_status: transition.from.to_string(),
                to_status: transition.to.to_string(),
            };
            self.gate.allows(&check, ctx).await?;
        }

        if !transition.guard.check(doc) {
            return Err(ServiceError::InvalidTransition(format!(
                "{} {} -> {}: guard rejected",
                D::ENTITY_TYPE,
                transition.from,
                transition.to
            )));
        }

        Ok(())
    }
}
