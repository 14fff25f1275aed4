use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ServiceError;

/// The user or system principal performing an operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Well-known actor for scheduled/system-driven mutations.
    pub fn system() -> Self {
        Self {
            id: Uuid::nil(),
            name: "system".to_string(),
        }
    }
}

/// Per-operation context threaded through services, the state machine and the
/// audit trail. Replaces any process-global flags: auditing and maker-checker
/// enforcement are scoped to the operation that carries this value.
#[derive(Clone, Debug)]
pub struct OperationContext {
    pub actor: Actor,
    pub enforce_maker_checker: bool,
    pub audit_enabled: bool,
    pub meta: Value,
}

impl OperationContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            enforce_maker_checker: false,
            audit_enabled: true,
            meta: Value::Null,
        }
    }

    pub fn with_maker_checker(mut self, enforce: bool) -> Self {
        self.enforce_maker_checker = enforce;
        self
    }

    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Everything the authorization gate gets to see about a transition attempt.
#[derive(Clone, Debug)]
pub struct AbilityCheck<'a> {
    pub ability: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Uuid,
    pub document_created_by: Option<Uuid>,
    pub from_status: String,
    pub to_status: String,
}

/// External authorization boundary. A denial must surface as
/// [`ServiceError::Forbidden`] so callers can distinguish it from state
/// errors.
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn allows(
        &self,
        check: &AbilityCheck<'_>,
        ctx: &OperationContext,
    ) -> Result<(), ServiceError>;
}

/// Gate that approves every ability. Useful for tests and single-user setups.
#[derive(Debug, Default)]
pub struct AllowAllGate;

#[async_trait]
impl AuthorizationGate for AllowAllGate {
    async fn allows(
        &self,
        _check: &AbilityCheck<'_>,
        _ctx: &OperationContext,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Gate enforcing the maker-checker rule: when the operation context demands
/// it, the actor exercising a guarded ability must not be the document's
/// creator. Abilities are only attached to sensitive edges (approve, send,
/// cancel, post), so the rule applies exactly there.
#[derive(Debug, Default)]
pub struct MakerCheckerGate;

#[async_trait]
impl AuthorizationGate for MakerCheckerGate {
    async fn allows(
        &self,
        check: &AbilityCheck<'_>,
        ctx: &OperationContext,
    ) -> Result<(), ServiceError> {
        if ctx.enforce_maker_checker && check.document_created_by == Some(ctx.actor.id) {
            return Err(ServiceError::Forbidden(format!(
                "{} requires a different actor than the document creator",
                check.ability
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<'a>(created_by: Uuid) -> AbilityCheck<'a> {
        AbilityCheck {
            ability: "purchase_order.approve",
            entity_type: "purchase_order",
            entity_id: Uuid::new_v4(),
            document_created_by: Some(created_by),
            from_status: "Draft".into(),
            to_status: "Approved".into(),
        }
    }

    #[tokio::test]
    async fn maker_checker_denies_self_approval() {
        let actor = Actor::new(Uuid::new_v4(), "maker");
        let ctx = OperationContext::new(actor.clone()).with_maker_checker(true);
        let gate = MakerCheckerGate;

        let denied = gate.allows(&check(actor.id), &ctx).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn maker_checker_allows_other_actor_or_when_disabled() {
        let maker = Uuid::new_v4();
        let checker = Actor::new(Uuid::new_v4(), "checker");
        let gate = MakerCheckerGate;

        let enforced = OperationContext::new(checker.clone()).with_maker_checker(true);
        assert!(gate.allows(&check(maker), &enforced).await.is_ok());

        let relaxed = OperationContext::new(Actor::new(maker, "maker"));
        assert!(gate.allows(&check(maker), &relaxed).await.is_ok());
    }
}
