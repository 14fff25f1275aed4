use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::OperationContext;
use crate::entities::audit_logs;
use crate::errors::ServiceError;

/// One audit trail entry, before persistence.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub changed_fields: Option<Value>,
    pub notes: Option<String>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Uuid,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            before_state: None,
            after_state: None,
            changed_fields: None,
            notes: None,
        }
    }

    pub fn states(mut self, before: Value, after: Value) -> Self {
        self.before_state = Some(before);
        self.after_state = Some(after);
        self
    }

    pub fn changed(mut self, fields: Value) -> Self {
        self.changed_fields = Some(fields);
        self
    }

    pub fn note(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Writes append-only audit rows on the caller's connection or transaction.
///
/// Audit rows share the transaction of the operation they describe, so a
/// failed insert rolls the whole operation back. Auditing can be switched off
/// per operation through [`OperationContext::audit_enabled`]; there is no
/// process-wide toggle.
#[derive(Clone, Debug, Default)]
pub struct Auditor;

impl Auditor {
    pub fn new() -> Self {
        Self
    }

    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &OperationContext,
        entry: AuditEntry,
    ) -> Result<(), ServiceError> {
        if !ctx.audit_enabled {
            return Ok(());
        }

        let row = audit_logs::ActiveModel {
            id: Set(Uuid::new_v4()),
            action: Set(entry.action),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            before_state: Set(entry.before_state),
            after_state: Set(entry.after_state),
            changed_fields: Set(entry.changed_fields),
            actor_id: Set(ctx.actor.id),
            actor_name: Set(ctx.actor.name.clone()),
            notes: Set(entry.notes),
            created_at: Set(Utc::now()),
        };
        row.insert(conn).await?;
        Ok(())
    }
}
