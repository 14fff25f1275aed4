use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Unified error type for the purchasing services and the document state
/// machine.
///
/// The variants are deliberately coarse: callers need to distinguish
/// validation problems, balance violations, state errors, and authorization
/// denials (each of which is recoverable in a different way), but not much
/// more than that.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input caught before any mutation. The message is user-facing.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Quantity or amount beyond the remaining receipt/order balance.
    /// Raised both at draft time and again at post time against locked rows.
    #[error("Balance exceeded: {0}")]
    BalanceExceeded(String),

    /// Document is not in the status the requested operation requires.
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// No transition is declared between the current and target status.
    #[error("Transition not allowed: {0}")]
    InvalidTransition(String),

    /// Denied by the authorization gate. Kept distinct from state errors so
    /// callers can render "forbidden" vs "invalid request" differently.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// True for error kinds the caller may surface to an end user verbatim.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::BalanceExceeded(_)
                | Self::InvalidStatus(_)
                | Self::InvalidTransition(_)
                | Self::Forbidden(_)
                | Self::NotFound(_)
                | Self::InvalidOperation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_error_accepts_strings_and_dberr() {
        let from_str = ServiceError::db_error("boom");
        assert!(matches!(from_str, ServiceError::DatabaseError(_)));

        let from_dberr = ServiceError::db_error(DbErr::Custom("x".into()));
        assert!(matches!(from_dberr, ServiceError::DatabaseError(_)));
    }

    #[test]
    fn internal_errors_are_not_user_facing() {
        assert!(ServiceError::BalanceExceeded("over".into()).is_user_facing());
        assert!(ServiceError::Forbidden("nope".into()).is_user_facing());
        assert!(!ServiceError::InternalError("leak".into()).is_user_facing());
        assert!(!ServiceError::db_error("oops").is_user_facing());
    }
}
