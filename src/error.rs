// Error taxonomy for planning operations
//
// Validation and authorization errors block an action entirely, conflicts and
// referential errors are reported back to the caller with a readable message,
// and side-channel failures never reach this type at all (they are logged and
// counted by `observability`).

use std::fmt;
use thiserror::Error;

/// Uniqueness and concurrency conflicts surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    DuplicatePpmp { fiscal_year: i32, end_user: String },
    AlreadyApproved { ppmp_id: i64, user_id: i64 },
    DuplicateEmail(String),
    StaleWrite { entity: &'static str, id: i64 },
    ItemAlreadyInPurchaseRequest {
        ppmp_row_id: i64,
        lot_index: usize,
        item_index: usize,
    },
    AppAlreadyApproved { fiscal_year: i32 },
    SnapshotLocked { path: String },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::DuplicatePpmp {
                fiscal_year,
                end_user,
            } => write!(
                f,
                "A PPMP already exists for fiscal year {fiscal_year} and end user {end_user}"
            ),
            ConflictKind::AlreadyApproved { ppmp_id, user_id } => write!(
                f,
                "User {user_id} has already approved PPMP {ppmp_id}"
            ),
            ConflictKind::DuplicateEmail(email) => {
                write!(f, "A user with email {email} already exists")
            }
            ConflictKind::StaleWrite { entity, id } => write!(
                f,
                "{entity} {id} was modified by someone else; reload and try again"
            ),
            ConflictKind::ItemAlreadyInPurchaseRequest {
                ppmp_row_id,
                lot_index,
                item_index,
            } => write!(
                f,
                "Item {lot_index}-{item_index} of row {ppmp_row_id} is already in a purchase request"
            ),
            ConflictKind::AppAlreadyApproved { fiscal_year } => {
                write!(f, "The APP for fiscal year {fiscal_year} is already approved")
            }
            ConflictKind::SnapshotLocked { path } => {
                write!(f, "{path} is in use by another planner process")
            }
        }
    }
}

/// Failures raised by a record store or object storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not authorized to {action}: {reason}")]
    Unauthorized { action: String, reason: String },

    #[error("Cannot {action} while status is {status}")]
    InvalidTransition { action: String, status: String },

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Cannot delete {entity} {id}: it is referenced elsewhere")]
    Referential { entity: &'static str, id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl PlannerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PlannerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(action: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::Unauthorized {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(action: impl fmt::Display, status: impl fmt::Display) -> Self {
        PlannerError::InvalidTransition {
            action: action.to_string(),
            status: status.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        PlannerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PlannerError::Validation { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PlannerError::Unauthorized { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PlannerError::Conflict(_))
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Store(StoreError::Serialization(err))
    }
}

impl From<std::io::Error> for PlannerError {
    fn from(err: std::io::Error) -> Self {
        PlannerError::Store(StoreError::Io(err))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for PlannerError {
    fn from(err: sqlx::Error) -> Self {
        PlannerError::Store(StoreError::Database(err))
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
