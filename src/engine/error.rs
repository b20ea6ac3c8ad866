use thiserror::Error;
use ulid::Ulid;

use crate::model::AppointmentStatus;

use super::policy::Action;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("{actor} may not {action} this appointment")]
    Unauthorized { actor: Ulid, action: Action },
    #[error("cannot {action} an appointment that is {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: Action,
    },
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("conflict with appointment: {0}")]
    Conflict(Ulid),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
}
