//! Who may do what to an appointment, and which status each action leads to.
//! Both are pure so they can be checked without touching storage.

use std::fmt;

use ulid::Ulid;

use crate::model::{Appointment, AppointmentStatus, ChangedBy};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Confirm,
    Cancel,
    Complete,
    MarkNoShow,
}

impl Action {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::Complete => "complete",
            Action::MarkNoShow => "mark_no_show",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MarkNoShow => f.write_str("mark as no-show"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Allowed, acting on behalf of the given side.
    Allow(ChangedBy),
    Deny,
}

/// The two people with standing on an appointment. `owner_id` is `None`
/// once the resource is no longer known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parties {
    pub customer_id: Ulid,
    pub owner_id: Option<Ulid>,
}

impl Parties {
    pub fn of(appointment: &Appointment, owner_id: Option<Ulid>) -> Self {
        Self {
            customer_id: appointment.customer_id,
            owner_id,
        }
    }
}

/// Owners may do everything; customers may only read and cancel their own
/// appointment. An owner booking with their own business acts as the owner.
pub fn policy(actor: Ulid, parties: &Parties, action: Action) -> Decision {
    let is_owner = parties.owner_id == Some(actor);
    let is_customer = actor == parties.customer_id;
    match action {
        Action::Read | Action::Cancel => {
            if is_owner {
                Decision::Allow(ChangedBy::Business)
            } else if is_customer {
                Decision::Allow(ChangedBy::Customer)
            } else {
                Decision::Deny
            }
        }
        Action::Confirm | Action::Complete | Action::MarkNoShow => {
            if is_owner {
                Decision::Allow(ChangedBy::Business)
            } else {
                Decision::Deny
            }
        }
    }
}

/// Pending → Confirmed → Completed; Pending|Confirmed → Cancelled | NoShow.
pub fn next_status(
    from: AppointmentStatus,
    action: Action,
) -> Result<AppointmentStatus, EngineError> {
    use AppointmentStatus::*;
    let to = match (from, action) {
        (Pending, Action::Confirm) => Confirmed,
        (Confirmed, Action::Complete) => Completed,
        (Pending | Confirmed, Action::Cancel) => Cancelled,
        (Pending | Confirmed, Action::MarkNoShow) => NoShow,
        _ => return Err(EngineError::InvalidTransition { from, action }),
    };
    Ok(to)
}
