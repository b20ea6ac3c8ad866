use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::model::*;

use super::EngineError;

pub type SharedCalendar = Arc<RwLock<ResourceCalendar>>;
pub type CalendarWriteGuard = OwnedRwLockWriteGuard<ResourceCalendar>;

/// One lock per resource calendar. Holding the write guard is what makes
/// "check for overlap, then insert" atomic against every other booking on the
/// same resource, so the check must only ever run on a guard obtained from
/// [`ConflictGuard::lock`].
pub struct ConflictGuard {
    calendars: DashMap<ResourceId, SharedCalendar>,
}

impl Default for ConflictGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictGuard {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
        }
    }

    pub fn calendar(&self, resource: &ResourceId) -> Option<SharedCalendar> {
        self.calendars.get(resource).map(|e| e.value().clone())
    }

    /// The calendar for `resource`, created empty on first use. The DashMap
    /// entry is released before the caller awaits the lock.
    fn calendar_or_insert(&self, resource: ResourceId) -> SharedCalendar {
        self.calendars
            .entry(resource)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceCalendar::new(resource))))
            .value()
            .clone()
    }

    /// Exclusive access to one resource's calendar.
    pub async fn lock(&self, resource: ResourceId) -> CalendarWriteGuard {
        self.calendar_or_insert(resource).write_owned().await
    }

    pub fn calendars(&self) -> Vec<SharedCalendar> {
        self.calendars.iter().map(|e| e.value().clone()).collect()
    }
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::Validation("interval end must be after its start".into()));
    }
    Ok(())
}

/// Fails with the first active appointment overlapping `span`.
pub(crate) fn check_no_conflict(cal: &ResourceCalendar, span: &Span) -> Result<(), EngineError> {
    match cal.active_overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// A booking must start no earlier than now, on a date inside the
/// advance-booking window. Dates are compared the same way slot generation
/// compares them, so an offered slot is always bookable.
pub(crate) fn check_booking_window(
    settings: &ResourceSettings,
    start: WallTime,
    now: WallTime,
) -> Result<(), EngineError> {
    if start < now {
        return Err(EngineError::Validation("appointment must start in the future".into()));
    }
    let (earliest, latest) = settings.booking_window(now);
    let day = start.date();
    if day < earliest.date() {
        return Err(EngineError::Validation(format!(
            "bookings require {} minutes notice",
            settings.min_advance_minutes
        )));
    }
    if day > latest {
        return Err(EngineError::Validation(format!(
            "bookings open at most {} days ahead",
            settings.max_advance_days
        )));
    }
    Ok(())
}
