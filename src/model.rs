use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Wall-clock date-time. One timezone per resource, never converted.
pub type WallTime = NaiveDateTime;

/// Weekday index, 0 = Monday … 6 = Sunday.
pub type DayIndex = u8;

pub fn day_index(date: NaiveDate) -> DayIndex {
    date.weekday().num_days_from_monday() as DayIndex
}

/// The bookable entity whose calendar is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScheduleOwner {
    Business(Ulid),
    Employee(Ulid),
}

/// Resources and schedule owners are the same thing.
pub type ResourceId = ScheduleOwner;

impl ScheduleOwner {
    pub fn id(&self) -> Ulid {
        match self {
            ScheduleOwner::Business(id) | ScheduleOwner::Employee(id) => *id,
        }
    }
}

impl fmt::Display for ScheduleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleOwner::Business(id) => write!(f, "business:{id}"),
            ScheduleOwner::Employee(id) => write!(f, "employee:{id}"),
        }
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: WallTime,
    pub end: WallTime,
}

impl Span {
    pub fn new(start: WallTime, end: WallTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_minutes(start: WallTime, minutes: i64) -> Self {
        Self::new(start, start + TimeDelta::minutes(minutes))
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: WallTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// Time-of-day range `[start, end)` with no date attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Anchor this range on a concrete date.
    pub fn on(&self, date: NaiveDate) -> Span {
        Span::new(date.and_time(self.start), date.and_time(self.end))
    }
}

/// Working hours for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day_of_week: DayIndex,
    pub is_open: bool,
    pub blocks: Vec<TimeRange>,
    pub breaks: Vec<TimeRange>,
}

impl DayPlan {
    pub fn open(day_of_week: DayIndex, block: TimeRange) -> Self {
        Self {
            day_of_week,
            is_open: true,
            blocks: vec![block],
            breaks: Vec::new(),
        }
    }

    pub fn closed(day_of_week: DayIndex) -> Self {
        Self {
            day_of_week,
            is_open: false,
            blocks: Vec::new(),
            breaks: Vec::new(),
        }
    }

    pub fn with_break(mut self, range: TimeRange) -> Self {
        self.breaks.push(range);
        self
    }
}

/// A resource's recurring week. At most one `DayPlan` per weekday.
/// Always written as a whole; there is no partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: Vec<DayPlan>,
}

impl WeeklySchedule {
    pub fn new(days: Vec<DayPlan>) -> Self {
        Self { days }
    }

    pub fn day(&self, day_of_week: DayIndex) -> Option<&DayPlan> {
        self.days.iter().find(|d| d.day_of_week == day_of_week)
    }
}

/// Per-business booking settings, supplied by the settings provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub slot_duration_minutes: u32,
    pub buffer_minutes: u32,
    pub min_advance_minutes: u32,
    pub max_advance_days: u32,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 30,
            buffer_minutes: 0,
            min_advance_minutes: 60,
            max_advance_days: 90,
        }
    }
}

impl ResourceSettings {
    /// Earliest instant and latest date a booking may start at, relative to `now`.
    /// Both saturate at the end of the representable calendar.
    pub fn booking_window(&self, now: WallTime) -> (WallTime, NaiveDate) {
        let earliest = now
            .checked_add_signed(TimeDelta::minutes(self.min_advance_minutes as i64))
            .unwrap_or(NaiveDateTime::MAX);
        let latest = now
            .checked_add_signed(TimeDelta::days(self.max_advance_days as i64))
            .map_or(NaiveDate::MAX, |t| t.date());
        (earliest, latest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments hold their interval on the calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the booking made a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangedBy {
    Customer,
    Business,
}

/// One entry of an appointment's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub previous: Option<AppointmentStatus>,
    pub new: AppointmentStatus,
    pub actor: Ulid,
    pub changed_by: ChangedBy,
    pub reason: Option<String>,
    pub at: WallTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub reference_number: String,
    pub customer_id: Ulid,
    pub business_id: Ulid,
    pub service_id: Ulid,
    pub employee_id: Option<Ulid>,
    pub span: Span,
    pub status: AppointmentStatus,
    /// Service price at booking time, in minor currency units.
    pub total_amount: i64,
    pub notes: Option<String>,
    pub created_at: WallTime,
    pub history: Vec<StatusChange>,
}

impl Appointment {
    /// The calendar this appointment occupies: the employee's if one was
    /// chosen, the business's otherwise.
    pub fn resource(&self) -> ResourceId {
        match self.employee_id {
            Some(id) => ScheduleOwner::Employee(id),
            None => ScheduleOwner::Business(self.business_id),
        }
    }

    /// Apply a status change and record it. Caller has validated the transition.
    pub fn record(&mut self, change: StatusChange) {
        self.status = change.new;
        self.history.push(change);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotReason {
    Past,
    Break,
    Conflict,
}

/// A candidate bookable interval. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub span: Span,
    pub available: bool,
    pub reason: Option<SlotReason>,
}

impl TimeSlot {
    pub fn available(span: Span) -> Self {
        Self {
            span,
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(span: Span, reason: SlotReason) -> Self {
        Self {
            span,
            available: false,
            reason: Some(reason),
        }
    }
}

/// Every appointment ever booked on one resource, sorted by `span.start`.
/// Appointments stay here after they leave the active states.
#[derive(Debug, Clone)]
pub struct ResourceCalendar {
    pub resource: ResourceId,
    pub appointments: Vec<Appointment>,
}

impl ResourceCalendar {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.span.start <= appointment.span.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn get(&self, id: &Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == *id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == *id)
    }

    /// Appointments of any status whose span overlaps the query window.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        // Everything at index >= right_bound starts at or after query.end.
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    /// Pending or confirmed appointments overlapping the query window.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        self.overlapping(query).filter(|a| a.status.is_active())
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Written by both create and replace: the schedule is stored whole.
    ScheduleSaved {
        owner: ScheduleOwner,
        schedule: WeeklySchedule,
    },
    ScheduleDeleted {
        owner: ScheduleOwner,
    },
    AppointmentCreated {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        resource: ResourceId,
        change: StatusChange,
    },
}
