use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::conflict::ConflictGuard;

/// In-memory projection of the event log.
pub struct InMemoryStore {
    schedules: DashMap<ScheduleOwner, WeeklySchedule>,
    pub(super) calendars: ConflictGuard,
    /// Reverse lookup: appointment id → resource whose calendar holds it.
    appointment_to_resource: DashMap<Ulid, ResourceId>,
    /// Issued reference numbers → appointment id.
    pub(super) references: DashMap<String, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            schedules: DashMap::new(),
            calendars: ConflictGuard::new(),
            appointment_to_resource: DashMap::new(),
            references: DashMap::new(),
        }
    }

    // ── Schedules ────────────────────────────────────────────

    pub fn get_schedule(&self, owner: &ScheduleOwner) -> Option<WeeklySchedule> {
        self.schedules.get(owner).map(|e| e.value().clone())
    }

    pub fn contains_schedule(&self, owner: &ScheduleOwner) -> bool {
        self.schedules.contains_key(owner)
    }

    pub fn schedules(&self) -> Vec<(ScheduleOwner, WeeklySchedule)> {
        self.schedules
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    // ── Appointment index ────────────────────────────────────

    pub fn get_resource_for_appointment(&self, id: &Ulid) -> Option<ResourceId> {
        self.appointment_to_resource.get(id).map(|e| *e.value())
    }

    pub fn appointment_count(&self) -> usize {
        self.appointment_to_resource.len()
    }

    // ── Event application ────────────────────────────────────

    /// Schedule events touch no calendar.
    pub fn apply_schedule_event(&self, event: &Event) {
        match event {
            // Whole-schedule write: whatever was stored before is dropped.
            Event::ScheduleSaved { owner, schedule } => {
                self.schedules.insert(*owner, schedule.clone());
            }
            Event::ScheduleDeleted { owner } => {
                self.schedules.remove(owner);
            }
            Event::AppointmentCreated { .. } | Event::AppointmentStatusChanged { .. } => {}
        }
    }

    /// Apply an appointment event to its calendar (caller holds the write lock).
    pub fn apply_to_calendar(&self, cal: &mut ResourceCalendar, event: &Event) {
        match event {
            Event::AppointmentCreated { appointment } => {
                self.appointment_to_resource
                    .insert(appointment.id, cal.resource);
                self.references
                    .insert(appointment.reference_number.clone(), appointment.id);
                cal.insert(appointment.clone());
            }
            Event::AppointmentStatusChanged { id, change, .. } => {
                if let Some(appointment) = cal.get_mut(id) {
                    appointment.record(change.clone());
                }
            }
            Event::ScheduleSaved { .. } | Event::ScheduleDeleted { .. } => {}
        }
    }
}

/// The calendar an event belongs to, if any.
pub(crate) fn event_resource(event: &Event) -> Option<ResourceId> {
    match event {
        Event::AppointmentCreated { appointment } => Some(appointment.resource()),
        Event::AppointmentStatusChanged { resource, .. } => Some(*resource),
        Event::ScheduleSaved { .. } | Event::ScheduleDeleted { .. } => None,
    }
}
