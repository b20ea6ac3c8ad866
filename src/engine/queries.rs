use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::compute_slots;
use super::policy::{Action, Decision, Parties, policy};
use super::{Engine, EngineError};

impl Engine {
    /// An appointment as seen by `requester`. Anyone but the customer and the
    /// resource owner gets `NotFound`, exactly as for a missing id.
    pub async fn read_appointment(&self, id: Ulid, requester: Ulid) -> Result<Appointment, EngineError> {
        let resource = self
            .store
            .get_resource_for_appointment(&id)
            .ok_or(EngineError::NotFound(id))?;
        let owner_id = self.owner_of(resource).await;
        let cal = self
            .store
            .calendars
            .calendar(&resource)
            .ok_or(EngineError::NotFound(id))?;
        let guard = cal.read().await;
        let appointment = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        match policy(requester, &Parties::of(appointment, owner_id), Action::Read) {
            Decision::Allow(_) => Ok(appointment.clone()),
            Decision::Deny => Err(EngineError::NotFound(id)),
        }
    }

    /// The customer's appointments, latest start first.
    pub async fn list_for_customer(
        &self,
        customer_id: Ulid,
        from: Option<WallTime>,
        to: Option<WallTime>,
    ) -> Vec<Appointment> {
        self.collect(|a| a.customer_id == customer_id, from, to).await
    }

    /// Every appointment of a business, on its own calendar and its
    /// employees', latest start first. Only the business owner may list.
    pub async fn list_for_business(
        &self,
        business_id: Ulid,
        requester: Ulid,
        from: Option<WallTime>,
        to: Option<WallTime>,
    ) -> Result<Vec<Appointment>, EngineError> {
        if self.owner_of(ScheduleOwner::Business(business_id)).await != Some(requester) {
            return Err(EngineError::NotFound(business_id));
        }
        Ok(self.collect(|a| a.business_id == business_id, from, to).await)
    }

    async fn collect(
        &self,
        keep: impl Fn(&Appointment) -> bool,
        from: Option<WallTime>,
        to: Option<WallTime>,
    ) -> Vec<Appointment> {
        let in_range = |a: &Appointment| {
            from.is_none_or(|f| a.span.start >= f) && to.is_none_or(|t| a.span.start <= t)
        };
        let mut found = Vec::new();
        for cal in self.store.calendars.calendars() {
            let guard = cal.read().await;
            found.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| keep(a) && in_range(a))
                    .cloned(),
            );
        }
        found.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(b.id.cmp(&a.id)));
        found
    }

    /// Slots for booking `service_id` on `date`, against the employee's
    /// calendar when one is given and the business's otherwise. An employee
    /// without a schedule of their own works the business hours. Anything
    /// that cannot be resolved yields no slots.
    pub async fn available_slots(
        &self,
        business_id: Ulid,
        service_id: Ulid,
        employee_id: Option<Ulid>,
        date: NaiveDate,
    ) -> Vec<TimeSlot> {
        let Some(service) = self
            .ports
            .catalog
            .get_service(service_id)
            .await
            .filter(|s| s.business_id == business_id)
        else {
            return Vec::new();
        };
        let business = ScheduleOwner::Business(business_id);
        let resource = employee_id.map_or(business, ScheduleOwner::Employee);
        let known = self
            .ports
            .resources
            .get(resource)
            .await
            .is_some_and(|r| r.business_id == business_id);
        if !known {
            return Vec::new();
        }
        let Some(schedule) = self
            .store
            .get_schedule(&resource)
            .or_else(|| self.store.get_schedule(&business))
        else {
            return Vec::new();
        };
        let settings = self.ports.settings.get(business_id).await;

        // Snapshot of the day's bookings; the lock is released before slot
        // generation runs.
        let day = Span {
            start: date.and_time(chrono::NaiveTime::MIN),
            end: date.and_time(chrono::NaiveTime::MIN) + chrono::TimeDelta::days(1),
        };
        let existing: Vec<Appointment> = match self.store.calendars.calendar(&resource) {
            Some(cal) => cal.read().await.overlapping(&day).cloned().collect(),
            None => Vec::new(),
        };

        let now = self.ports.clock.now();
        let slots: Vec<TimeSlot> = compute_slots(
            &schedule,
            &settings,
            date,
            service.duration_minutes,
            &existing,
            now,
        )
        .collect();
        metrics::histogram!(observability::SLOTS_GENERATED).record(slots.len() as f64);
        slots
    }
}
