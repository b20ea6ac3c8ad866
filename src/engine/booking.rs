use dashmap::mapref::entry::Entry;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_booking_window, check_no_conflict, validate_span};
use super::policy::{Action, Decision, Parties, next_status, policy};
use super::{Engine, EngineError};

/// What a customer asks for when booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub business_id: Ulid,
    pub service_id: Ulid,
    /// Book a specific employee; `None` books the business calendar.
    pub employee_id: Option<Ulid>,
    pub start: WallTime,
    pub notes: Option<String>,
}

impl Engine {
    /// Book `request` for `customer_id`. The new appointment is `Pending`.
    ///
    /// The overlap check and the insert run under the resource's calendar
    /// lock, so of any set of concurrent overlapping requests exactly one
    /// commits and the rest fail with `Conflict`.
    pub async fn create_appointment(
        &self,
        request: BookingRequest,
        customer_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        if let Some(notes) = &request.notes
            && notes.chars().count() > MAX_NOTES_LEN
        {
            return Err(EngineError::Validation(format!(
                "notes exceed {MAX_NOTES_LEN} characters"
            )));
        }

        let service = self
            .ports
            .catalog
            .get_service(request.service_id)
            .await
            .filter(|s| s.business_id == request.business_id)
            .ok_or(EngineError::NotFound(request.service_id))?;
        if !(MIN_SERVICE_DURATION_MINUTES..=MAX_SERVICE_DURATION_MINUTES)
            .contains(&service.duration_minutes)
        {
            return Err(EngineError::Validation(format!(
                "service duration must be {MIN_SERVICE_DURATION_MINUTES}..={MAX_SERVICE_DURATION_MINUTES} minutes, got {}",
                service.duration_minutes
            )));
        }

        let resource = match request.employee_id {
            Some(employee_id) => ScheduleOwner::Employee(employee_id),
            None => ScheduleOwner::Business(request.business_id),
        };
        self.ports
            .resources
            .get(resource)
            .await
            .filter(|r| r.business_id == request.business_id)
            .ok_or(EngineError::NotFound(resource.id()))?;

        let settings = self.ports.settings.get(request.business_id).await;
        let now = self.ports.clock.now();
        check_booking_window(&settings, request.start, now)?;
        let span = Span::from_minutes(request.start, service.duration_minutes as i64);
        validate_span(&span)?;

        let _gate = self.write_gate().await;
        let mut cal = self.store.calendars.lock(resource).await;
        if cal.appointments.len() >= MAX_APPOINTMENTS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many appointments on resource"));
        }
        if let Err(e) = check_no_conflict(&cal, &span) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!("booking on {resource} at {} rejected: {e}", span.start);
            return Err(e);
        }

        let id = Ulid::new();
        let reference_number = self.reserve_reference(id)?;
        let appointment = Appointment {
            id,
            reference_number: reference_number.clone(),
            customer_id,
            business_id: request.business_id,
            service_id: request.service_id,
            employee_id: request.employee_id,
            span,
            status: AppointmentStatus::Pending,
            total_amount: service.price,
            notes: request.notes,
            created_at: now,
            history: vec![StatusChange {
                previous: None,
                new: AppointmentStatus::Pending,
                actor: customer_id,
                changed_by: ChangedBy::Customer,
                reason: None,
                at: now,
            }],
        };

        let event = Event::AppointmentCreated {
            appointment: appointment.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut cal, &event).await {
            self.store.references.remove(&reference_number);
            return Err(e);
        }
        metrics::counter!(observability::APPOINTMENTS_CREATED_TOTAL).increment(1);
        info!(
            "appointment {id} ({reference_number}) booked on {resource} for {}",
            span.start
        );
        Ok(appointment)
    }

    pub async fn confirm(&self, id: Ulid, actor: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, actor, Action::Confirm, None).await
    }

    pub async fn cancel(
        &self,
        id: Ulid,
        actor: Ulid,
        reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if let Some(reason) = &reason
            && reason.chars().count() > MAX_REASON_LEN
        {
            return Err(EngineError::Validation(format!(
                "reason exceeds {MAX_REASON_LEN} characters"
            )));
        }
        self.transition(id, actor, Action::Cancel, reason).await
    }

    pub async fn complete(&self, id: Ulid, actor: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, actor, Action::Complete, None).await
    }

    pub async fn mark_no_show(&self, id: Ulid, actor: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, actor, Action::MarkNoShow, None).await
    }

    /// Authorization is checked before the state guard: a caller without
    /// standing learns nothing about the appointment's status.
    async fn transition(
        &self,
        id: Ulid,
        actor: Ulid,
        action: Action,
        reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let resource = self
            .store
            .get_resource_for_appointment(&id)
            .ok_or(EngineError::NotFound(id))?;
        let owner_id = self.owner_of(resource).await;

        let _gate = self.write_gate().await;
        let mut cal = self.store.calendars.lock(resource).await;
        let current = cal.get(&id).ok_or(EngineError::NotFound(id))?;

        let changed_by = match policy(actor, &Parties::of(current, owner_id), action) {
            Decision::Allow(side) => side,
            Decision::Deny => {
                metrics::counter!(observability::POLICY_DENIALS_TOTAL, "action" => action.label())
                    .increment(1);
                debug!("{actor} denied {} on appointment {id}", action.label());
                return Err(EngineError::Unauthorized { actor, action });
            }
        };
        let previous = current.status;
        let new = next_status(previous, action)?;

        let event = Event::AppointmentStatusChanged {
            id,
            resource,
            change: StatusChange {
                previous: Some(previous),
                new,
                actor,
                changed_by,
                reason,
                at: self.ports.clock.now(),
            },
        };
        self.persist_and_apply(&mut cal, &event).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => action.label()).increment(1);
        info!("appointment {id}: {previous} -> {new} by {actor}");

        cal.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// The user who manages `resource`. A resource the lookup no longer knows
    /// has no owner, which leaves only the customer with standing.
    pub(super) async fn owner_of(&self, resource: ResourceId) -> Option<Ulid> {
        self.ports.resources.get(resource).await.map(|r| r.owner_id)
    }

    /// Draw a reference number nobody holds and claim it for `id`.
    fn reserve_reference(&self, id: Ulid) -> Result<String, EngineError> {
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let candidate = self.ports.references.next();
            if let Entry::Vacant(slot) = self.store.references.entry(candidate.clone()) {
                slot.insert(id);
                return Ok(candidate);
            }
            debug!("reference number {candidate} already issued, drawing again");
        }
        Err(EngineError::LimitExceeded("could not draw a unique reference number"))
    }
}
