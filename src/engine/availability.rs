use chrono::{NaiveDate, TimeDelta};

use crate::model::*;

// ── Slot Generation ───────────────────────────────────────────────

/// Turn a weekly schedule into the candidate slots for one date.
///
/// Slots sit on a fixed grid: starting at the day's open time, every
/// `service_duration + buffer` minutes, for as long as a full service fits
/// before close. The grid never shifts around breaks or bookings; a blocked
/// candidate is reported as unavailable and the cursor moves on.
///
/// Only the first time block of the day is used.
///
/// A closed day, a missing day plan, or a date outside the advance-booking
/// window yields no slots at all.
pub fn compute_slots<'a>(
    schedule: &'a WeeklySchedule,
    settings: &ResourceSettings,
    date: NaiveDate,
    service_duration_minutes: u32,
    existing: &'a [Appointment],
    now: WallTime,
) -> Slots<'a> {
    let Some(plan) = schedule.day(day_index(date)) else {
        return Slots::empty(date, now);
    };
    if !plan.is_open || service_duration_minutes == 0 {
        return Slots::empty(date, now);
    }

    let (earliest, latest) = settings.booking_window(now);
    if date < earliest.date() || date > latest {
        return Slots::empty(date, now);
    }

    let Some(block) = plan.blocks.first().filter(|b| b.is_valid()) else {
        return Slots::empty(date, now);
    };

    let duration = TimeDelta::minutes(service_duration_minutes as i64);
    let step = duration + TimeDelta::minutes(settings.buffer_minutes as i64);
    Slots {
        date,
        cursor: date.and_time(block.start),
        close: date.and_time(block.end),
        duration,
        step,
        breaks: &plan.breaks,
        existing,
        now,
    }
}

/// Lazily generated slots for one day. Finite; consumed once.
pub struct Slots<'a> {
    date: NaiveDate,
    cursor: WallTime,
    close: WallTime,
    duration: TimeDelta,
    step: TimeDelta,
    breaks: &'a [TimeRange],
    existing: &'a [Appointment],
    now: WallTime,
}

impl Slots<'_> {
    fn empty(date: NaiveDate, now: WallTime) -> Self {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        Self {
            date,
            cursor: midnight,
            close: midnight,
            duration: TimeDelta::minutes(1),
            step: TimeDelta::minutes(1),
            breaks: &[],
            existing: &[],
            now,
        }
    }

    fn classify(&self, span: Span) -> TimeSlot {
        if span.start < self.now {
            return TimeSlot::unavailable(span, SlotReason::Past);
        }
        let in_break = self
            .breaks
            .iter()
            .filter(|b| b.is_valid())
            .any(|b| b.on(self.date).overlaps(&span));
        if in_break {
            return TimeSlot::unavailable(span, SlotReason::Break);
        }
        let taken = self
            .existing
            .iter()
            .any(|a| a.status.is_active() && a.span.overlaps(&span));
        if taken {
            return TimeSlot::unavailable(span, SlotReason::Conflict);
        }
        TimeSlot::available(span)
    }
}

impl Iterator for Slots<'_> {
    type Item = TimeSlot;

    fn next(&mut self) -> Option<TimeSlot> {
        let end = self.cursor + self.duration;
        if end > self.close {
            return None;
        }
        let span = Span::new(self.cursor, end);
        self.cursor += self.step;
        Some(self.classify(span))
    }
}
