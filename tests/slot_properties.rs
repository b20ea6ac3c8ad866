use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use proptest::prelude::*;
use ulid::Ulid;

use turnos::engine::compute_slots;
use turnos::model::*;
use turnos::ports::{FixedClock, MemoryDirectory, Ports, ServiceInfo};
use turnos::{BookingRequest, Engine, EngineError};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
}

fn minutes(m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap()
}

fn on_monday(m: u32) -> NaiveDateTime {
    monday().and_time(minutes(m))
}

fn settings(buffer: u32) -> ResourceSettings {
    ResourceSettings {
        slot_duration_minutes: 30,
        buffer_minutes: buffer,
        min_advance_minutes: 0,
        max_advance_days: 30,
    }
}

/// Open and close as minutes after midnight, close > open.
fn working_hours() -> impl Strategy<Value = (u32, u32)> {
    (0u32..20 * 60).prop_flat_map(|open| (Just(open), (open + 1)..=(23 * 60 + 59)))
}

fn appointments() -> impl Strategy<Value = Vec<Appointment>> {
    let one = (0u32..23 * 60, 1u32..180, any::<bool>()).prop_map(|(start, len, active)| {
        let start = on_monday(start);
        Appointment {
            id: Ulid::new(),
            reference_number: String::new(),
            customer_id: Ulid::new(),
            business_id: Ulid::nil(),
            service_id: Ulid::nil(),
            employee_id: None,
            span: Span::new(start, start + TimeDelta::minutes(len as i64)),
            status: if active {
                AppointmentStatus::Confirmed
            } else {
                AppointmentStatus::Cancelled
            },
            total_amount: 0,
            notes: None,
            created_at: start,
            history: Vec::new(),
        }
    });
    prop::collection::vec(one, 0..8)
}

proptest! {
    #[test]
    fn slots_sit_on_a_fixed_grid(
        (open, close) in working_hours(),
        duration in 1u32..240,
        buffer in 0u32..60,
        existing in appointments(),
    ) {
        let schedule = WeeklySchedule::new(vec![DayPlan::open(
            0,
            TimeRange::new(minutes(open), minutes(close)),
        )]);
        let now = on_monday(0) - TimeDelta::hours(1);
        let slots: Vec<TimeSlot> =
            compute_slots(&schedule, &settings(buffer), monday(), duration, &existing, now).collect();

        let step = (duration + buffer) as i64;
        let span = (close - open) as i64;
        let expected = if span < duration as i64 { 0 } else { (span - duration as i64) / step + 1 };
        prop_assert_eq!(slots.len() as i64, expected);

        for (i, slot) in slots.iter().enumerate() {
            let start = on_monday(open) + TimeDelta::minutes(step * i as i64);
            prop_assert_eq!(slot.span.start, start);
            prop_assert_eq!(slot.span.duration(), TimeDelta::minutes(duration as i64));
            prop_assert!(slot.span.end <= on_monday(close));
        }
    }

    #[test]
    fn available_slots_never_overlap_active_bookings_or_breaks(
        duration in 5u32..120,
        existing in appointments(),
        break_start in 9u32 * 60..16 * 60,
        break_len in 1u32..90,
        now_offset in 0u32..24 * 60,
    ) {
        let rest = TimeRange::new(minutes(break_start), minutes(break_start + break_len));
        let schedule = WeeklySchedule::new(vec![
            DayPlan::open(0, TimeRange::new(minutes(8 * 60), minutes(18 * 60))).with_break(rest),
        ]);
        let now = on_monday(0) + TimeDelta::minutes(now_offset as i64);
        for slot in compute_slots(&schedule, &settings(0), monday(), duration, &existing, now) {
            if !slot.available {
                continue;
            }
            prop_assert!(slot.span.start >= now);
            prop_assert!(!slot.span.overlaps(&rest.on(monday())));
            for a in existing.iter().filter(|a| a.status.is_active()) {
                prop_assert!(!slot.span.overlaps(&a.span));
            }
        }
    }

    #[test]
    fn identical_inputs_give_identical_slots(
        (open, close) in working_hours(),
        duration in 1u32..120,
        buffer in 0u32..30,
        existing in appointments(),
        now_offset in 0u32..24 * 60,
    ) {
        let schedule = WeeklySchedule::new(vec![DayPlan::open(
            0,
            TimeRange::new(minutes(open), minutes(close)),
        )]);
        let now = on_monday(0) + TimeDelta::minutes(now_offset as i64);
        let first: Vec<TimeSlot> =
            compute_slots(&schedule, &settings(buffer), monday(), duration, &existing, now).collect();
        let second: Vec<TimeSlot> =
            compute_slots(&schedule, &settings(buffer), monday(), duration, &existing, now).collect();
        prop_assert_eq!(first, second);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Book { start: u32 },
    CancelNth(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => (8u32 * 60..17 * 60).prop_map(|start| Op::Book { start }),
        1 => (0usize..16).prop_map(Op::CancelNth),
    ];
    prop::collection::vec(op, 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn active_appointments_never_overlap(ops in ops(), duration in 15u32..90) {
        tokio_test::block_on(async move {
            let directory = Arc::new(MemoryDirectory::new());
            let (business, owner, service) = (Ulid::new(), Ulid::new(), Ulid::new());
            directory.add_business(business, owner);
            directory.add_service(service, ServiceInfo { business_id: business, duration_minutes: duration, price: 0 });
            let clock = Arc::new(FixedClock::new(on_monday(0)));
            let dir = std::env::temp_dir().join("turnos_test_props");
            std::fs::create_dir_all(&dir).unwrap();
            let engine = Engine::new(dir.join(format!("{}.wal", Ulid::new())), 64, Ports::in_memory(directory, clock))
                .await
                .unwrap();

            let mut booked = Vec::new();
            for op in ops {
                match op {
                    Op::Book { start } => {
                        let request = BookingRequest {
                            business_id: business,
                            service_id: service,
                            employee_id: None,
                            start: on_monday(start),
                            notes: None,
                        };
                        match engine.create_appointment(request, Ulid::new()).await {
                            Ok(a) => booked.push(a.id),
                            Err(EngineError::Conflict(_)) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    Op::CancelNth(n) => {
                        if let Some(id) = booked.get(n) {
                            // Already-cancelled appointments answer InvalidTransition.
                            let _ = engine.cancel(*id, owner, None).await;
                        }
                    }
                }
            }

            let all = engine.list_for_business(business, owner, None, None).await.unwrap();
            let active: Vec<&Appointment> = all.iter().filter(|a| a.status.is_active()).collect();
            for (i, a) in active.iter().enumerate() {
                for b in &active[i + 1..] {
                    assert!(!a.span.overlaps(&b.span), "{:?} overlaps {:?}", a.span, b.span);
                }
            }
        });
    }
}
