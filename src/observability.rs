use std::net::SocketAddr;

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: appointments committed.
pub const APPOINTMENTS_CREATED_TOTAL: &str = "turnos_appointments_created_total";

/// Counter: create requests rejected for overlapping an active appointment.
pub const BOOKING_CONFLICTS_TOTAL: &str = "turnos_booking_conflicts_total";

/// Counter: committed status transitions. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "turnos_transitions_total";

/// Counter: requests refused by the appointment policy. Labels: action.
pub const POLICY_DENIALS_TOTAL: &str = "turnos_policy_denials_total";

/// Histogram: slots produced per availability lookup.
pub const SLOTS_GENERATED: &str = "turnos_slots_generated";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "turnos_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "turnos_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
