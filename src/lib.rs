//! Weekly schedules, slot availability and conflict-free appointment booking.

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod ports;
pub mod wal;

pub use engine::{BookingRequest, Engine, EngineError};
