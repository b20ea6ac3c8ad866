//! Hard input limits. Requests beyond these are rejected, never truncated.

pub const MAX_DAY_PLANS: usize = 7;
pub const MAX_BLOCKS_PER_DAY: usize = 8;
pub const MAX_BREAKS_PER_DAY: usize = 8;

pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_REASON_LEN: usize = 500;

pub const MIN_SERVICE_DURATION_MINUTES: u32 = 1;
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 480;

pub const MAX_APPOINTMENTS_PER_RESOURCE: usize = 100_000;

/// Re-draws allowed when a generated reference number is already taken.
pub const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// Largest WAL frame payload. A longer length prefix marks a corrupt tail.
pub const MAX_WAL_FRAME_LEN: usize = 1 << 20;
