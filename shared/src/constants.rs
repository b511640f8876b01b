//! Numeric constants shared by every component of the networking core.
//!
//! Values wire-visible per the external interface are listed first; the rest are internal
//! tunables. See `DESIGN.md` for the handful that the source spec named but did not pin to a
//! concrete value.

pub const TICK_HZ: u64 = 240;
pub const SERVER_HZ: u64 = 30;
pub const CLIENT_HZ: u64 = 60;

pub const TICKS_PER_SERVER_FRAME: u64 = TICK_HZ / SERVER_HZ;
pub const TICKS_PER_CLIENT_FRAME: u64 = TICK_HZ / CLIENT_HZ;

pub const TIMEOUT_SECS: f64 = 5.0;

pub const MAX_CLIENTS: usize = 32;
pub const MAX_PLAYERS: usize = MAX_CLIENTS;
pub const MAX_ENTITIES: usize = 1024;
pub const NUM_CUBES: usize = MAX_ENTITIES;

pub const ORIENTATION_BITS: u32 = 9;
pub const UNITS_PER_METER: i32 = 512;
pub const POSITION_BOUND_XY: i32 = 255;
pub const POSITION_BOUND_Z: i32 = 31;
pub const QUANTIZED_POSITION_BOUND_XY: i32 = UNITS_PER_METER * POSITION_BOUND_XY - 1;
pub const QUANTIZED_POSITION_BOUND_Z: i32 = UNITS_PER_METER * POSITION_BOUND_Z - 1;

/// Must be `>= TICK_HZ * TIMEOUT_SECS` so a client never wraps the window within one timeout.
pub const INPUT_SLIDING_WINDOW: usize = (TICK_HZ as usize) * (TIMEOUT_SECS as usize);

pub const MAX_INPUTS_PER_PACKET: usize = 32;
pub const MAX_PACKET_SIZE: usize = 4096;
/// Reserved stream-context slots in the original source's template machinery; unused here
/// since Rust generics replace the context-pointer indirection, kept only for parity.
pub const MAX_CONTEXTS: usize = 8;
pub const SERVER_PORT: u16 = 20000;

pub const MAX_SYNC_SAMPLES: u32 = 128;
pub const MAX_BRACKET_SAMPLES: u32 = 64;
pub const MAX_ADJUSTMENT_SAMPLES: u32 = 32;
pub const INPUT_SAFETY: i64 = 1;
pub const ADJUSTMENT_OFFSET_MIN: i32 = -8;
pub const ADJUSTMENT_OFFSET_MAX: i32 = 8;
pub const RECONNECT_DROPPED_INPUTS: u32 = 64;
pub const DROP_FORGET_TIME: f64 = 1.0;

pub const AUTHORITY_THRESHOLD: f64 = 0.5;

pub const CLIENT_FRAME_DT: f64 = 1.0 / CLIENT_HZ as f64;
pub const SERVER_FRAME_DT: f64 = 1.0 / SERVER_HZ as f64;
pub const SERVER_FRAME_SAFETY: f64 = 0.5;
pub const AVG_SLEEP_JITTER: f64 = 0.00225;

pub const CLAMP_LINEAR_SPEED: f32 = 31.0;
pub const CLAMP_ANGULAR_SPEED: f32 = 15.0;
