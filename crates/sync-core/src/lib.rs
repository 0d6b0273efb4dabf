//! Pure, deterministic core of the client consistency engine.
//!
//! Nothing in this crate performs I/O or owns a clock: logical ticks and
//! `Instant`s are always injected by the caller. The async engine crate and
//! the presentation layer both consume the same functions here, so progress
//! math and snapshot merging cannot drift between display and scheduling.

pub mod occupancy;
pub mod overlay;
pub mod policy;
pub mod progress;
pub mod snapshot;
