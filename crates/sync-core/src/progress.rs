//! Progress math for time-gated door jobs.
//!
//! All progress is expressed in logical ledger ticks, never wall-clock time;
//! the wall clock drifts relative to the ledger, so seconds only ever appear
//! as a display estimate derived at the end.

use contracts::DoorState;

/// A door only carries a real job once a helper has staked into it. Any zero
/// among helper count, required progress, and start tick means "not yet a
/// job" and must be skipped by every caller.
pub fn is_active(door: &DoorState) -> bool {
    door.helper_count > 0 && door.required_progress > 0 && door.start_tick > 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    /// Ticks since the job started, clamped at zero.
    pub elapsed: u64,
    /// Elapsed ticks multiplied by the helper count.
    pub effective: u64,
    /// Required progress still outstanding, clamped at zero.
    pub remaining: u64,
    /// Within the ready buffer of completion; the scheduler treats this as
    /// actionable.
    pub ready_soon: bool,
}

impl JobProgress {
    pub fn compute(
        helper_count: u32,
        start_tick: u64,
        required_progress: u64,
        current_tick: u64,
        ready_buffer_ticks: u64,
    ) -> Self {
        let elapsed = current_tick.saturating_sub(start_tick);
        let effective = elapsed.saturating_mul(u64::from(helper_count));
        let remaining = required_progress.saturating_sub(effective);
        Self {
            elapsed,
            effective,
            remaining,
            ready_soon: remaining <= ready_buffer_ticks,
        }
    }

    /// `None` when the door does not hold an active job.
    pub fn for_door(door: &DoorState, current_tick: u64, ready_buffer_ticks: u64) -> Option<Self> {
        if !is_active(door) {
            return None;
        }
        Some(Self::compute(
            door.helper_count,
            door.start_tick,
            door.required_progress,
            current_tick,
            ready_buffer_ticks,
        ))
    }

    /// Fully accrued, mirroring the ledger's own completion gate.
    pub fn is_ready(&self) -> bool {
        self.remaining == 0
    }

    /// Estimated wall-clock seconds until fully accrued. Display only.
    pub fn eta_seconds(&self, helper_count: u32, seconds_per_tick: f64) -> Option<f64> {
        if helper_count == 0 {
            return None;
        }
        Some(self.remaining as f64 / f64::from(helper_count) * seconds_per_tick)
    }
}
