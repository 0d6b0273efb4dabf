//! Optimistic overlays that mask remote read staleness after a
//! locally-confirmed action.
//!
//! The remote ledger lags confirmed actions by several seconds. The overlay
//! holds short-lived local overrides so the view reacts instantly, and drops
//! them the moment remote state corroborates them or a timeout elapses.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use contracts::{Direction, DoorState, RoomCoords};

/// An uncorroborated pending join is dropped after this long; by then either
/// the remote read has caught up or the action never landed.
pub const PENDING_JOB_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
struct PendingJob {
    direction: Direction,
    set_at: Instant,
}

/// At most one pending job direction and one pending target room exist at any
/// time; there is a single local player.
#[derive(Debug, Clone, Default)]
pub struct OptimisticOverlay {
    pending_job: Option<PendingJob>,
    pending_room: Option<RoomCoords>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a locally-confirmed join before remote state reflects it.
    /// Replaces any prior pending direction.
    pub fn note_join_confirmed(&mut self, direction: Direction, now: Instant) {
        self.pending_job = Some(PendingJob {
            direction,
            set_at: now,
        });
    }

    /// Record a locally-confirmed move. Replaces any prior pending target.
    pub fn note_move_confirmed(&mut self, target: RoomCoords) {
        self.pending_room = Some(target);
    }

    /// The pending target room, consumed exactly once: it only affects the
    /// immediately following room-coordinate resolution.
    pub fn take_pending_room(&mut self) -> Option<RoomCoords> {
        self.pending_room.take()
    }

    /// The pending join direction, if still inside its staleness window.
    pub fn pending_job_direction(&self, now: Instant) -> Option<Direction> {
        self.pending_job
            .filter(|pending| now.duration_since(pending.set_at) < PENDING_JOB_TIMEOUT)
            .map(|pending| pending.direction)
    }

    /// Drop the pending join once the remotely-observed active-job set for
    /// the current room includes it, or once it times out.
    pub fn corroborate_jobs(&mut self, remote_active_directions: &BTreeSet<Direction>, now: Instant) {
        let Some(pending) = self.pending_job else {
            return;
        };
        let timed_out = now.duration_since(pending.set_at) >= PENDING_JOB_TIMEOUT;
        if timed_out || remote_active_directions.contains(&pending.direction) {
            self.pending_job = None;
        }
    }

    pub fn clear_pending_job(&mut self) {
        self.pending_job = None;
    }

    /// Fabricate a substitute door view when the pending direction's remote
    /// door still shows zero helpers (a stale read), so the progress timer
    /// can start immediately.
    ///
    /// The fabricated view is presentation-only. It must never be persisted
    /// or fed into the finalize protocol.
    pub fn synthesize_door(
        &self,
        direction: Direction,
        real: &DoorState,
        last_known_tick: u64,
        now: Instant,
    ) -> Option<DoorState> {
        if self.pending_job_direction(now) != Some(direction) || real.helper_count != 0 {
            return None;
        }
        let mut fabricated = real.clone();
        fabricated.helper_count = (real.helper_count + 1).max(1);
        if fabricated.start_tick == 0 {
            fabricated.start_tick = last_known_tick;
        }
        Some(fabricated)
    }

    pub fn is_empty(&self) -> bool {
        self.pending_job.is_none() && self.pending_room.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::WallState;

    fn stale_door() -> DoorState {
        DoorState {
            wall: WallState::Rubble,
            helper_count: 0,
            progress: 0,
            start_tick: 0,
            required_progress: 300,
            completed: false,
            total_staked: 0,
            bonus_per_helper: 0,
        }
    }

    #[test]
    fn pending_job_visible_inside_window_absent_after() {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::North, t0);

        assert_eq!(overlay.pending_job_direction(t0), Some(Direction::North));
        let just_inside = t0 + PENDING_JOB_TIMEOUT - Duration::from_millis(1);
        assert_eq!(overlay.pending_job_direction(just_inside), Some(Direction::North));
        assert_eq!(overlay.pending_job_direction(t0 + PENDING_JOB_TIMEOUT), None);
    }

    #[test]
    fn corroboration_clears_pending_job() {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::East, t0);

        let mut remote = BTreeSet::new();
        overlay.corroborate_jobs(&remote, t0 + Duration::from_secs(1));
        assert_eq!(
            overlay.pending_job_direction(t0 + Duration::from_secs(1)),
            Some(Direction::East)
        );

        remote.insert(Direction::East);
        overlay.corroborate_jobs(&remote, t0 + Duration::from_secs(2));
        assert_eq!(overlay.pending_job_direction(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn timeout_clears_pending_job_even_without_corroboration() {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::West, t0);

        overlay.corroborate_jobs(&BTreeSet::new(), t0 + PENDING_JOB_TIMEOUT);
        assert!(overlay.is_empty());
    }

    #[test]
    fn pending_room_is_consumed_exactly_once() {
        let mut overlay = OptimisticOverlay::new();
        overlay.note_move_confirmed(RoomCoords::new(6, 5));
        assert_eq!(overlay.take_pending_room(), Some(RoomCoords::new(6, 5)));
        assert_eq!(overlay.take_pending_room(), None);
    }

    #[test]
    fn synthesizes_only_for_pending_direction_with_zero_helpers() {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::South, t0);

        let fabricated = overlay
            .synthesize_door(Direction::South, &stale_door(), 4_200, t0)
            .expect("stale read bridged");
        assert_eq!(fabricated.helper_count, 1);
        assert_eq!(fabricated.start_tick, 4_200);

        // Other directions stay untouched.
        assert!(overlay
            .synthesize_door(Direction::North, &stale_door(), 4_200, t0)
            .is_none());

        // Once the remote read shows helpers, the real view wins.
        let mut caught_up = stale_door();
        caught_up.helper_count = 2;
        caught_up.start_tick = 4_190;
        assert!(overlay
            .synthesize_door(Direction::South, &caught_up, 4_200, t0)
            .is_none());
    }

    #[test]
    fn synthesized_view_keeps_real_start_tick_when_present() {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::South, t0);

        let mut door = stale_door();
        door.start_tick = 4_100;
        let fabricated = overlay
            .synthesize_door(Direction::South, &door, 4_200, t0)
            .expect("fabricated");
        assert_eq!(fabricated.start_tick, 4_100);
    }
}
