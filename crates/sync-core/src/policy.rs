//! Scheduling policy for autonomous job finalization.
//!
//! Tracks per-direction cooldowns and consecutive failure counts, and picks
//! the most urgent ready candidate each evaluation. The async scheduler owns
//! the loop and the remote reads; this module owns every decision.

use std::time::{Duration, Instant};

use contracts::{Direction, EngineConfig, WallState, DIRECTION_COUNT};

#[derive(Debug, Clone, Copy, Default)]
struct DirectionSlot {
    next_attempt_at: Option<Instant>,
    consecutive_failures: u32,
}

/// One evaluable job candidate: the wall is rubble, helpers are staked, and
/// the local player holds a verified helper stake for the direction.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub direction: Direction,
    pub helper_count: u32,
    pub remaining: u64,
    pub ready_soon: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the finalize sequence for this direction now. The cooldown has
    /// already been stamped so a crashed or slow attempt cannot be re-entered
    /// before it elapses.
    Finalize(Direction),
    /// Nothing actionable; sleep this long before re-evaluating.
    Sleep(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerPolicy {
    slots: [DirectionSlot; DIRECTION_COUNT],
}

impl SchedulerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observing a wall that is no longer rubble means the job resolved by
    /// some path; the direction's cooldown and failure history are moot.
    pub fn note_wall_state(&mut self, direction: Direction, wall: WallState) {
        if wall != WallState::Rubble {
            self.reset(direction);
        }
    }

    pub fn reset(&mut self, direction: Direction) {
        self.slots[direction.index()] = DirectionSlot::default();
    }

    pub fn stamp_attempt(&mut self, direction: Direction, now: Instant, cooldown: Duration) {
        self.slots[direction.index()].next_attempt_at = Some(now + cooldown);
    }

    /// Record a fatal step failure: bump the counter and back off on the
    /// longer failure cooldown. Returns the new count.
    pub fn record_failure(&mut self, direction: Direction, now: Instant, cooldown: Duration) -> u32 {
        let slot = &mut self.slots[direction.index()];
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        slot.next_attempt_at = Some(now + cooldown);
        slot.consecutive_failures
    }

    pub fn failures(&self, direction: Direction) -> u32 {
        self.slots[direction.index()].consecutive_failures
    }

    /// The Complete step has failed `max_retries` times; leave the direction
    /// alone until its wall is observed to change.
    pub fn gave_up(&self, direction: Direction, max_retries: u32) -> bool {
        self.failures(direction) >= max_retries
    }

    pub fn cooldown_remaining(&self, direction: Direction, now: Instant) -> Option<Duration> {
        let next_attempt_at = self.slots[direction.index()].next_attempt_at?;
        if next_attempt_at <= now {
            return None;
        }
        Some(next_attempt_at - now)
    }

    /// One scheduler evaluation over the current candidate set.
    ///
    /// Candidates must arrive in direction-index order so that the
    /// smallest-remaining tie break lands on the lowest index.
    pub fn evaluate(
        &mut self,
        now: Instant,
        candidates: &[Candidate],
        config: &EngineConfig,
    ) -> Decision {
        let mut min_delay: Option<Duration> = None;
        let mut best: Option<Candidate> = None;

        for candidate in candidates {
            if self.gave_up(candidate.direction, config.max_retries) {
                continue;
            }

            if !candidate.ready_soon {
                // Fold the estimated wait until this job ripens.
                let wait_seconds = if candidate.helper_count == 0 {
                    config.idle_poll_interval().as_secs_f64()
                } else {
                    candidate.remaining as f64 / f64::from(candidate.helper_count)
                        * config.seconds_per_tick
                };
                // Clamp before constructing the Duration; from_secs_f64
                // panics on non-finite or out-of-range values, and the final
                // sleep never exceeds max_recheck anyway.
                let wait_seconds =
                    wait_seconds.clamp(0.0, config.max_recheck().as_secs_f64());
                fold_min(&mut min_delay, Duration::from_secs_f64(wait_seconds));
                continue;
            }

            if let Some(cooldown) = self.cooldown_remaining(candidate.direction, now) {
                fold_min(&mut min_delay, cooldown);
                continue;
            }

            let better = match best {
                None => true,
                Some(current) => candidate.remaining < current.remaining,
            };
            if better {
                best = Some(*candidate);
            }
        }

        if let Some(chosen) = best {
            self.stamp_attempt(chosen.direction, now, config.attempt_cooldown());
            return Decision::Finalize(chosen.direction);
        }

        let delay = match min_delay {
            Some(delay) => delay.clamp(config.min_recheck(), config.max_recheck()),
            None => config.idle_poll_interval(),
        };
        Decision::Sleep(delay)
    }
}

fn fold_min(current: &mut Option<Duration>, observed: Duration) {
    *current = Some(match *current {
        Some(existing) => existing.min(observed),
        None => observed,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(direction: Direction, remaining: u64, ready_soon: bool) -> Candidate {
        Candidate {
            direction,
            helper_count: 2,
            remaining,
            ready_soon,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn empty_candidate_set_sleeps_idle_interval() {
        let mut policy = SchedulerPolicy::new();
        let decision = policy.evaluate(Instant::now(), &[], &config());
        assert_eq!(decision, Decision::Sleep(config().idle_poll_interval()));
    }

    #[test]
    fn selects_smallest_remaining_with_lowest_index_tie_break() {
        let mut policy = SchedulerPolicy::new();
        let candidates = [
            candidate(Direction::North, 1, true),
            candidate(Direction::South, 0, true),
            candidate(Direction::East, 0, true),
        ];
        let decision = policy.evaluate(Instant::now(), &candidates, &config());
        assert_eq!(decision, Decision::Finalize(Direction::South));
    }

    #[test]
    fn selection_stamps_cooldown_immediately() {
        let mut policy = SchedulerPolicy::new();
        let now = Instant::now();
        let candidates = [candidate(Direction::North, 0, true)];

        assert_eq!(
            policy.evaluate(now, &candidates, &config()),
            Decision::Finalize(Direction::North)
        );
        // Same instant again: the direction is within cooldown, so the policy
        // folds the cooldown remainder instead of re-selecting.
        match policy.evaluate(now, &candidates, &config()) {
            Decision::Sleep(delay) => {
                assert!(delay <= config().attempt_cooldown());
                assert!(delay >= config().min_recheck());
            }
            other => panic!("expected sleep during cooldown, got {other:?}"),
        }
    }

    #[test]
    fn never_selects_within_cooldown() {
        let mut policy = SchedulerPolicy::new();
        let now = Instant::now();
        policy.stamp_attempt(Direction::East, now, Duration::from_secs(10));

        let candidates = [candidate(Direction::East, 0, true)];
        match policy.evaluate(now + Duration::from_secs(1), &candidates, &config()) {
            Decision::Sleep(_) => {}
            other => panic!("expected sleep, got {other:?}"),
        }

        // After the cooldown elapses the direction is selectable again.
        let later = now + Duration::from_secs(11);
        assert_eq!(
            policy.evaluate(later, &candidates, &config()),
            Decision::Finalize(Direction::East)
        );
    }

    #[test]
    fn gives_up_after_max_retries_until_wall_changes() {
        let mut policy = SchedulerPolicy::new();
        let now = Instant::now();
        let cfg = config();
        for _ in 0..cfg.max_retries {
            policy.record_failure(Direction::West, now, Duration::ZERO);
        }
        assert!(policy.gave_up(Direction::West, cfg.max_retries));

        let candidates = [candidate(Direction::West, 0, true)];
        let decision = policy.evaluate(now + Duration::from_secs(60), &candidates, &cfg);
        assert_eq!(decision, Decision::Sleep(cfg.idle_poll_interval()));

        // Wall leaving rubble resets the slot lazily.
        policy.note_wall_state(Direction::West, WallState::Open);
        assert_eq!(policy.failures(Direction::West), 0);
    }

    #[test]
    fn not_ready_candidates_fold_estimated_wait() {
        let mut policy = SchedulerPolicy::new();
        let cfg = config();
        // remaining=10, helpers=2, 0.4 s/tick -> 2 s estimated wait.
        let candidates = [candidate(Direction::North, 10, false)];
        match policy.evaluate(Instant::now(), &candidates, &cfg) {
            Decision::Sleep(delay) => {
                assert_eq!(delay, Duration::from_secs_f64(2.0));
            }
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    #[test]
    fn sleep_is_clamped_to_recheck_bounds() {
        let mut policy = SchedulerPolicy::new();
        let cfg = config();
        // A nearly-ripe job would suggest a tiny delay; clamp to min_recheck.
        let near = [candidate(Direction::North, 2, false)];
        match policy.evaluate(Instant::now(), &near, &cfg) {
            Decision::Sleep(delay) => assert_eq!(delay, cfg.min_recheck()),
            other => panic!("expected sleep, got {other:?}"),
        }

        // A far-off job suggests a huge delay; clamp to max_recheck.
        let far = [Candidate {
            direction: Direction::South,
            helper_count: 1,
            remaining: 1_000_000,
            ready_soon: false,
        }];
        match policy.evaluate(Instant::now(), &far, &cfg) {
            Decision::Sleep(delay) => assert_eq!(delay, cfg.max_recheck()),
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    #[test]
    fn extreme_wait_estimates_do_not_overflow() {
        let mut policy = SchedulerPolicy::new();
        let mut cfg = config();
        // remaining * seconds_per_tick far beyond what Duration can hold.
        cfg.seconds_per_tick = f64::MAX;
        let far = [Candidate {
            direction: Direction::North,
            helper_count: 1,
            remaining: u64::MAX,
            ready_soon: false,
        }];
        match policy.evaluate(Instant::now(), &far, &cfg) {
            Decision::Sleep(delay) => assert_eq!(delay, cfg.max_recheck()),
            other => panic!("expected sleep, got {other:?}"),
        }
    }
}
