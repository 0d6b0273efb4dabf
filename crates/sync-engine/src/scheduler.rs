//! The adaptive background loop: refresh, evaluate, act, sleep.
//!
//! Each pass re-reads remote state, builds the candidate set for the current
//! room, and asks the scheduling policy for one decision. The sleep between
//! passes adapts to how close the nearest job is to ripening, so an idle
//! dungeon costs one poll every few seconds while a ripening door is checked
//! on a tight cadence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Direction, WallState};
use sync_core::policy::{Candidate, Decision};
use sync_core::progress::{self, JobProgress};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::ledger::LedgerClient;
use crate::EngineInner;

/// One scheduler pass. Returns how long to sleep before the next one.
pub(crate) async fn step<C: LedgerClient>(inner: &EngineInner<C>) -> Duration {
    inner.refresh_internal(false).await;

    let (coords, doors, tick) = {
        let state = inner.state.lock().await;
        match state.room.as_ref() {
            Some(room) => (room.coords, room.doors.clone(), state.last_tick),
            None => return inner.config.idle_poll_interval(),
        }
    };

    // Candidates in direction-index order; the policy's tie break depends on
    // it. Stake verification is a remote read, so skip it for doors the
    // policy would discard anyway.
    let mut candidates = Vec::new();
    for direction in Direction::ALL {
        let door = &doors[direction.index()];
        if door.wall != WallState::Rubble || door.completed || !progress::is_active(door) {
            continue;
        }
        let gave_up = {
            let state = inner.state.lock().await;
            state.policy.gave_up(direction, inner.config.max_retries)
        };
        if gave_up {
            continue;
        }
        if !inner.client.has_helper_stake(coords, direction).await {
            continue;
        }

        let progress = JobProgress::compute(
            door.helper_count,
            door.start_tick,
            door.required_progress,
            tick,
            inner.config.ready_buffer_ticks,
        );
        candidates.push(Candidate {
            direction,
            helper_count: door.helper_count,
            remaining: progress.remaining,
            ready_soon: progress.ready_soon,
        });
    }

    let decision = {
        let mut state = inner.state.lock().await;
        state
            .policy
            .evaluate(Instant::now(), &candidates, &inner.config)
    };
    match decision {
        Decision::Finalize(direction) => {
            debug!(?direction, "scheduler selected job for finalization");
            inner.run_finalize(coords, direction, true).await;
            // Re-evaluate promptly; the sequence changed the world.
            inner.config.min_recheck()
        }
        Decision::Sleep(delay) => delay,
    }
}

/// Loop body of the background task. Exits when the shutdown signal flips;
/// an in-flight pass always runs to completion first.
pub(crate) async fn run_loop<C: LedgerClient>(
    inner: Arc<EngineInner<C>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("scheduler loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let delay = step(inner.as_ref()).await;
        // Every pass re-reads player state; never sleep past its refresh
        // interval even when the nearest job is far off.
        let delay = delay.min(inner.config.player_refresh_interval());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("scheduler loop stopped");
}
