//! The three-step Tick / Complete / Claim finalize protocol.
//!
//! The sequence is abort-on-failure through Complete: a step that does not
//! land stops the attempt and hands recovery to the scheduler's cooldown and
//! retry policy. Claim is the exception; a job whose wall is already open is
//! finished regardless, and the reward can be claimed on any later pass.

use std::time::Instant;

use contracts::{Direction, RoomCoords, WallState};
use tracing::{debug, info, warn};

use crate::ledger::LedgerClient;
use crate::EngineInner;

/// Terminal result of one finalize attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The job was completed; `claimed` reports whether the reward transfer
    /// also landed in this attempt.
    Completed { claimed: bool },
    /// Another participant resolved the job first; nothing left to do.
    AlreadyResolved,
    /// The authoritative progress re-read came back short of the requirement.
    NotReady,
    /// The player's helper stake is gone; never submit on someone else's job.
    StakeMissing,
    /// The post-tick room re-read failed; retry after cooldown.
    StateUnavailable,
    TickFailed,
    CompleteFailed,
    /// A finalize sequence is already in flight; this attempt did nothing.
    AlreadyInFlight,
}

impl<C: LedgerClient> EngineInner<C> {
    /// Run one guarded finalize attempt: acquire the in-flight guard, stamp
    /// the attempt cooldown, suppress event-driven snapshots for the
    /// duration, and finish with exactly one forced refresh so subscribers
    /// see a single coherent post-sequence view.
    /// `refresh_after` is turned off by the reconciler, which batches several
    /// sequences under one suppression span and refreshes once at the end.
    pub(crate) async fn run_finalize(
        &self,
        coords: RoomCoords,
        direction: Direction,
        refresh_after: bool,
    ) -> FinalizeOutcome {
        {
            let mut state = self.state.lock().await;
            if state.processing.is_some() {
                return FinalizeOutcome::AlreadyInFlight;
            }
            state.processing = Some(direction);
            state.suppress_depth += 1;
            state
                .policy
                .stamp_attempt(direction, Instant::now(), self.config.attempt_cooldown());
        }

        let outcome = self.finalize_sequence(coords, direction).await;

        {
            let mut state = self.state.lock().await;
            state.processing = None;
            state.suppress_depth = state.suppress_depth.saturating_sub(1);
        }
        if refresh_after {
            self.refresh_internal(true).await;
        }

        info!(?direction, ?outcome, "finalize attempt finished");
        outcome
    }

    async fn finalize_sequence(
        &self,
        coords: RoomCoords,
        direction: Direction,
    ) -> FinalizeOutcome {
        if self.client.submit_tick(coords, direction).await.is_none() {
            let failures = {
                let mut state = self.state.lock().await;
                state
                    .policy
                    .record_failure(direction, Instant::now(), self.config.failure_cooldown())
            };
            warn!(?direction, failures, "tick submission did not land");
            return FinalizeOutcome::TickFailed;
        }

        // The tick submission folded elapsed time into the authoritative
        // counter; re-read before gating so the decision uses post-tick state.
        let Some(room) = self.client.fetch_room_state(coords).await else {
            let mut state = self.state.lock().await;
            state
                .policy
                .stamp_attempt(direction, Instant::now(), self.config.failure_cooldown());
            return FinalizeOutcome::StateUnavailable;
        };
        let door = room.door(direction).clone();
        {
            let mut state = self.state.lock().await;
            state.room = Some(room);
        }

        if door.wall != WallState::Rubble {
            let mut state = self.state.lock().await;
            state.policy.reset(direction);
            debug!(?direction, "wall no longer rubble, job resolved elsewhere");
            return FinalizeOutcome::AlreadyResolved;
        }

        if !door.completed {
            if door.progress < door.required_progress {
                debug!(
                    ?direction,
                    progress = door.progress,
                    required = door.required_progress,
                    "job not ready after authoritative re-read"
                );
                return FinalizeOutcome::NotReady;
            }

            if !self.client.has_helper_stake(coords, direction).await {
                debug!(?direction, "helper stake absent, standing down");
                return FinalizeOutcome::StakeMissing;
            }

            if self
                .client
                .submit_complete(coords, direction)
                .await
                .is_none()
            {
                let failures = {
                    let mut state = self.state.lock().await;
                    state
                        .policy
                        .record_failure(direction, Instant::now(), self.config.failure_cooldown())
                };
                warn!(?direction, failures, "complete submission did not land");
                return FinalizeOutcome::CompleteFailed;
            }

            let mut state = self.state.lock().await;
            state.policy.reset(direction);
        }

        // Claim failure is non-fatal: the door is open either way, and the
        // stake record keeps the claim discoverable on a later pass.
        let claimed = self.client.submit_claim(coords, direction).await.is_some();
        if !claimed {
            warn!(?direction, "claim submission did not land, will retry later");
        }
        FinalizeOutcome::Completed { claimed }
    }
}
