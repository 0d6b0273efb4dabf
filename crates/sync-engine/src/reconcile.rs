//! Startup reconciliation of stale active jobs.
//!
//! A player can close the client mid-job; the ledger keeps the stake and the
//! presence record around indefinitely. On startup (and on room entry) this
//! sweep walks every active job the ledger reports, finishes the ones that
//! fully accrued while the client was away, and claims rewards for jobs other
//! participants already completed. Each job is handled independently; one
//! failure never blocks the rest of the sweep.

use contracts::WallState;
use sync_core::progress::JobProgress;
use tracing::{debug, info, warn};

use crate::finalize::FinalizeOutcome;
use crate::ledger::LedgerClient;
use crate::EngineInner;

impl<C: LedgerClient> EngineInner<C> {
    /// Sweep all remotely-recorded active jobs. Snapshots stay suppressed for
    /// the whole sweep; when anything was cleaned up, a single forced refresh
    /// publishes the post-sweep view. Returns whether any job was resolved.
    pub(crate) async fn reconcile_active_jobs(&self) -> bool {
        let Some(player) = self.client.fetch_player_state().await else {
            warn!("player state unavailable, skipping reconciliation");
            return false;
        };
        if player.active_jobs.is_empty() {
            return false;
        }
        info!(jobs = player.active_jobs.len(), "reconciling active jobs");

        self.suppress().await;
        let mut cleaned = false;
        for job in &player.active_jobs {
            if self.reconcile_one(job.coords, job.direction).await {
                cleaned = true;
            }
        }
        self.resume().await;

        if cleaned {
            self.refresh_internal(true).await;
        }
        cleaned
    }

    async fn reconcile_one(
        &self,
        coords: contracts::RoomCoords,
        direction: contracts::Direction,
    ) -> bool {
        let Some(room) = self.client.fetch_room_state(coords).await else {
            warn!(
                x = coords.x,
                y = coords.y,
                "room unreadable during reconciliation, leaving job alone"
            );
            return false;
        };
        let door = room.door(direction);

        // Someone else finished the job while we were away: only the reward
        // claim is left.
        if door.wall == WallState::Open || door.completed {
            if !self.client.has_helper_stake(coords, direction).await {
                return false;
            }
            match self.client.submit_claim(coords, direction).await {
                Some(_) => {
                    info!(?direction, x = coords.x, y = coords.y, "claimed stale reward");
                    return true;
                }
                None => {
                    warn!(?direction, "stale reward claim did not land");
                    return false;
                }
            }
        }

        if door.wall != WallState::Rubble {
            return false;
        }

        let tick = self.current_tick().await;
        let Some(progress) = JobProgress::for_door(door, tick, self.config.ready_buffer_ticks)
        else {
            return false;
        };
        if !progress.is_ready() {
            debug!(
                ?direction,
                remaining = progress.remaining,
                "stale job still accruing, leaving it to the scheduler"
            );
            return false;
        }

        matches!(
            self.run_finalize(coords, direction, false).await,
            FinalizeOutcome::Completed { .. } | FinalizeOutcome::AlreadyResolved
        )
    }
}
