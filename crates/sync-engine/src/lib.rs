//! Optimistic reconciliation and background job-finalization engine.
//!
//! The authoritative game state lives on a slow, eventually-consistent remote
//! ledger. This crate keeps a responsive local view in front of it: it merges
//! remote reads with short-lived optimistic overlays, autonomously finalizes
//! door jobs that have fully accrued, and pushes immutable `RoomSnapshot`
//! values to presentation subscribers on every state change.
//!
//! All collaborators are injected: the remote ledger through the
//! [`LedgerClient`] trait, tuning through [`contracts::EngineConfig`]. There
//! is no ambient singleton state, and the background loop is owned through an
//! explicit handle rather than detached.

pub mod finalize;
pub mod ledger;
pub mod reconcile;
pub mod scheduler;
pub mod sim;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use contracts::{
    Direction, EngineConfig, EngineEvent, OccupantActivity, OccupantView, RemotePlayerState,
    RemoteRoomState, RoomCoords, RoomSnapshot, DIRECTION_COUNT,
};
use sync_core::occupancy::OccupancyTracker;
use sync_core::overlay::OptimisticOverlay;
use sync_core::policy::SchedulerPolicy;
use sync_core::snapshot::build_room_snapshot;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

pub use finalize::FinalizeOutcome;
pub use ledger::{LedgerClient, Signature};
pub use sim::SimLedger;

/// Engine lifecycle misuse.
#[derive(Debug)]
pub enum EngineError {
    LoopAlreadyRunning,
    LoopNotRunning,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoopAlreadyRunning => write!(f, "scheduler loop is already running"),
            Self::LoopNotRunning => write!(f, "scheduler loop is not running"),
        }
    }
}

impl std::error::Error for EngineError {}

/// All mutable engine state. Owned by one cooperative task at a time; the
/// mutex serializes the scheduler task against user-driven calls, which only
/// ever interleave at suspension points.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) room: Option<RemoteRoomState>,
    pub(crate) player: Option<RemotePlayerState>,
    pub(crate) last_tick: u64,
    pub(crate) overlay: OptimisticOverlay,
    pub(crate) policy: SchedulerPolicy,
    pub(crate) occupancy: OccupancyTracker,
    /// Occupants not working a door (idle, boss fighters). Kept out of the
    /// per-door diff sets but still consulted for the local player's
    /// activity.
    pub(crate) roaming: Vec<OccupantView>,
    pub(crate) last_snapshot: Option<RoomSnapshot>,
    /// While > 0, event-driven snapshot rebuilds are dropped; only forced
    /// rebuilds go through. Keeps multi-step remote sequences from pushing
    /// visually incoherent intermediate views.
    pub(crate) suppress_depth: u32,
    /// Direction with a finalize sequence in flight. A boolean guard is
    /// enough: both control paths are cooperative tasks on one event loop.
    pub(crate) processing: Option<Direction>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            room: None,
            player: None,
            last_tick: 0,
            overlay: OptimisticOverlay::new(),
            policy: SchedulerPolicy::new(),
            occupancy: OccupancyTracker::new(),
            roaming: Vec::new(),
            last_snapshot: None,
            suppress_depth: 0,
            processing: None,
        }
    }
}

pub(crate) struct EngineInner<C: LedgerClient> {
    pub(crate) client: Arc<C>,
    pub(crate) local_identity: String,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) events: broadcast::Sender<EngineEvent>,
}

impl<C: LedgerClient> EngineInner<C> {
    /// Latest logical tick, preferring a fresh fetch and falling back to the
    /// last known value when the source reports unavailable (0). Never moves
    /// backwards.
    pub(crate) async fn current_tick(&self) -> u64 {
        let fetched = self.client.fetch_current_tick().await;
        let mut state = self.state.lock().await;
        if fetched > 0 && fetched > state.last_tick {
            state.last_tick = fetched;
        }
        state.last_tick
    }

    /// Re-fetch player and room state, feed the occupancy tracker, and
    /// rebuild the snapshot. `forced` pushes the snapshot even while
    /// suppressed; the finalize protocol uses that for its single
    /// post-sequence rebuild.
    pub(crate) async fn refresh_internal(&self, forced: bool) {
        let tick = self.current_tick().await;

        if let Some(player) = self.client.fetch_player_state().await {
            let mut state = self.state.lock().await;
            state.player = Some(player);
        }

        let coords = {
            let mut state = self.state.lock().await;
            // A locally-confirmed move overrides the (stale) remote
            // coordinates for exactly one resolution.
            let pending = state.overlay.take_pending_room();
            let resolved = pending.or_else(|| state.player.as_ref().map(|p| p.coords));
            let Some(coords) = resolved else {
                return;
            };

            let remote_directions: BTreeSet<Direction> = state
                .player
                .as_ref()
                .map(|player| {
                    player
                        .active_jobs
                        .iter()
                        .filter(|job| job.coords == coords)
                        .map(|job| job.direction)
                        .collect()
                })
                .unwrap_or_default();
            state.overlay.corroborate_jobs(&remote_directions, Instant::now());

            if state.room.as_ref().map(|room| room.coords) != Some(coords) {
                // Room transition: never diff against the previous room's
                // occupants.
                state.occupancy.reset();
                state.roaming.clear();
            }
            coords
        };

        let room = self.client.fetch_room_state(coords).await;
        let occupants = self.client.fetch_room_occupants(coords).await;

        let mut state = self.state.lock().await;
        match room {
            Some(room) => {
                for direction in Direction::ALL {
                    state
                        .policy
                        .note_wall_state(direction, room.door(direction).wall);
                }
                state.room = Some(room);
            }
            None => warn!(x = coords.x, y = coords.y, "room state unavailable"),
        }

        let mut per_door: [Vec<OccupantView>; DIRECTION_COUNT] = Default::default();
        let mut roaming = Vec::new();
        for occupant in occupants {
            match occupant.activity {
                OccupantActivity::DoorJob { direction } => {
                    per_door[direction.index()].push(occupant)
                }
                _ => roaming.push(occupant),
            }
        }
        state.roaming = roaming;
        for direction in Direction::ALL {
            let current = std::mem::take(&mut per_door[direction.index()]);
            if let Some(delta) = state.occupancy.observe(direction, current) {
                let _ = self.events.send(EngineEvent::Occupancy { delta });
            }
        }

        self.rebuild_snapshot_locked(&mut state, tick, forced);
    }

    /// Build and publish a snapshot from the currently cached state.
    pub(crate) fn rebuild_snapshot_locked(
        &self,
        state: &mut EngineState,
        tick: u64,
        forced: bool,
    ) {
        if state.suppress_depth > 0 && !forced {
            return;
        }
        let Some(room) = state.room.as_ref() else {
            return;
        };

        let remote_activity = local_remote_activity(state, &self.local_identity, room.coords);
        let snapshot = build_room_snapshot(
            room,
            &state.overlay,
            state.occupancy.all_current(),
            remote_activity,
            tick,
            &self.config,
            Instant::now(),
        );
        state.last_snapshot = Some(snapshot.clone());
        let _ = self.events.send(EngineEvent::SnapshotReady { snapshot });
    }

    pub(crate) async fn suppress(&self) {
        let mut state = self.state.lock().await;
        state.suppress_depth += 1;
    }

    pub(crate) async fn resume(&self) {
        let mut state = self.state.lock().await;
        state.suppress_depth = state.suppress_depth.saturating_sub(1);
    }
}

/// What the ledger says the local player is doing: their presence record if
/// one is visible, otherwise an active job in this room, otherwise idle.
fn local_remote_activity(
    state: &EngineState,
    local_identity: &str,
    coords: RoomCoords,
) -> OccupantActivity {
    for occupants in state.occupancy.all_current() {
        if let Some(me) = occupants
            .iter()
            .find(|occupant| occupant.identity == local_identity)
        {
            return me.activity;
        }
    }
    if let Some(me) = state
        .roaming
        .iter()
        .find(|occupant| occupant.identity == local_identity)
    {
        return me.activity;
    }
    if let Some(player) = state.player.as_ref() {
        if let Some(job) = player.active_jobs.iter().find(|job| job.coords == coords) {
            return OccupantActivity::DoorJob {
                direction: job.direction,
            };
        }
    }
    OccupantActivity::Idle
}

struct LoopControl {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The engine facade handed to the embedding application.
pub struct SyncEngine<C: LedgerClient + 'static> {
    inner: Arc<EngineInner<C>>,
    loop_ctl: StdMutex<Option<LoopControl>>,
}

impl<C: LedgerClient + 'static> SyncEngine<C> {
    pub fn new(client: Arc<C>, local_identity: impl Into<String>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(EngineInner {
                client,
                local_identity: local_identity.into(),
                config,
                state: Mutex::new(EngineState::new()),
                events,
            }),
            loop_ctl: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribe to snapshot and occupancy events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Re-fetch remote state and publish a fresh snapshot.
    pub async fn refresh(&self) {
        self.inner.refresh_internal(false).await;
    }

    pub async fn latest_snapshot(&self) -> Option<RoomSnapshot> {
        self.inner.state.lock().await.last_snapshot.clone()
    }

    /// Record a locally-confirmed join-job action; the overlay masks remote
    /// staleness until the ledger corroborates it or it times out.
    pub async fn note_join_confirmed(&self, direction: Direction) {
        let mut state = self.inner.state.lock().await;
        state.overlay.note_join_confirmed(direction, Instant::now());
        let tick = state.last_tick;
        self.inner.rebuild_snapshot_locked(&mut state, tick, false);
    }

    /// Record a locally-confirmed move; the next room resolution uses the
    /// target exactly once.
    pub async fn note_move_confirmed(&self, target: RoomCoords) {
        let mut state = self.inner.state.lock().await;
        state.overlay.note_move_confirmed(target);
    }

    /// Drop event-driven snapshots until [`Self::resume_snapshots`]. For
    /// external orchestrators running their own multi-step remote sequences.
    pub async fn suppress_snapshots(&self) {
        self.inner.suppress().await;
    }

    pub async fn resume_snapshots(&self) {
        self.inner.resume().await;
    }

    /// User-driven finalize for a door of the current room. Shares the
    /// cooldown stamp and in-flight guard with the background scheduler, so
    /// the two paths can never run the sequence concurrently for one door.
    pub async fn finalize_door(&self, direction: Direction) -> FinalizeOutcome {
        let coords = {
            let state = self.inner.state.lock().await;
            state
                .room
                .as_ref()
                .map(|room| room.coords)
                .or_else(|| state.player.as_ref().map(|p| p.coords))
        };
        let coords = match coords {
            Some(coords) => coords,
            None => {
                self.inner.refresh_internal(false).await;
                let state = self.inner.state.lock().await;
                match state.room.as_ref().map(|room| room.coords) {
                    Some(coords) => coords,
                    None => return FinalizeOutcome::StateUnavailable,
                }
            }
        };
        self.inner.run_finalize(coords, direction, true).await
    }

    /// Startup/entry sweep over every active job the ledger reports for the
    /// player. Returns whether any cleanup occurred.
    pub async fn reconcile_active_jobs(&self) -> bool {
        self.inner.reconcile_active_jobs().await
    }

    /// Start the adaptive background scheduler loop.
    pub fn start_loop(&self) -> Result<(), EngineError> {
        let mut ctl = self.loop_ctl.lock().expect("loop control mutex");
        if ctl.is_some() {
            return Err(EngineError::LoopAlreadyRunning);
        }
        let (shutdown, receiver) = watch::channel(false);
        let handle = tokio::spawn(scheduler::run_loop(Arc::clone(&self.inner), receiver));
        *ctl = Some(LoopControl { shutdown, handle });
        Ok(())
    }

    /// Cooperatively stop the scheduler loop and join it. An in-flight
    /// finalize step finishes before the loop honors the signal.
    pub async fn stop_loop(&self) -> Result<(), EngineError> {
        let control = {
            let mut ctl = self.loop_ctl.lock().expect("loop control mutex");
            ctl.take()
        };
        let Some(control) = control else {
            return Err(EngineError::LoopNotRunning);
        };
        let _ = control.shutdown.send(true);
        if control.handle.await.is_err() {
            warn!("scheduler loop terminated abnormally");
        }
        Ok(())
    }
}
