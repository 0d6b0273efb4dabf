//! In-memory ledger double with scripted failures.
//!
//! Backs the integration tests and the CLI's offline simulation. The double
//! mirrors the remote program's rules closely enough for the engine to be
//! exercised end to end: tick folds accrual into the progress counter,
//! complete enforces the progress gate and opens the wall, claim needs a live
//! stake. Failure counters make the next N submissions of a kind not land,
//! which is how the retry and give-up paths get scripted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use contracts::{
    ActiveJob, Direction, OccupantView, RemotePlayerState, RemoteRoomState, RoomCoords, WallState,
};

use crate::ledger::{LedgerClient, Signature};

#[derive(Debug)]
struct SimState {
    tick: u64,
    tick_unavailable: bool,
    rooms: BTreeMap<RoomCoords, RemoteRoomState>,
    unreadable_rooms: BTreeSet<RoomCoords>,
    player: RemotePlayerState,
    stakes: BTreeSet<(RoomCoords, Direction)>,
    occupants: BTreeMap<RoomCoords, Vec<OccupantView>>,
    fail_ticks: u32,
    fail_completes: u32,
    fail_claims: u32,
    signature_counter: u64,
}

pub struct SimLedger {
    state: Mutex<SimState>,
}

impl SimLedger {
    pub fn new(player_coords: RoomCoords) -> Self {
        Self {
            state: Mutex::new(SimState {
                tick: 1,
                tick_unavailable: false,
                rooms: BTreeMap::new(),
                unreadable_rooms: BTreeSet::new(),
                player: RemotePlayerState {
                    coords: player_coords,
                    active_jobs: Vec::new(),
                    equipped_item: None,
                    rooms_discovered: 1,
                    jobs_completed: 0,
                },
                stakes: BTreeSet::new(),
                occupants: BTreeMap::new(),
                fail_ticks: 0,
                fail_completes: 0,
                fail_claims: 0,
                signature_counter: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim ledger mutex")
    }

    pub fn insert_room(&self, room: RemoteRoomState) {
        let mut state = self.lock();
        state.rooms.insert(room.coords, room);
    }

    pub fn room(&self, coords: RoomCoords) -> Option<RemoteRoomState> {
        self.lock().rooms.get(&coords).cloned()
    }

    pub fn player(&self) -> RemotePlayerState {
        self.lock().player.clone()
    }

    pub fn set_player_coords(&self, coords: RoomCoords) {
        self.lock().player.coords = coords;
    }

    pub fn set_tick(&self, tick: u64) {
        self.lock().tick = tick;
    }

    pub fn advance_ticks(&self, ticks: u64) {
        let mut state = self.lock();
        state.tick += ticks;
    }

    pub fn set_tick_unavailable(&self, unavailable: bool) {
        self.lock().tick_unavailable = unavailable;
    }

    pub fn set_room_unreadable(&self, coords: RoomCoords, unreadable: bool) {
        let mut state = self.lock();
        if unreadable {
            state.unreadable_rooms.insert(coords);
        } else {
            state.unreadable_rooms.remove(&coords);
        }
    }

    pub fn set_occupants(&self, coords: RoomCoords, occupants: Vec<OccupantView>) {
        self.lock().occupants.insert(coords, occupants);
    }

    /// Join the local player into a door job: record the stake and active
    /// job, bump the helper count, and stamp the start tick on first join.
    pub fn join_job(&self, coords: RoomCoords, direction: Direction) {
        let mut state = self.lock();
        let tick = state.tick;
        if let Some(room) = state.rooms.get_mut(&coords) {
            let door = &mut room.doors[direction.index()];
            door.helper_count += 1;
            if door.start_tick == 0 {
                door.start_tick = tick;
            }
        }
        state.stakes.insert((coords, direction));
        if !state.player.has_active_job(coords, direction) {
            state.player.active_jobs.push(ActiveJob { coords, direction });
        }
    }

    pub fn has_stake(&self, coords: RoomCoords, direction: Direction) -> bool {
        self.lock().stakes.contains(&(coords, direction))
    }

    pub fn fail_next_ticks(&self, count: u32) {
        self.lock().fail_ticks = count;
    }

    pub fn fail_next_completes(&self, count: u32) {
        self.lock().fail_completes = count;
    }

    pub fn fail_next_claims(&self, count: u32) {
        self.lock().fail_claims = count;
    }
}

impl SimState {
    fn next_signature(&mut self) -> Signature {
        self.signature_counter += 1;
        format!("sim-{:08}", self.signature_counter)
    }
}

#[async_trait]
impl LedgerClient for SimLedger {
    async fn fetch_room_state(&self, coords: RoomCoords) -> Option<RemoteRoomState> {
        let state = self.lock();
        if state.unreadable_rooms.contains(&coords) {
            return None;
        }
        state.rooms.get(&coords).cloned()
    }

    async fn fetch_player_state(&self) -> Option<RemotePlayerState> {
        Some(self.lock().player.clone())
    }

    async fn fetch_current_tick(&self) -> u64 {
        let state = self.lock();
        if state.tick_unavailable {
            0
        } else {
            state.tick
        }
    }

    async fn has_helper_stake(&self, coords: RoomCoords, direction: Direction) -> bool {
        self.lock().stakes.contains(&(coords, direction))
    }

    async fn fetch_room_occupants(&self, coords: RoomCoords) -> Vec<OccupantView> {
        self.lock().occupants.get(&coords).cloned().unwrap_or_default()
    }

    async fn submit_tick(&self, coords: RoomCoords, direction: Direction) -> Option<Signature> {
        let mut state = self.lock();
        if state.fail_ticks > 0 {
            state.fail_ticks -= 1;
            return None;
        }
        let tick = state.tick;
        let room = state.rooms.get_mut(&coords)?;
        let door = &mut room.doors[direction.index()];
        if door.wall != WallState::Rubble || door.helper_count == 0 || door.start_tick == 0 {
            return None;
        }
        let elapsed = tick.saturating_sub(door.start_tick);
        let accrued = elapsed.saturating_mul(u64::from(door.helper_count));
        door.progress = accrued.min(door.required_progress);
        Some(state.next_signature())
    }

    async fn submit_complete(
        &self,
        coords: RoomCoords,
        direction: Direction,
    ) -> Option<Signature> {
        let mut state = self.lock();
        if state.fail_completes > 0 {
            state.fail_completes -= 1;
            return None;
        }
        let room = state.rooms.get_mut(&coords)?;
        let door = &mut room.doors[direction.index()];
        if door.wall != WallState::Rubble || door.progress < door.required_progress {
            return None;
        }
        door.completed = true;
        door.wall = WallState::Open;
        state.player.jobs_completed += 1;
        Some(state.next_signature())
    }

    async fn submit_claim(&self, coords: RoomCoords, direction: Direction) -> Option<Signature> {
        let mut state = self.lock();
        if state.fail_claims > 0 {
            state.fail_claims -= 1;
            return None;
        }
        if !state.stakes.remove(&(coords, direction)) {
            return None;
        }
        state
            .player
            .active_jobs
            .retain(|job| !(job.coords == coords && job.direction == direction));
        Some(state.next_signature())
    }
}
