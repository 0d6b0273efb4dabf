//! Cross-boundary contracts shared by the consistency core, the async engine,
//! and presentation consumers.
//!
//! Everything here is a plain serde-serializable value type. Remote state
//! (`RemoteRoomState`, `RemotePlayerState`) is authoritative and read-only for
//! this client; `RoomSnapshot` is the immutable merged view handed to the
//! presentation layer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

/// The four door directions form a closed set; everything per-direction is a
/// fixed-size array indexed by `Direction::index`, never a trait object.
pub const DIRECTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; DIRECTION_COUNT] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Direction> {
        Direction::ALL.get(index).copied()
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// Coordinates of the room on the far side of this door.
    pub fn step(self, from: RoomCoords) -> RoomCoords {
        match self {
            Direction::North => RoomCoords::new(from.x, from.y + 1),
            Direction::South => RoomCoords::new(from.x, from.y - 1),
            Direction::East => RoomCoords::new(from.x + 1, from.y),
            Direction::West => RoomCoords::new(from.x - 1, from.y),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCoords {
    pub x: i8,
    pub y: i8,
}

impl RoomCoords {
    pub fn new(x: i8, y: i8) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for RoomCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Only `Rubble` supports an active clearing job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WallState {
    Solid,
    Rubble,
    Open,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CenterKind {
    Empty,
    Chest,
    Boss,
}

/// Remote per-direction job state, straight off the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoorState {
    pub wall: WallState,
    pub helper_count: u32,
    #[serde(with = "serde_u64_string")]
    pub progress: u64,
    #[serde(with = "serde_u64_string")]
    pub start_tick: u64,
    #[serde(with = "serde_u64_string")]
    pub required_progress: u64,
    pub completed: bool,
    #[serde(default, with = "serde_u64_string")]
    pub total_staked: u64,
    #[serde(default, with = "serde_u64_string")]
    pub bonus_per_helper: u64,
}

impl DoorState {
    pub fn solid() -> Self {
        Self {
            wall: WallState::Solid,
            helper_count: 0,
            progress: 0,
            start_tick: 0,
            required_progress: 0,
            completed: false,
            total_staked: 0,
            bonus_per_helper: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CenterState {
    pub kind: CenterKind,
    pub center_id: u16,
    #[serde(default, with = "serde_u64_string")]
    pub boss_max_hp: u64,
    #[serde(default, with = "serde_u64_string")]
    pub boss_current_hp: u64,
    #[serde(default)]
    pub boss_defeated: bool,
}

impl CenterState {
    pub fn empty() -> Self {
        Self {
            kind: CenterKind::Empty,
            center_id: 0,
            boss_max_hp: 0,
            boss_current_hp: 0,
            boss_defeated: false,
        }
    }
}

/// Authoritative room state; only mutated by remote confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRoomState {
    pub coords: RoomCoords,
    pub doors: [DoorState; DIRECTION_COUNT],
    pub center: CenterState,
    pub looted_count: u32,
}

impl RemoteRoomState {
    pub fn door(&self, direction: Direction) -> &DoorState {
        &self.doors[direction.index()]
    }

    pub fn is_rubble(&self, direction: Direction) -> bool {
        self.door(direction).wall == WallState::Rubble
    }
}

/// Remote ground truth that the player has staked into a job. May reference
/// any room, not just the one the player currently occupies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActiveJob {
    pub coords: RoomCoords,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePlayerState {
    pub coords: RoomCoords,
    pub active_jobs: Vec<ActiveJob>,
    pub equipped_item: Option<u16>,
    #[serde(default)]
    pub rooms_discovered: u32,
    #[serde(default)]
    pub jobs_completed: u32,
}

impl RemotePlayerState {
    pub fn has_active_job(&self, coords: RoomCoords, direction: Direction) -> bool {
        self.active_jobs
            .iter()
            .any(|job| job.coords == coords && job.direction == direction)
    }
}

/// What an occupant is visibly doing in the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccupantActivity {
    Idle,
    DoorJob { direction: Direction },
    BossFight,
}

/// One visible occupant. `identity` is the stable external key (a wallet
/// address string); it is the only field that matters for membership diffs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OccupantView {
    pub identity: String,
    pub activity: OccupantActivity,
}

/// Join/leave events for one door, produced by diffing two occupant sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OccupancyDelta {
    pub direction: Direction,
    pub joined: Vec<String>,
    pub left: Vec<String>,
}

/// Presentation-facing view of one door: remote fields merged with computed
/// progress and any overlay synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoorView {
    pub wall: WallState,
    pub helper_count: u32,
    #[serde(with = "serde_u64_string")]
    pub progress: u64,
    #[serde(with = "serde_u64_string")]
    pub start_tick: u64,
    #[serde(with = "serde_u64_string")]
    pub required_progress: u64,
    pub completed: bool,
    /// Remaining effective progress at the snapshot's tick.
    #[serde(with = "serde_u64_string")]
    pub remaining: u64,
    pub ready: bool,
    /// Estimated wall-clock seconds until the job is fully accrued.
    pub eta_seconds: Option<f64>,
    /// True when the overlay fabricated this view to bridge a stale read.
    /// Presentation only; synthesized views never reach the finalize path.
    pub synthesized: bool,
}

/// Immutable, fully-merged view of one room handed to the presentation layer.
/// Constructed fresh on every state change and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub coords: RoomCoords,
    pub tick: u64,
    pub doors: [DoorView; DIRECTION_COUNT],
    pub center: CenterState,
    pub occupants: [Vec<OccupantView>; DIRECTION_COUNT],
    pub local_activity: OccupantActivity,
    /// Overlay-pending join direction, surfaced so placement can show the
    /// local player at the door before the remote read catches up.
    pub pending_direction: Option<Direction>,
}

impl RoomSnapshot {
    pub fn door(&self, direction: Direction) -> &DoorView {
        &self.doors[direction.index()]
    }
}

/// Events pushed to presentation subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SnapshotReady { snapshot: RoomSnapshot },
    Occupancy { delta: OccupancyDelta },
}

/// Plain numeric knobs for the engine. Intervals are milliseconds; ticks are
/// logical ledger ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub idle_poll_interval_ms: u64,
    pub min_recheck_ms: u64,
    pub max_recheck_ms: u64,
    pub player_refresh_interval_ms: u64,
    /// Estimated wall-clock seconds per logical tick; used only for display
    /// and wake-delay estimates, never for progress math.
    pub seconds_per_tick: f64,
    pub ready_buffer_ticks: u64,
    pub attempt_cooldown_ms: u64,
    pub failure_cooldown_ms: u64,
    pub max_retries: u32,
}

impl EngineConfig {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn min_recheck(&self) -> Duration {
        Duration::from_millis(self.min_recheck_ms)
    }

    pub fn max_recheck(&self) -> Duration {
        Duration::from_millis(self.max_recheck_ms)
    }

    pub fn player_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.player_refresh_interval_ms)
    }

    pub fn attempt_cooldown(&self) -> Duration {
        Duration::from_millis(self.attempt_cooldown_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: 5_000,
            min_recheck_ms: 500,
            max_recheck_ms: 15_000,
            player_refresh_interval_ms: 10_000,
            // ~400ms ledger slots.
            seconds_per_tick: 0.4,
            ready_buffer_ticks: 1,
            attempt_cooldown_ms: 4_000,
            failure_cooldown_ms: 12_000,
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_indices_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(Direction::from_index(direction.index()), Some(direction));
        }
        assert_eq!(Direction::from_index(4), None);
    }

    #[test]
    fn opposite_is_involutive() {
        for direction in Direction::ALL {
            assert_eq!(direction.opposite().opposite(), direction);
        }
    }

    #[test]
    fn step_and_opposite_step_cancel() {
        let origin = RoomCoords::new(5, 5);
        for direction in Direction::ALL {
            let there = direction.step(origin);
            assert_eq!(direction.opposite().step(there), origin);
        }
    }

    #[test]
    fn door_state_serializes_ticks_as_strings() {
        let door = DoorState {
            wall: WallState::Rubble,
            helper_count: 2,
            progress: 0,
            start_tick: 287_654_123,
            required_progress: 300,
            completed: false,
            total_staked: 20_000_000,
            bonus_per_helper: 0,
        };
        let raw = serde_json::to_string(&door).expect("serialize");
        assert!(raw.contains(r#""start_tick":"287654123""#));
        let decoded: DoorState = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(decoded, door);
    }

    #[test]
    fn active_job_lookup_matches_room_and_direction() {
        let player = RemotePlayerState {
            coords: RoomCoords::new(5, 5),
            active_jobs: vec![ActiveJob {
                coords: RoomCoords::new(5, 6),
                direction: Direction::East,
            }],
            equipped_item: None,
            rooms_discovered: 2,
            jobs_completed: 0,
        };
        assert!(player.has_active_job(RoomCoords::new(5, 6), Direction::East));
        assert!(!player.has_active_job(RoomCoords::new(5, 6), Direction::West));
        assert!(!player.has_active_job(RoomCoords::new(5, 5), Direction::East));
    }

    #[test]
    fn config_defaults_are_positive() {
        let config = EngineConfig::default();
        assert!(config.min_recheck() <= config.max_recheck());
        assert!(config.seconds_per_tick > 0.0);
        assert!(config.max_retries > 0);
    }
}
