//! Abstract contract for the remote-state collaborator.
//!
//! The wire-level client (signing, submitting, deserializing transactions)
//! lives outside this crate; the engine only consumes these operations. A
//! submission that did not land is an *absent* result, not an error: the
//! ledger answers slowly and sometimes not at all, and the scheduler's
//! cooldown/retry policy is the recovery path.

use async_trait::async_trait;
use contracts::{Direction, OccupantView, RemotePlayerState, RemoteRoomState, RoomCoords};

/// Confirmation signature of a landed transaction.
pub type Signature = String;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// `None` when the room does not exist yet or the read failed.
    async fn fetch_room_state(&self, coords: RoomCoords) -> Option<RemoteRoomState>;

    async fn fetch_player_state(&self) -> Option<RemotePlayerState>;

    /// Current logical tick; `0` signals "unavailable".
    async fn fetch_current_tick(&self) -> u64;

    /// Whether the local player holds a helper stake for this door. This is
    /// the source of truth for participation; cached active-job lists are
    /// distrusted as potentially stale or incomplete.
    async fn has_helper_stake(&self, coords: RoomCoords, direction: Direction) -> bool;

    /// Visible occupants of a room (presence records), in no particular
    /// order.
    async fn fetch_room_occupants(&self, coords: RoomCoords) -> Vec<OccupantView>;

    /// Advance the on-chain progress counter for a door's job.
    async fn submit_tick(&self, coords: RoomCoords, direction: Direction) -> Option<Signature>;

    /// Finalize a fully-accrued job server-side.
    async fn submit_complete(&self, coords: RoomCoords, direction: Direction)
        -> Option<Signature>;

    /// Transfer the reward for a completed job.
    async fn submit_claim(&self, coords: RoomCoords, direction: Direction) -> Option<Signature>;
}
