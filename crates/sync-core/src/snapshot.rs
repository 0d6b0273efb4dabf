//! Room snapshot construction: merge the authoritative remote room with the
//! optimistic overlay into the immutable view handed to presentation.

use std::time::Instant;

use contracts::{
    Direction, DoorView, EngineConfig, OccupantActivity, OccupantView, RemoteRoomState,
    RoomSnapshot, DIRECTION_COUNT,
};

use crate::overlay::OptimisticOverlay;
use crate::progress::JobProgress;

/// Build the merged, overlay-applied snapshot for one room.
///
/// `remote_activity` is what the ledger currently says the local player is
/// doing; an uncorroborated pending join overrides it only when it is idle.
pub fn build_room_snapshot(
    room: &RemoteRoomState,
    overlay: &OptimisticOverlay,
    occupants: &[Vec<OccupantView>; DIRECTION_COUNT],
    remote_activity: OccupantActivity,
    tick: u64,
    config: &EngineConfig,
    now: Instant,
) -> RoomSnapshot {
    let pending_direction = overlay.pending_job_direction(now);

    let doors = Direction::ALL.map(|direction| {
        let real = room.door(direction);
        let (door, synthesized) = match overlay.synthesize_door(direction, real, tick, now) {
            Some(fabricated) => (fabricated, true),
            None => (real.clone(), false),
        };

        let progress = JobProgress::for_door(&door, tick, config.ready_buffer_ticks);
        let (remaining, ready, eta_seconds) = match progress {
            Some(progress) => (
                progress.remaining,
                progress.is_ready(),
                progress.eta_seconds(door.helper_count, config.seconds_per_tick),
            ),
            None => (door.required_progress, false, None),
        };

        DoorView {
            wall: door.wall,
            helper_count: door.helper_count,
            progress: door.progress,
            start_tick: door.start_tick,
            required_progress: door.required_progress,
            completed: door.completed,
            remaining,
            ready,
            eta_seconds,
            synthesized,
        }
    });

    let local_activity = match (remote_activity, pending_direction) {
        (OccupantActivity::Idle, Some(direction)) => OccupantActivity::DoorJob { direction },
        (activity, _) => activity,
    };

    RoomSnapshot {
        coords: room.coords,
        tick,
        doors,
        center: room.center.clone(),
        occupants: occupants.clone(),
        local_activity,
        pending_direction,
    }
}
