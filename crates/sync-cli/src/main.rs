use std::env;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CenterState, Direction, DoorState, EngineConfig, EngineEvent, RemoteRoomState, RoomCoords,
    WallState,
};
use sync_engine::{SimLedger, SyncEngine};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    println!("sync-cli <command>");
    println!("commands:");
    println!("  snapshot");
    println!("    print one merged room snapshot as json");
    println!("  simulate [ticks]");
    println!("    run the background scheduler against an in-memory ledger");
    println!("    until the demo job finalizes (default ticks per pass: 25)");
    println!("  reconcile");
    println!("    sweep a stale fully-accrued job left by a previous session");
}

fn parse_u64(value: Option<&String>, label: &str, default: u64) -> Result<u64, String> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("invalid {}: {}", label, raw)),
    }
}

/// One home room with a rubble door to the east that the local player has
/// already staked into.
fn demo_ledger(required_progress: u64) -> Arc<SimLedger> {
    let home = RoomCoords::new(0, 0);
    let mut doors = [
        DoorState::solid(),
        DoorState::solid(),
        DoorState::solid(),
        DoorState::solid(),
    ];
    doors[Direction::East.index()] = DoorState {
        wall: WallState::Rubble,
        helper_count: 0,
        progress: 0,
        start_tick: 0,
        required_progress,
        completed: false,
        total_staked: 1_000,
        bonus_per_helper: 250,
    };

    let sim = Arc::new(SimLedger::new(home));
    sim.insert_room(RemoteRoomState {
        coords: home,
        doors,
        center: CenterState::empty(),
        looted_count: 0,
    });
    sim.set_tick(100);
    sim.join_job(home, Direction::East);
    sim
}

fn drain_events(events: &mut tokio::sync::broadcast::Receiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::SnapshotReady { snapshot } => {
                let east = snapshot.door(Direction::East);
                println!(
                    "tick={} east: wall={:?} remaining={} ready={} eta={:?}",
                    snapshot.tick, east.wall, east.remaining, east.ready, east.eta_seconds
                );
            }
            EngineEvent::Occupancy { delta } => {
                println!(
                    "occupancy {}: joined={:?} left={:?}",
                    delta.direction, delta.joined, delta.left
                );
            }
        }
    }
}

async fn print_snapshot() -> Result<(), String> {
    let sim = demo_ledger(300);
    sim.advance_ticks(120);
    let engine = SyncEngine::new(sim, "local-wallet", EngineConfig::default());
    engine.refresh().await;

    let snapshot = engine
        .latest_snapshot()
        .await
        .ok_or_else(|| "no snapshot produced".to_string())?;
    let rendered = serde_json::to_string_pretty(&snapshot)
        .map_err(|err| format!("failed to render snapshot: {err}"))?;
    println!("{rendered}");
    Ok(())
}

async fn run_simulation(ticks_per_pass: u64) -> Result<(), String> {
    let sim = demo_ledger(300);
    let engine = SyncEngine::new(Arc::clone(&sim), "local-wallet", EngineConfig::default());
    let mut events = engine.subscribe();

    engine
        .start_loop()
        .map_err(|err| format!("failed to start scheduler: {err}"))?;

    // Feed time to the ledger until the scheduler finishes the job.
    for _ in 0..200 {
        sim.advance_ticks(ticks_per_pass);
        tokio::time::sleep(Duration::from_millis(200)).await;
        drain_events(&mut events);

        let room = sim
            .room(RoomCoords::new(0, 0))
            .ok_or_else(|| "demo room vanished".to_string())?;
        if room.door(Direction::East).wall == WallState::Open {
            println!(
                "door opened, jobs_completed={}, stake_claimed={}",
                sim.player().jobs_completed,
                !sim.has_stake(RoomCoords::new(0, 0), Direction::East)
            );
            engine
                .stop_loop()
                .await
                .map_err(|err| format!("failed to stop scheduler: {err}"))?;
            return Ok(());
        }
    }
    let _ = engine.stop_loop().await;
    Err("scheduler did not finalize the demo job in time".to_string())
}

async fn run_reconcile() -> Result<(), String> {
    let sim = demo_ledger(300);
    // The previous session ended mid-job; it has fully accrued since.
    sim.advance_ticks(400);

    let engine = SyncEngine::new(Arc::clone(&sim), "local-wallet", EngineConfig::default());
    let cleaned = engine.reconcile_active_jobs().await;
    println!(
        "reconciled={} active_jobs={} jobs_completed={}",
        cleaned,
        sim.player().active_jobs.len(),
        sim.player().jobs_completed
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("snapshot") => print_snapshot().await,
        Some("simulate") => match parse_u64(args.get(2), "ticks", 25) {
            Ok(ticks) => run_simulation(ticks).await,
            Err(err) => Err(err),
        },
        Some("reconcile") => run_reconcile().await,
        _ => {
            print_usage();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
