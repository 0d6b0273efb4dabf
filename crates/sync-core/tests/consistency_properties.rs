use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use contracts::{Direction, OccupantActivity, OccupantView};
use proptest::prelude::*;
use sync_core::occupancy;
use sync_core::overlay::{OptimisticOverlay, PENDING_JOB_TIMEOUT};
use sync_core::progress::JobProgress;

fn occupant(identity: &str) -> OccupantView {
    OccupantView {
        identity: identity.to_string(),
        activity: OccupantActivity::Idle,
    }
}

fn occupant_set(identities: &BTreeSet<String>) -> Vec<OccupantView> {
    identities.iter().map(|id| occupant(id)).collect()
}

proptest! {
    #[test]
    fn property_1_remaining_is_monotonic_non_increasing(
        helper_count in 1u32..16,
        start_tick in 1u64..1_000_000,
        required in 1u64..10_000,
        offset in 0u64..40_000,
    ) {
        let tick = start_tick + offset;
        let now = JobProgress::compute(helper_count, start_tick, required, tick, 1);
        let next = JobProgress::compute(helper_count, start_tick, required, tick + 1, 1);
        prop_assert!(next.remaining <= now.remaining);
    }

    #[test]
    fn property_2_remaining_hits_zero_at_the_accrual_bound(
        helper_count in 1u64..16,
        start_tick in 1u64..1_000_000,
        required in 1u64..10_000,
    ) {
        let bound = start_tick + required.div_ceil(helper_count);
        let at_bound = JobProgress::compute(helper_count as u32, start_tick, required, bound, 1);
        prop_assert_eq!(at_bound.remaining, 0);

        if bound > start_tick + 1 {
            let before = JobProgress::compute(helper_count as u32, start_tick, required, bound - 1, 0);
            prop_assert!(before.remaining > 0);
        }
    }

    #[test]
    fn property_3_diff_of_identical_sets_is_empty(
        identities in proptest::collection::btree_set("[a-z]{1,8}", 0..12),
    ) {
        let set = occupant_set(&identities);
        prop_assert_eq!(occupancy::diff(Direction::North, &set, &set), None);
    }

    #[test]
    fn property_4_diff_is_order_insensitive(
        identities in proptest::collection::btree_set("[a-z]{1,8}", 0..12),
    ) {
        let forward = occupant_set(&identities);
        let mut reversed = forward.clone();
        reversed.reverse();
        prop_assert_eq!(occupancy::diff(Direction::East, &forward, &reversed), None);
    }

    #[test]
    fn property_5_single_addition_reports_one_join(
        identities in proptest::collection::btree_set("[a-z]{1,8}", 0..12),
        newcomer in "[0-9]{4,8}",
    ) {
        prop_assume!(!identities.contains(&newcomer));
        let previous = occupant_set(&identities);
        let mut current = previous.clone();
        current.push(occupant(&newcomer));

        let delta = occupancy::diff(Direction::South, &previous, &current)
            .expect("one member joined");
        prop_assert_eq!(delta.joined, vec![newcomer.clone()]);
        prop_assert!(delta.left.is_empty());

        // And symmetrically for removal.
        let delta = occupancy::diff(Direction::South, &current, &previous)
            .expect("one member left");
        prop_assert!(delta.joined.is_empty());
        prop_assert_eq!(delta.left, vec![newcomer]);
    }

    #[test]
    fn property_6_overlay_window_is_exactly_the_timeout(
        offset_ms in 0u64..30_000,
    ) {
        let t0 = Instant::now();
        let mut overlay = OptimisticOverlay::new();
        overlay.note_join_confirmed(Direction::West, t0);

        let probe = t0 + Duration::from_millis(offset_ms);
        let visible = overlay.pending_job_direction(probe).is_some();
        prop_assert_eq!(visible, Duration::from_millis(offset_ms) < PENDING_JOB_TIMEOUT);
    }
}
