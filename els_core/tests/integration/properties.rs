//! Property tests for the feed arithmetic and the pulse state machine.

use els_common::feed::{FeedDirection, FeedSpec, FeedTable};
use els_common::io::DriveLinesConfig;
use els_core::feed::{FeedRatio, FloatFeed, RationalFeed, compute_desired};
use els_core::hal::DriveLines;
use els_core::hal::sim::{SimInput, SimOutput};
use els_core::{PulseEdge, StepPulseGenerator};
use proptest::prelude::*;

use super::common::Rig;

fn enabled_drive() -> (StepPulseGenerator<SimOutput, SimInput>, SimOutput, SimOutput) {
    let (step, dir) = (SimOutput::new(), SimOutput::new());
    let lines = DriveLines::new(
        step.clone(),
        dir.clone(),
        SimOutput::new(),
        SimInput::new(true),
        &DriveLinesConfig::default(),
    );
    let mut drive = StepPulseGenerator::new(lines, u32::MAX);
    drive.set_enabled(true);
    (drive, step, dir)
}

proptest! {
    #[test]
    fn rational_is_exact_truncation(
        count in 0u64..(1u64 << 40),
        n in 1u32..100_000,
        d in 1u32..100_000,
    ) {
        let ratio = RationalFeed::from_spec(&FeedSpec::new(n, d).unwrap());
        let expected = (count as u128 * n as u128 / d as u128) as i64;
        prop_assert_eq!(compute_desired(count, &ratio, FeedDirection::Forward), expected);
        prop_assert_eq!(compute_desired(count, &ratio, FeedDirection::Reverse), -expected);
    }

    #[test]
    fn float_tracks_rational_within_one_step(
        count in 0u64..(1u64 << 32),
        n in 1u32..10_000,
        d in 1u32..10_000,
    ) {
        let spec = FeedSpec::new(n, d).unwrap();
        let exact = RationalFeed::from_spec(&spec).desired_steps(count, FeedDirection::Forward);
        let float = FloatFeed::from_spec(&spec).desired_steps(count, FeedDirection::Forward);
        prop_assert!((exact - float).abs() <= 1, "exact={} float={}", exact, float);
    }

    #[test]
    fn core_desired_matches_truncation_after_resync(
        moves in prop::collection::vec(0u64..20, 1..40),
        n in 1u32..50,
        d in 1u32..50,
    ) {
        let table = FeedTable::new([("f", FeedSpec::new(n, d).unwrap())]).unwrap();
        let mut rig = Rig::<RationalFeed>::with_table(u32::MAX, table);
        rig.engage("f");
        let mut count = 0u64;
        for m in moves {
            rig.spin(m);
            count += m;
            rig.core.tick();
            prop_assert_eq!(rig.desired(), (count * n as u64 / d as u64) as i64);
        }
        rig.settle(200_000);
        prop_assert_eq!(rig.current(), rig.desired());
    }

    #[test]
    fn pulse_integrity(targets in prop::collection::vec(-200i64..200, 1..20)) {
        let (mut drive, step, dir) = enabled_drive();
        let mut released = 0u64;
        let mut reversals = 0u64;

        for target in targets {
            drive.set_desired_position(target);
            for _ in 0..1_000 {
                let dir_before = dir.level();
                match drive.service() {
                    PulseEdge::StepAsserted | PulseEdge::StepReleased => {
                        prop_assert_eq!(dir.level(), dir_before, "direction moved with a step edge");
                    }
                    PulseEdge::DirectionSet | PulseEdge::DirectionCleared => {
                        prop_assert!(!step.level(), "direction moved while step was high");
                        reversals += 1;
                    }
                    PulseEdge::None | PulseEdge::Tracked => {}
                }
                if step.level() {
                    continue;
                }
                if drive.current_position() == target {
                    break;
                }
            }
            released = step.falling_edges();
            prop_assert_eq!(drive.current_position(), target);
        }

        let counters = drive.counters();
        prop_assert_eq!(counters.total_steps(), released);
        prop_assert_eq!(step.rising_edges(), released);
        prop_assert_eq!(counters.net_steps(), drive.current_position());
        prop_assert_eq!(counters.direction_changes, reversals);
    }

    #[test]
    fn in_sync_service_is_idempotent(position in any::<i32>(), calls in 1usize..200) {
        let (mut drive, step, dir) = enabled_drive();
        let position = position as i64;
        drive.set_current_position(position);
        drive.set_desired_position(position);
        for _ in 0..calls {
            prop_assert_eq!(drive.service(), PulseEdge::None);
        }
        prop_assert_eq!(drive.current_position(), position);
        prop_assert_eq!(step.rising_edges(), 0);
        prop_assert_eq!(dir.rising_edges(), 0);
    }

    #[test]
    fn resync_never_emits_a_step(
        first in 0u64..5_000,
        partial_ticks in 0usize..64,
        second in 0u64..5_000,
        reverse in any::<bool>(),
    ) {
        let mut rig = Rig::<RationalFeed>::new(u32::MAX);
        rig.engage("1:2");
        rig.spin(first);
        // Stop anywhere, including with a step pulse in flight.
        for _ in 0..partial_ticks {
            rig.core.tick();
        }
        let edges = rig.step.rising_edges();

        rig.handle.set_feed_by_name("3:7").unwrap();
        rig.handle.set_direction(reverse);
        rig.spin(second);
        let report = rig.core.tick();
        prop_assert!(report.resynced);
        prop_assert!(!matches!(report.edge, PulseEdge::StepAsserted));
        prop_assert_eq!(rig.current(), rig.desired());
        prop_assert_eq!(rig.step.rising_edges(), edges);

        for _ in 0..5 {
            prop_assert_eq!(rig.core.tick().edge, PulseEdge::None);
        }
        prop_assert!(!rig.step.level());
    }
}
