//! End-to-end synchronisation scenarios, run once per feed representation.

use els_common::error::DriveFault;
use els_core::{FeedRatio, PulseEdge, PulseState};

use super::common::Rig;

/// Instantiate each generic scenario for both ratio representations.
macro_rules! for_each_representation {
    ($($scenario:ident),* $(,)?) => {
        mod rational {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario::<els_core::RationalFeed>();
                }
            )*
        }

        mod float {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario::<els_core::FloatFeed>();
                }
            )*
        }
    };
}

for_each_representation!(
    one_to_one_follows_a_thousand_ticks,
    fractional_feed_lands_on_exact_truncation,
    null_feed_freezes_positions,
    reselecting_after_null_feed_does_not_burst,
    feed_change_resyncs_without_pulses,
    direction_reversal_costs_one_extra_invocation,
    reversal_during_a_forward_pulse_lands_on_desired,
    feed_change_during_a_reverse_pulse_lands_on_desired,
    in_sync_ticks_are_idempotent,
    backlog_boundary_through_the_core,
    faulted_drive_coasts_in_sync_then_recovers_on_power_request,
    fault_taken_mid_pulse_releases_step_and_recovers_cleanly,
    power_off_stops_pulses_but_keeps_tracking,
);

/// Tick until the drive holds a step pulse in `state`.
fn tick_until_state<R: FeedRatio>(rig: &mut Rig<R>, state: PulseState) {
    for _ in 0..10 {
        if rig.core.drive().state() == state {
            return;
        }
        rig.core.tick();
    }
    panic!("drive never reached {state:?}");
}

// ── Steady following ────────────────────────────────────────────────

fn one_to_one_follows_a_thousand_ticks<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:1");

    let mut invocations = 0;
    for _ in 0..1_000 {
        rig.spin(1);
        rig.core.tick();
        invocations += 1;
    }
    // The spindle has stopped; let the drive finish.
    if rig.current() != 1_000 {
        invocations += rig.settle(2_000);
    }

    assert_eq!(rig.current(), 1_000);
    assert!(
        invocations <= 2_001,
        "took {invocations} invocations; the bound is 2000 step calls plus the one \
         direction-set call needed from rest"
    );
    assert_eq!(rig.step.rising_edges(), 1_000);
    assert_eq!(rig.step.falling_edges(), 1_000);
    assert_eq!(rig.dir.rising_edges(), 1);
    assert_eq!(rig.dir.falling_edges(), 0, "direction never toggles back");
}

fn fractional_feed_lands_on_exact_truncation<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(10_000);
    rig.engage("3:7");
    for _ in 0..100 {
        rig.spin(13);
        rig.core.tick();
    }
    rig.settle(10_000);
    // 1300 × 3 / 7 = 557.14…
    assert_eq!(rig.current(), 557);
    assert_eq!(rig.step.rising_edges(), 557);
}

// ── Configuration changes ───────────────────────────────────────────

fn null_feed_freezes_positions<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:1");
    rig.spin(40);
    rig.settle(200);
    let (current, desired) = (rig.current(), rig.desired());
    let edges = rig.step.rising_edges();

    rig.handle.set_feed_by_name("off").unwrap();
    for _ in 0..100 {
        rig.spin(7);
        let report = rig.core.tick();
        assert!(!report.serviced);
    }
    assert_eq!(rig.current(), current);
    assert_eq!(rig.desired(), desired);
    assert_eq!(rig.step.rising_edges(), edges);

    rig.handle.set_feed(None).unwrap();
    rig.spin(7);
    rig.core.tick();
    assert_eq!(rig.current(), current);
    assert_eq!(rig.step.rising_edges(), edges);
}

fn reselecting_after_null_feed_does_not_burst<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(10);
    rig.engage("1:1");
    rig.handle.set_feed_by_name("off").unwrap();
    rig.core.tick();

    rig.spin(5_000);
    let report = rig.engage("1:1");
    assert!(report.resynced);
    assert!(report.fault.is_empty());
    assert_eq!(rig.current(), 5_000);
    assert_eq!(rig.step.rising_edges(), 0);
}

fn feed_change_resyncs_without_pulses<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:2");
    rig.spin(400);
    rig.settle(1_000);
    let edges = rig.step.rising_edges();
    let state = rig.core.drive().state();
    assert!(!state.step_level());

    rig.handle.set_feed_by_name("1:1").unwrap();
    let report = rig.core.tick();
    assert!(report.resynced);
    assert_eq!(report.edge, PulseEdge::None);
    assert_eq!(rig.current(), rig.desired());
    assert_eq!(rig.current(), 400);
    assert_eq!(rig.core.drive().state(), state, "no step state entered");
    assert_eq!(rig.step.rising_edges(), edges);
}

fn direction_reversal_costs_one_extra_invocation<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:1");
    rig.spin(20);
    rig.settle(100);
    assert_eq!(rig.core.drive().state(), PulseState::DirHigh);
    let edges = rig.step.rising_edges();

    // Instant of reversal: forced onto the new desired, nothing emitted.
    rig.handle.set_direction(true);
    let report = rig.core.tick();
    assert!(report.resynced);
    assert_eq!(report.edge, PulseEdge::None);
    assert_eq!(rig.current(), -20);
    assert_eq!(rig.step.rising_edges(), edges);

    // First move in the new sense: one direction toggle, then the step.
    rig.spin(1);
    let edges_seen: Vec<PulseEdge> = (0..3).map(|_| rig.core.tick().edge).collect();
    assert_eq!(
        edges_seen,
        [
            PulseEdge::DirectionCleared,
            PulseEdge::StepAsserted,
            PulseEdge::StepReleased
        ]
    );
    assert_eq!(rig.current(), -21);
    assert_eq!(rig.dir.falling_edges(), 1);
}

fn reversal_during_a_forward_pulse_lands_on_desired<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:1");
    rig.spin(20);
    tick_until_state(&mut rig, PulseState::StepDirHigh);
    let edges = rig.step.rising_edges();

    rig.handle.set_direction(true);
    let report = rig.core.tick();
    assert!(report.resynced);
    assert_eq!(report.edge, PulseEdge::StepReleased, "pulse in flight completes");
    assert_eq!(rig.current(), -20);
    assert_eq!(rig.desired(), -20);

    // In sync: no correction step and no direction toggle follow.
    for _ in 0..10 {
        assert_eq!(rig.core.tick().edge, PulseEdge::None);
    }
    assert_eq!(rig.step.rising_edges(), edges);
    assert_eq!(rig.dir.falling_edges(), 0);
}

fn feed_change_during_a_reverse_pulse_lands_on_desired<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.handle.set_direction(true);
    rig.engage("1:1");
    rig.spin(20);
    tick_until_state(&mut rig, PulseState::StepDirLow);
    let edges = rig.step.rising_edges();

    rig.handle.set_feed_by_name("1:2").unwrap();
    let report = rig.core.tick();
    assert!(report.resynced);
    assert_eq!(report.edge, PulseEdge::StepReleased);
    assert_eq!(rig.current(), -10);
    assert_eq!(rig.current(), rig.desired());

    for _ in 0..10 {
        assert_eq!(rig.core.tick().edge, PulseEdge::None);
    }
    assert_eq!(rig.step.rising_edges(), edges);
    assert_eq!(rig.dir.rising_edges(), 0);
}

fn in_sync_ticks_are_idempotent<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(1_000);
    rig.engage("1:1");
    rig.spin(10);
    rig.settle(100);
    let edges = (rig.step.rising_edges(), rig.dir.rising_edges());

    for _ in 0..500 {
        let report = rig.core.tick();
        assert_eq!(report.edge, PulseEdge::None);
    }
    assert_eq!(rig.current(), 10);
    assert_eq!((rig.step.rising_edges(), rig.dir.rising_edges()), edges);
}

// ── Faults ──────────────────────────────────────────────────────────

fn backlog_boundary_through_the_core<R: FeedRatio>() {
    const B: u32 = 25;
    let mut rig = Rig::<R>::new(B);
    rig.engage("1:1");

    rig.spin(B as u64);
    let report = rig.core.tick();
    assert!(report.fault.is_empty(), "gap of exactly B");
    assert!(rig.core.drive().is_enabled());
    assert_eq!(report.edge, PulseEdge::DirectionSet);

    rig.spin(1);
    let report = rig.core.tick();
    assert!(report.fault.contains(DriveFault::BACKLOG_OVERFLOW), "gap of B + 1");
    assert!(!rig.core.drive().is_enabled());
    assert!(!rig.enable.level());
    assert!(rig.handle.is_backlog_fault());
}

fn faulted_drive_coasts_in_sync_then_recovers_on_power_request<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(5);
    rig.engage("1:1");
    rig.spin(100);
    assert!(rig.core.tick().fault.has_critical());
    let edges = rig.step.rising_edges();

    // Disabled: current tracks desired, no pulses, fault stays latched.
    for _ in 0..20 {
        rig.spin(3);
        let report = rig.core.tick();
        assert_eq!(report.edge, PulseEdge::Tracked);
        assert!(report.fault.has_critical());
        assert_eq!(rig.current(), rig.desired());
    }
    assert_eq!(rig.step.rising_edges(), edges);

    rig.handle.set_power_on(true);
    rig.spin(2);
    let report = rig.core.tick();
    assert!(report.fault.is_empty());
    assert!(report.resynced);
    assert_eq!(rig.current(), 162);
    assert!(rig.enable.level());

    rig.spin(3);
    rig.settle(50);
    assert_eq!(rig.current(), 165);
    assert_eq!(rig.step.rising_edges(), edges + 3);
}

fn fault_taken_mid_pulse_releases_step_and_recovers_cleanly<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(5);
    rig.engage("1:1");
    rig.spin(3);
    tick_until_state(&mut rig, PulseState::StepDirHigh);
    assert!(rig.step.level());

    rig.spin(100);
    let report = rig.core.tick();
    assert!(report.fault.has_critical());
    assert!(!rig.step.level(), "step line dropped with the drive");
    for _ in 0..5 {
        rig.core.tick();
        assert!(!rig.step.level());
    }

    rig.handle.set_power_on(true);
    let report = rig.core.tick();
    assert!(report.resynced);
    assert_eq!(rig.current(), rig.desired());
    for _ in 0..10 {
        assert_eq!(rig.core.tick().edge, PulseEdge::None);
    }
    assert_eq!(rig.step.rising_edges(), 1);
    assert_eq!(rig.step.falling_edges(), 1);
}

fn power_off_stops_pulses_but_keeps_tracking<R: FeedRatio>() {
    let mut rig = Rig::<R>::new(100);
    rig.engage("1:1");
    rig.handle.set_power_on(false);
    rig.spin(50);
    for _ in 0..10 {
        rig.core.tick();
    }
    assert!(!rig.enable.level());
    assert_eq!(rig.current(), 50);
    assert_eq!(rig.step.rising_edges(), 0);
    assert!(!rig.handle.status().drive_enabled);
}
