//! Routing policy tests: the pure `route` function and the device-backed
//! `ConveyorCore` against the simulated conveyor.

use rstest::rstest;
use seeker_core::{route, CargoSights, ConveyorCore, Mode, RoutingLatch};
use seeker_hardware::SimConveyor;
use seeker_traits::Direction;

fn sights(top: bool, own: bool, opponent: bool) -> CargoSights {
    CargoSights {
        top_occupied: top,
        gap_own: own,
        gap_opponent: opponent,
    }
}

#[rstest]
// Index: opponent in the gap always ejects, whatever else is true.
#[case(Mode::Index, sights(false, false, true), Direction::Reverse, Direction::Stopped)]
#[case(Mode::Index, sights(true, true, true), Direction::Reverse, Direction::Stopped)]
// Index: full top slot parks the gap even with own cargo waiting.
#[case(Mode::Index, sights(true, true, false), Direction::Stopped, Direction::Stopped)]
// Index: own cargo advances through both stages.
#[case(Mode::Index, sights(false, true, false), Direction::Forward, Direction::Forward)]
// Index: empty conveyor sits still.
#[case(Mode::Index, sights(false, false, false), Direction::Stopped, Direction::Stopped)]
#[case(Mode::ForceIntake, sights(false, false, false), Direction::Forward, Direction::Forward)]
#[case(Mode::ForceIntake, sights(true, false, false), Direction::Forward, Direction::Stopped)]
#[case(Mode::Shoot, sights(true, true, true), Direction::Forward, Direction::Forward)]
#[case(Mode::ShootSlow, sights(true, false, false), Direction::ForwardSlow, Direction::ForwardSlow)]
#[case(Mode::ShootTop, sights(true, true, false), Direction::Stopped, Direction::Forward)]
#[case(Mode::Eject, sights(false, true, false), Direction::Reverse, Direction::Reverse)]
#[case(Mode::Stopped, sights(true, true, true), Direction::Stopped, Direction::Stopped)]
fn mode_policy_table(
    #[case] mode: Mode,
    #[case] s: CargoSights,
    #[case] gap: Direction,
    #[case] top: Direction,
) {
    let r = route(mode, s, RoutingLatch::default());
    assert_eq!(r.gap, gap);
    assert_eq!(r.top, top);
}

#[test]
fn route_is_pure() {
    let s = sights(true, true, false);
    let latch = RoutingLatch {
        ejecting: true,
        saw_own: false,
    };
    let a = route(Mode::Index, s, latch);
    let b = route(Mode::Index, s, latch);
    assert_eq!(a, b);
}

#[test]
fn index_eject_latch_settles_one_cycle_after_the_ball_clears() {
    let mut latch = RoutingLatch::default();

    // Opponent ball appears: reverse and latch.
    let r = route(Mode::Index, sights(false, false, true), latch);
    assert_eq!(r.gap, Direction::Reverse);
    assert!(r.latch.ejecting);
    latch = r.latch;

    // Ball cleared: one settling cycle with the gap held, latch released.
    let r = route(Mode::Index, sights(false, false, false), latch);
    assert_eq!(r.gap, Direction::Stopped);
    assert!(!r.latch.ejecting);
}

#[test]
fn semi_auto_admits_one_ball_per_rising_edge() {
    let mut latch = RoutingLatch::default();

    // New ball: advance.
    let r = route(Mode::SemiAuto, sights(false, true, false), latch);
    assert_eq!(r.gap, Direction::Forward);
    latch = r.latch;

    // Same ball still present: no further advance.
    let r = route(Mode::SemiAuto, sights(false, true, false), latch);
    assert_eq!(r.gap, Direction::Stopped);
    latch = r.latch;

    // Ball leaves, then a new one arrives: advance again.
    let r = route(Mode::SemiAuto, sights(false, false, false), latch);
    latch = r.latch;
    let r = route(Mode::SemiAuto, sights(false, true, false), latch);
    assert_eq!(r.gap, Direction::Forward);
}

#[test]
fn semi_auto_still_ejects_opponents() {
    let r = route(
        Mode::SemiAuto,
        sights(false, true, true),
        RoutingLatch::default(),
    );
    assert_eq!(r.gap, Direction::Reverse);
    assert!(r.latch.ejecting);
}

#[test]
fn core_applies_routing_to_the_actuators() {
    let sim = SimConveyor::new();
    let mut core = ConveyorCore::new(sim.clone(), sim.clone());

    sim.gap_own.set(true);
    core.cycle().unwrap();
    assert_eq!(sim.gap_cmd.get(), Direction::Forward);
    assert_eq!(sim.top_cmd.get(), Direction::Forward);

    sim.top_occupied.set(true);
    core.cycle().unwrap();
    assert_eq!(sim.gap_cmd.get(), Direction::Stopped);
    assert_eq!(sim.top_cmd.get(), Direction::Stopped);
}

#[test]
fn core_mode_change_applies_next_cycle_and_resets_the_latch() {
    let sim = SimConveyor::new();
    let mut core = ConveyorCore::new(sim.clone(), sim.clone());

    // Latch an ejection in Index.
    sim.gap_opponent.set(true);
    core.cycle().unwrap();
    assert!(core.last_routing().unwrap().latch.ejecting);

    // Last write wins; applied at the next cycle start with a fresh latch.
    core.set_mode(Mode::Eject);
    core.set_mode(Mode::Shoot);
    assert_eq!(core.mode(), Mode::Index);
    sim.gap_opponent.set(false);
    let r = core.cycle().unwrap();
    assert_eq!(core.mode(), Mode::Shoot);
    assert!(!r.latch.ejecting);
    assert_eq!(sim.gap_cmd.get(), Direction::Forward);
    assert_eq!(sim.top_cmd.get(), Direction::Forward);
}

#[test]
fn index_opponent_ejects_every_cycle_it_is_seen() {
    let sim = SimConveyor::new();
    let mut core = ConveyorCore::new(sim.clone(), sim.clone());
    sim.gap_opponent.set(true);
    sim.top_occupied.set(true);
    sim.gap_own.set(true);
    for _ in 0..10 {
        core.cycle().unwrap();
        assert_eq!(sim.gap_cmd.get(), Direction::Reverse);
        assert_eq!(sim.top_cmd.get(), Direction::Stopped);
    }
}
