//! Priority-ordered conveyor routing.
//!
//! Not a transition-table state machine: the policy is re-evaluated every
//! cycle from fresh sensor readings, with the previous cycle's latch as the
//! only hidden state. Index-mode conditions are checked in priority order
//! (opponent ejection before top-slot holds before intake) and must not be
//! reordered.

use eyre::WrapErr;
use seeker_traits::{CargoSensors, ConveyorActuators, Direction};

use crate::error::Result;
use crate::hw_error::map_device_error;

/// Externally commanded conveyor mode; last write wins, applied at the
/// start of the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Default autonomous routing: stage own cargo, eject opposing cargo.
    #[default]
    Index,
    /// Run the intake path unconditionally (unjamming, loading).
    ForceIntake,
    /// Feed everything into the shooter.
    Shoot,
    /// Feed at reduced speed (low-power shots).
    ShootSlow,
    /// Fire only the staged top ball; hold the gap.
    ShootTop,
    /// Advance one ball per detection.
    SemiAuto,
    /// Reverse both stages.
    Eject,
    Stopped,
}

/// One cycle's sensor snapshot, read once and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CargoSights {
    pub top_occupied: bool,
    pub gap_own: bool,
    pub gap_opponent: bool,
}

/// Cross-cycle policy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingLatch {
    /// Set while ejecting an opposing ball; gives the gap one settling
    /// cycle after the ball clears before any other rule may run it.
    pub ejecting: bool,
    /// Previous gap-own reading; SemiAuto admits one ball per rising edge.
    pub saw_own: bool,
}

/// Both actuator commands plus the latch to carry into the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routing {
    pub gap: Direction,
    pub top: Direction,
    pub latch: RoutingLatch,
}

/// Pure routing policy: same `(mode, sights, latch)` in, same routing out.
pub fn route(mode: Mode, sights: CargoSights, latch: RoutingLatch) -> Routing {
    let mut next = latch;
    let (gap, top) = match mode {
        Mode::Index => (index_gap(sights, &mut next), index_top(sights)),
        Mode::ForceIntake => {
            let top = if sights.top_occupied {
                Direction::Stopped
            } else {
                Direction::Forward
            };
            (Direction::Forward, top)
        }
        Mode::Shoot => (Direction::Forward, Direction::Forward),
        Mode::ShootSlow => (Direction::ForwardSlow, Direction::ForwardSlow),
        Mode::ShootTop => (Direction::Stopped, Direction::Forward),
        Mode::SemiAuto => {
            let fresh = sights.gap_own && !latch.saw_own;
            next.saw_own = sights.gap_own;
            let gap = if sights.gap_opponent {
                next.ejecting = true;
                Direction::Reverse
            } else if sights.top_occupied {
                Direction::Stopped
            } else if fresh {
                Direction::Forward
            } else if next.ejecting {
                next.ejecting = false;
                Direction::Stopped
            } else {
                Direction::Stopped
            };
            (gap, index_top(sights))
        }
        Mode::Eject => (Direction::Reverse, Direction::Reverse),
        Mode::Stopped => (Direction::Stopped, Direction::Stopped),
    };
    Routing {
        gap,
        top,
        latch: next,
    }
}

/// Index-mode gap routing, first match wins.
fn index_gap(sights: CargoSights, latch: &mut RoutingLatch) -> Direction {
    if sights.gap_opponent {
        latch.ejecting = true;
        Direction::Reverse
    } else if sights.top_occupied {
        Direction::Stopped
    } else if sights.gap_own {
        Direction::Forward
    } else if latch.ejecting {
        latch.ejecting = false;
        Direction::Stopped
    } else {
        Direction::Stopped
    }
}

/// Index-mode top: never feed an occupied slot (possession limit).
fn index_top(sights: CargoSights) -> Direction {
    if sights.top_occupied {
        Direction::Stopped
    } else if sights.gap_own {
        Direction::Forward
    } else {
        Direction::Stopped
    }
}

/// Owns the conveyor devices and drives the routing policy once per tick.
pub struct ConveyorCore<S: CargoSensors, A: ConveyorActuators> {
    sensors: S,
    actuators: A,
    mode: Mode,
    pending_mode: Option<Mode>,
    latch: RoutingLatch,
    last: Option<Routing>,
}

impl<S: CargoSensors, A: ConveyorActuators> ConveyorCore<S, A> {
    pub fn new(sensors: S, actuators: A) -> Self {
        Self {
            sensors,
            actuators,
            mode: Mode::default(),
            pending_mode: None,
            latch: RoutingLatch::default(),
            last: None,
        }
    }

    /// Command a mode change; takes effect at the start of the next cycle
    /// (last write wins within a tick).
    pub fn set_mode(&mut self, mode: Mode) {
        self.pending_mode = Some(mode);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Directions applied by the most recent cycle, if any.
    pub fn last_routing(&self) -> Option<Routing> {
        self.last
    }

    /// One policy evaluation: apply a pending mode, read each sensor once,
    /// route, and command both actuators.
    pub fn cycle(&mut self) -> Result<Routing> {
        if let Some(mode) = self.pending_mode.take()
            && mode != self.mode
        {
            tracing::info!(from = ?self.mode, to = ?mode, "conveyor mode change");
            self.mode = mode;
            self.latch = RoutingLatch::default();
        }

        let sights = CargoSights {
            top_occupied: self
                .sensors
                .top_slot_occupied()
                .map_err(|e| eyre::Report::new(map_device_error(&*e)))
                .wrap_err("top slot sensor")?,
            gap_own: self
                .sensors
                .gap_has_own()
                .map_err(|e| eyre::Report::new(map_device_error(&*e)))
                .wrap_err("gap own-cargo sensor")?,
            gap_opponent: self
                .sensors
                .gap_has_opponent()
                .map_err(|e| eyre::Report::new(map_device_error(&*e)))
                .wrap_err("gap opponent-cargo sensor")?,
        };

        let routing = route(self.mode, sights, self.latch);
        self.latch = routing.latch;

        if self.last.map(|r| (r.gap, r.top)) != Some((routing.gap, routing.top)) {
            tracing::debug!(gap = ?routing.gap, top = ?routing.top, ?sights, "conveyor routing");
        }
        self.actuators
            .set_gap(routing.gap)
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("gap actuator")?;
        self.actuators
            .set_top(routing.top)
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("top actuator")?;
        self.last = Some(routing);
        Ok(routing)
    }
}
