#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Simulated robot devices behind the `seeker_traits` contracts.
//!
//! These are plant models for closed-loop tests and demos: the drivetrain
//! integrates its commanded outputs into heading/odometry, the vision sensor
//! reports the geometric offset to a configurable goal, and the conveyor
//! records the last commanded direction per stage. Real actuator drivers are
//! out of scope; anything implementing the traits can replace these.

pub mod error;

use std::cell::Cell;
use std::rc::Rc;

use error::HwError;
use seeker_traits::{
    CargoSensors, ConveyorActuators, DeviceError, Direction, Drivetrain, Gear, MotionSensor,
    VisionSensor,
};

/// Shared kinematic state of the simulated robot.
///
/// `Rc<Cell<..>>` so that the vision sensor, the motion sensor and the
/// drivetrain can observe one plant without borrowing across each other.
#[derive(Debug, Clone, Default)]
pub struct SimPlant {
    /// Robot heading (deg, continuous).
    heading_deg: Rc<Cell<f64>>,
    /// Signed distance traveled along the current heading (m).
    odometer_m: Rc<Cell<f64>>,
    /// Current ground speed (m/s).
    velocity_mps: Rc<Cell<f64>>,
    /// Bearing from robot to goal (deg, in the same frame as heading).
    goal_bearing_deg: Rc<Cell<f64>>,
    /// Straight-line range to goal (m).
    goal_range_m: Rc<Cell<f64>>,
}

impl SimPlant {
    pub fn new(goal_bearing_deg: f64, goal_range_m: f64) -> Self {
        let p = Self::default();
        p.goal_bearing_deg.set(goal_bearing_deg);
        p.goal_range_m.set(goal_range_m);
        p
    }

    /// Integrate one control period of `dt` seconds given the last arcade
    /// command. Turn rate and speed use flat first-order gains; good enough
    /// to close the loop in tests.
    pub fn integrate(&self, forward: f64, turn: f64, dt: f64) {
        const MAX_TURN_DPS: f64 = 180.0;
        const MAX_SPEED_MPS: f64 = 3.0;
        let heading = self.heading_deg.get() + turn * MAX_TURN_DPS * dt;
        self.heading_deg.set(heading);
        let v = forward * MAX_SPEED_MPS;
        self.velocity_mps.set(v);
        self.odometer_m.set(self.odometer_m.get() + v * dt);
        // Forward motion closes range on the goal when roughly aligned.
        let err = (self.goal_bearing_deg.get() - heading).to_radians();
        let closed = v * dt * err.cos();
        self.goal_range_m.set((self.goal_range_m.get() - closed).max(0.0));
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg.get()
    }

    pub fn goal_range_m(&self) -> f64 {
        self.goal_range_m.get()
    }
}

/// Simulated vision sensor reporting offsets to the plant's goal.
pub struct SimVision {
    plant: SimPlant,
    enabled: Rc<Cell<bool>>,
    visible: Rc<Cell<bool>>,
    /// Camera geometry used to synthesize the elevation angle.
    camera_height_m: f64,
    goal_height_m: f64,
    camera_pitch_deg: f64,
}

impl SimVision {
    pub fn new(plant: SimPlant) -> Self {
        Self {
            plant,
            enabled: Rc::new(Cell::new(false)),
            visible: Rc::new(Cell::new(true)),
            camera_height_m: 0.6,
            goal_height_m: 2.6,
            camera_pitch_deg: 30.0,
        }
    }

    /// Handle to force target visibility from a test (e.g. occlusion).
    pub fn visibility_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.visible)
    }

    /// Handle observing the enable flag (tests assert release-on-exit).
    pub fn enabled_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.enabled)
    }

    fn ensure_enabled(&self) -> Result<(), DeviceError> {
        if self.enabled.get() {
            Ok(())
        } else {
            Err(Box::new(HwError::PipelineDisabled))
        }
    }
}

impl VisionSensor for SimVision {
    fn has_target(&mut self) -> Result<bool, DeviceError> {
        self.ensure_enabled()?;
        Ok(self.visible.get())
    }

    fn target_angle(&mut self) -> Result<f64, DeviceError> {
        self.ensure_enabled()?;
        Ok(self.plant.goal_bearing_deg.get() - self.plant.heading_deg.get())
    }

    fn target_elevation(&mut self) -> Result<f64, DeviceError> {
        self.ensure_enabled()?;
        let rise = self.goal_height_m - self.camera_height_m;
        let range = self.plant.goal_range_m.get().max(0.05);
        Ok((rise / range).atan().to_degrees() - self.camera_pitch_deg)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), DeviceError> {
        tracing::debug!(enabled, "sim vision enable");
        self.enabled.set(enabled);
        Ok(())
    }
}

/// Simulated gyro + odometry reading the shared plant.
pub struct SimMotion {
    plant: SimPlant,
}

impl SimMotion {
    pub fn new(plant: SimPlant) -> Self {
        Self { plant }
    }
}

impl MotionSensor for SimMotion {
    fn heading_degrees(&mut self) -> Result<f64, DeviceError> {
        Ok(self.plant.heading_deg.get())
    }

    fn distance_traveled(&mut self) -> Result<f64, DeviceError> {
        Ok(self.plant.odometer_m.get())
    }

    fn velocity(&mut self) -> Result<f64, DeviceError> {
        Ok(self.plant.velocity_mps.get())
    }
}

/// Simulated drivetrain: records the last command and integrates the plant.
pub struct SimDrivetrain {
    plant: SimPlant,
    period_s: f64,
    last_forward: Rc<Cell<f64>>,
    last_turn: Rc<Cell<f64>>,
    gear: Rc<Cell<Gear>>,
}

impl SimDrivetrain {
    pub fn new(plant: SimPlant, period_s: f64) -> Self {
        Self {
            plant,
            period_s,
            last_forward: Rc::new(Cell::new(0.0)),
            last_turn: Rc::new(Cell::new(0.0)),
            gear: Rc::new(Cell::new(Gear::Low)),
        }
    }

    pub fn last_command(&self) -> (f64, f64) {
        (self.last_forward.get(), self.last_turn.get())
    }

    pub fn gear_handle(&self) -> Rc<Cell<Gear>> {
        Rc::clone(&self.gear)
    }
}

impl Drivetrain for SimDrivetrain {
    fn drive_arcade(&mut self, forward: f64, turn: f64) -> Result<(), DeviceError> {
        if !forward.is_finite() || !turn.is_finite() {
            return Err(Box::new(HwError::Bus("non-finite drive command".into())));
        }
        self.last_forward.set(forward);
        self.last_turn.set(turn);
        self.plant.integrate(forward, turn, self.period_s);
        Ok(())
    }

    fn set_gear(&mut self, gear: Gear) -> Result<(), DeviceError> {
        tracing::debug!(?gear, "sim gear shift");
        self.gear.set(gear);
        Ok(())
    }
}

/// Simulated conveyor: scripted sensor values, recorded actuator commands.
#[derive(Debug, Clone, Default)]
pub struct SimConveyor {
    pub top_occupied: Rc<Cell<bool>>,
    pub gap_own: Rc<Cell<bool>>,
    pub gap_opponent: Rc<Cell<bool>>,
    pub gap_cmd: Rc<Cell<Direction>>,
    pub top_cmd: Rc<Cell<Direction>>,
}

impl SimConveyor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CargoSensors for SimConveyor {
    fn top_slot_occupied(&mut self) -> Result<bool, DeviceError> {
        Ok(self.top_occupied.get())
    }

    fn gap_has_own(&mut self) -> Result<bool, DeviceError> {
        Ok(self.gap_own.get())
    }

    fn gap_has_opponent(&mut self) -> Result<bool, DeviceError> {
        Ok(self.gap_opponent.get())
    }
}

impl ConveyorActuators for SimConveyor {
    fn set_gap(&mut self, dir: Direction) -> Result<(), DeviceError> {
        self.gap_cmd.set(dir);
        Ok(())
    }

    fn set_top(&mut self, dir: Direction) -> Result<(), DeviceError> {
        self.top_cmd.set(dir);
        Ok(())
    }
}
