pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error type shared by all hardware-facing trait methods.
pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

/// Pull-based producer of one scalar sample per query.
///
/// May be backed by a live sensor, a shared per-tick snapshot, or a pure
/// function. Consumers own the stream; the stream owns nothing observable.
pub trait ScalarStream {
    fn get(&mut self) -> Result<f64, DeviceError>;
}

/// Any `FnMut() -> Result<f64, _>` closure is a stream.
impl<F> ScalarStream for F
where
    F: FnMut() -> Result<f64, DeviceError>,
{
    fn get(&mut self) -> Result<f64, DeviceError> {
        self()
    }
}

/// Target-tracking camera (vision pipeline).
///
/// Angles are in degrees; positive yaw means the target is to the right of
/// the crosshair. `set_enabled(false)` must release the pipeline/LED so
/// another consumer can claim it.
pub trait VisionSensor {
    fn has_target(&mut self) -> Result<bool, DeviceError>;
    /// Horizontal offset from crosshair to target (deg).
    fn target_angle(&mut self) -> Result<f64, DeviceError>;
    /// Vertical offset from crosshair to target (deg).
    fn target_elevation(&mut self) -> Result<f64, DeviceError>;
    fn set_enabled(&mut self, enabled: bool) -> Result<(), DeviceError>;
}

/// Gyro + odometry readings from the drivetrain.
pub trait MotionSensor {
    /// Continuous heading (deg); accumulates beyond ±180.
    fn heading_degrees(&mut self) -> Result<f64, DeviceError>;
    /// Distance traveled since power-on (meters); signed.
    fn distance_traveled(&mut self) -> Result<f64, DeviceError>;
    /// Ground speed (m/s); signed.
    fn velocity(&mut self) -> Result<f64, DeviceError>;
}

/// Drivetrain gearing for gross vs. precise motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gear {
    Low,
    High,
}

/// Drive base command surface.
pub trait Drivetrain {
    /// Arcade drive: `forward` and `turn` in [-1.0, 1.0].
    fn drive_arcade(&mut self, forward: f64, turn: f64) -> Result<(), DeviceError>;
    fn set_gear(&mut self, gear: Gear) -> Result<(), DeviceError>;
}

/// Commanded direction for one conveyor stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Stopped,
    Forward,
    ForwardSlow,
    Reverse,
}

/// Object-presence sensors feeding the conveyor policy.
pub trait CargoSensors {
    /// Ball staged in the top slot, ready to shoot.
    fn top_slot_occupied(&mut self) -> Result<bool, DeviceError>;
    /// Own-alliance ball sitting in the gap between stages.
    fn gap_has_own(&mut self) -> Result<bool, DeviceError>;
    /// Opposing-alliance ball sitting in the gap.
    fn gap_has_opponent(&mut self) -> Result<bool, DeviceError>;
}

/// The two independently driven conveyor stages.
pub trait ConveyorActuators {
    fn set_gap(&mut self, dir: Direction) -> Result<(), DeviceError>;
    fn set_top(&mut self, dir: Direction) -> Result<(), DeviceError>;
}

// Boxed trait objects delegate, so cores can be built over `Box<dyn _>`.

impl<T: VisionSensor + ?Sized> VisionSensor for Box<T> {
    fn has_target(&mut self) -> Result<bool, DeviceError> {
        (**self).has_target()
    }
    fn target_angle(&mut self) -> Result<f64, DeviceError> {
        (**self).target_angle()
    }
    fn target_elevation(&mut self) -> Result<f64, DeviceError> {
        (**self).target_elevation()
    }
    fn set_enabled(&mut self, enabled: bool) -> Result<(), DeviceError> {
        (**self).set_enabled(enabled)
    }
}

impl<T: MotionSensor + ?Sized> MotionSensor for Box<T> {
    fn heading_degrees(&mut self) -> Result<f64, DeviceError> {
        (**self).heading_degrees()
    }
    fn distance_traveled(&mut self) -> Result<f64, DeviceError> {
        (**self).distance_traveled()
    }
    fn velocity(&mut self) -> Result<f64, DeviceError> {
        (**self).velocity()
    }
}

impl<T: Drivetrain + ?Sized> Drivetrain for Box<T> {
    fn drive_arcade(&mut self, forward: f64, turn: f64) -> Result<(), DeviceError> {
        (**self).drive_arcade(forward, turn)
    }
    fn set_gear(&mut self, gear: Gear) -> Result<(), DeviceError> {
        (**self).set_gear(gear)
    }
}

impl<T: CargoSensors + ?Sized> CargoSensors for Box<T> {
    fn top_slot_occupied(&mut self) -> Result<bool, DeviceError> {
        (**self).top_slot_occupied()
    }
    fn gap_has_own(&mut self) -> Result<bool, DeviceError> {
        (**self).gap_has_own()
    }
    fn gap_has_opponent(&mut self) -> Result<bool, DeviceError> {
        (**self).gap_has_opponent()
    }
}

impl<T: ConveyorActuators + ?Sized> ConveyorActuators for Box<T> {
    fn set_gap(&mut self, dir: Direction) -> Result<(), DeviceError> {
        (**self).set_gap(dir)
    }
    fn set_top(&mut self, dir: Direction) -> Result<(), DeviceError> {
        (**self).set_top(dir)
    }
}
