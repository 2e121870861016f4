//! Plain runtime parameter structs for the control loops.
//!
//! `seeker_config` owns the serde/TOML schemas; these are the validated,
//! hot-swappable values the loops actually consume. All parameters may be
//! re-read and replaced between ticks.

/// PID gains plus integrator gating for one feedback loop.
#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Integrator accumulates only while |error| < range (anti-windup).
    pub integrator_range: f64,
    /// Accumulated integral term is clamped to ±limit.
    pub integrator_limit: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.02,
            ki: 0.0,
            kd: 0.001,
            integrator_range: 5.0,
            integrator_limit: 0.25,
        }
    }
}

impl From<seeker_config::PidCfg> for PidGains {
    fn from(c: seeker_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            integrator_range: c.integrator_range,
            integrator_limit: c.integrator_limit,
        }
    }
}

/// Shared parameters of one complementary-fusion estimator.
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    /// Shared low/high-pass time constant (s).
    pub time_constant_s: f64,
    /// Control tick period (s).
    pub period_s: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            time_constant_s: 0.25,
            period_s: 0.02,
        }
    }
}

/// Alignment loop tuning values (see `seeker_config::AlignCfg` for docs).
#[derive(Debug, Clone, Copy)]
pub struct AlignParams {
    pub sample_rate_hz: u32,
    pub angle_tolerance_deg: f64,
    pub distance_tolerance_m: f64,
    pub max_angle_for_movement_deg: f64,
    pub velocity_threshold_mps: f64,
    pub done_debounce_s: f64,
    pub speed_filter_time_constant_s: f64,
    pub max_attempt_ms: u64,
    pub vision_loss_abort_ms: u64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self::from(seeker_config::AlignCfg::default())
    }
}

impl From<seeker_config::AlignCfg> for AlignParams {
    fn from(c: seeker_config::AlignCfg) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            angle_tolerance_deg: c.angle_tolerance_deg,
            distance_tolerance_m: c.distance_tolerance_m,
            max_angle_for_movement_deg: c.max_angle_for_movement_deg,
            velocity_threshold_mps: c.velocity_threshold_mps,
            done_debounce_s: c.done_debounce_s,
            speed_filter_time_constant_s: c.speed_filter_time_constant_s,
            max_attempt_ms: c.max_attempt_ms,
            vision_loss_abort_ms: c.vision_loss_abort_ms,
        }
    }
}

impl AlignParams {
    /// Control tick period in seconds.
    pub fn period_s(&self) -> f64 {
        1.0 / f64::from(self.sample_rate_hz.max(1))
    }
}

/// Camera mounting geometry for elevation→distance conversion.
#[derive(Debug, Clone, Copy)]
pub struct CameraGeometry {
    pub camera_height_m: f64,
    pub goal_height_m: f64,
    pub camera_pitch_deg: f64,
}

impl Default for CameraGeometry {
    fn default() -> Self {
        Self::from(seeker_config::CameraCfg::default())
    }
}

impl From<seeker_config::CameraCfg> for CameraGeometry {
    fn from(c: seeker_config::CameraCfg) -> Self {
        Self {
            camera_height_m: c.camera_height_m,
            goal_height_m: c.goal_height_m,
            camera_pitch_deg: c.camera_pitch_deg,
        }
    }
}

impl CameraGeometry {
    /// Distance to the goal from the camera's reported elevation angle:
    /// `d = (goal_h - camera_h) / tan(pitch + elevation)`.
    ///
    /// Returns `None` unless the combined angle lies strictly between the
    /// horizon and vertical; anything else is a vision glitch, treated as an
    /// unusable sample.
    pub fn distance_from_elevation(&self, elevation_deg: f64) -> Option<f64> {
        let angle = (self.camera_pitch_deg + elevation_deg).to_radians();
        if !(angle.is_finite() && angle > 0.0 && angle < std::f64::consts::FRAC_PI_2) {
            return None;
        }
        let rise = self.goal_height_m - self.camera_height_m;
        let d = rise / angle.tan();
        (d.is_finite() && d > 0.0).then_some(d)
    }
}

/// What feeds the range estimator's setpoint stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceSource {
    /// Live vision elevation converted through `CameraGeometry`.
    Vision,
    /// Externally supplied starting distance; odometry tracks motion from it.
    Fixed(f64),
}

/// Range loop goal: converge the fused distance to `desired_distance_m`.
#[derive(Debug, Clone, Copy)]
pub struct RangeGoal {
    pub desired_distance_m: f64,
    pub source: DistanceSource,
}

impl RangeGoal {
    pub fn measured(desired_distance_m: f64) -> Self {
        Self {
            desired_distance_m,
            source: DistanceSource::Vision,
        }
    }

    pub fn fixed(desired_distance_m: f64, starting_distance_m: f64) -> Self {
        Self {
            desired_distance_m,
            source: DistanceSource::Fixed(starting_distance_m),
        }
    }
}
