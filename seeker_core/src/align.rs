//! Alignment control loop: rotate to face the goal and close to shooting
//! range in one composable loop.
//!
//! Two fused sub-loops drive the drivetrain. [`TurnAligner`] fuses the
//! camera's yaw error with the gyro heading; [`RangeAligner`] fuses the
//! vision-derived distance with drivetrain odometry. [`AlignCore`] composes
//! a turn aligner with an optional range aligner, so an angle-only variant
//! is just a core built without a range goal. Forward speed is attenuated
//! while the robot is still rotating so it cannot orbit the goal.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;
use seeker_traits::{Clock, Drivetrain, Gear, MonotonicClock, MotionSensor, VisionSensor};

use crate::config::{
    AlignParams, CameraGeometry, DistanceSource, FusionParams, PidGains, RangeGoal,
};
use crate::controller::{FeedbackController, PidController};
use crate::debounce::{DebounceEdge, Debouncer};
use crate::error::{AbortReason, BuildError, Result};
use crate::filter::{ClampFilter, Filter, LowPassFilter};
use crate::fusion::{FusionEstimator, SharedSample};
use crate::hw_error::map_device_error;
use crate::interpolate::{ShotParams, ShotTables};

/// Lifecycle of one alignment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignState {
    /// Not running; vision released.
    Idle,
    /// Actively driving toward the goal.
    Aligning,
    /// Converged and debounced; holding position, vision released.
    Done,
}

/// Outcome of one `cycle()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStatus {
    Running,
    Complete,
    Aborted(AbortReason),
}

/// Forward-speed attenuation while the heading error is large:
/// `exp(-(e / max)^2)`. Unity at zero error, `e^-1` at `e == max`.
#[inline]
pub fn speed_adjustment(angle_error_deg: f64, max_angle_deg: f64) -> f64 {
    if !(max_angle_deg > 0.0) || !angle_error_deg.is_finite() {
        return 0.0;
    }
    (-(angle_error_deg / max_angle_deg).powi(2)).exp()
}

fn dev(e: seeker_traits::DeviceError) -> eyre::Report {
    eyre::Report::new(map_device_error(&*e))
}

/// One turn-loop tick result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnUpdate {
    /// Arcade turn command in [-1, 1].
    pub output: f64,
    /// Offset-corrected fused yaw error (deg).
    pub angle_error_deg: f64,
}

/// Angle sub-loop: fused yaw error (camera angle plus gyro heading) feeding
/// a feedback controller. Usable standalone for turn-in-place alignment.
pub struct TurnAligner {
    angle_cell: SharedSample,
    heading_cell: SharedSample,
    estimator: FusionEstimator<SharedSample, SharedSample>,
    ctrl: Box<dyn FeedbackController>,
}

impl TurnAligner {
    pub fn new(fusion: FusionParams, ctrl: Box<dyn FeedbackController>) -> Self {
        let angle_cell = SharedSample::new(0.0);
        let heading_cell = SharedSample::new(0.0);
        let estimator = FusionEstimator::new(angle_cell.clone(), heading_cell.clone(), fusion);
        Self {
            angle_cell,
            heading_cell,
            estimator,
            ctrl,
        }
    }

    /// Clamped PID is the standard controller for the turn loop.
    pub fn with_default_pid(gains: PidGains, fusion: FusionParams) -> Self {
        let pid = PidController::new(gains, fusion.period_s)
            .with_output_filter(Box::new(ClampFilter::symmetric(1.0)));
        Self::new(fusion, Box::new(pid))
    }

    /// Anchor the fusion on the current readings and reset the controller.
    pub fn begin(&mut self, target_angle_deg: f64, heading_deg: f64) -> Result<()> {
        self.angle_cell.set(target_angle_deg);
        self.heading_cell.set(heading_deg);
        self.estimator.initialize()?;
        self.ctrl.reset();
        Ok(())
    }

    /// Feed one snapshot. `target_angle_deg` is `None` while the camera has
    /// no target; the setpoint then holds and the gyro keeps the estimate
    /// tracking relative motion. `yaw_offset_deg` biases the aim.
    pub fn update(
        &mut self,
        target_angle_deg: Option<f64>,
        heading_deg: f64,
        yaw_offset_deg: f64,
    ) -> Result<TurnUpdate> {
        if let Some(angle) = target_angle_deg {
            self.angle_cell.set(angle);
        }
        self.heading_cell.set(heading_deg);
        let fused = self.estimator.get().wrap_err("turn estimate")?;
        // Positive turn raises heading; the aim point is `heading + error`.
        let output = self
            .ctrl
            .update(heading_deg + fused - yaw_offset_deg, heading_deg);
        Ok(TurnUpdate {
            output,
            angle_error_deg: fused - yaw_offset_deg,
        })
    }

    pub fn in_tolerance(&self, tolerance_deg: f64) -> Result<bool> {
        Ok(self.ctrl.is_done(tolerance_deg)?)
    }

    pub fn last_error(&self) -> Option<f64> {
        self.ctrl.last_error()
    }
}

/// One range-loop tick result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeUpdate {
    /// Arcade forward command in [-1, 1] before speed adjustment.
    pub output: f64,
    /// Fused distance to the goal (m).
    pub distance_m: f64,
    /// `distance - desired` (m); positive means too far.
    pub error_m: f64,
}

/// Distance sub-loop: fused range (vision distance plus odometry) feeding a
/// feedback controller toward `RangeGoal::desired_distance_m`.
pub struct RangeAligner {
    goal: RangeGoal,
    range_cell: SharedSample,
    odo_cell: SharedSample,
    estimator: FusionEstimator<SharedSample, SharedSample>,
    ctrl: Box<dyn FeedbackController>,
    /// `starting distance + starting odometer` for a fixed-distance goal;
    /// the range setpoint each tick is `anchor - odometer`.
    fixed_anchor: Option<f64>,
}

impl RangeAligner {
    pub fn new(goal: RangeGoal, fusion: FusionParams, ctrl: Box<dyn FeedbackController>) -> Self {
        let range_cell = SharedSample::new(goal.desired_distance_m);
        let odo_cell = SharedSample::new(0.0);
        let estimator = FusionEstimator::new(range_cell.clone(), odo_cell.clone(), fusion);
        Self {
            goal,
            range_cell,
            odo_cell,
            estimator,
            ctrl,
            fixed_anchor: None,
        }
    }

    pub fn with_default_pid(goal: RangeGoal, gains: PidGains, fusion: FusionParams) -> Self {
        let pid = PidController::new(gains, fusion.period_s)
            .with_output_filter(Box::new(ClampFilter::symmetric(1.0)));
        Self::new(goal, fusion, Box::new(pid))
    }

    pub fn goal(&self) -> RangeGoal {
        self.goal
    }

    /// Anchor the fusion. `vision_distance_m` is the camera-derived range at
    /// start, if any; without one the desired distance seeds the estimate
    /// (neutral error until a measurement arrives).
    pub fn begin(&mut self, vision_distance_m: Option<f64>, odometer_m: f64) -> Result<()> {
        let initial = match self.goal.source {
            DistanceSource::Fixed(d) => d,
            DistanceSource::Vision => vision_distance_m.unwrap_or(self.goal.desired_distance_m),
        };
        self.range_cell.set(initial);
        self.odo_cell.set(odometer_m);
        self.fixed_anchor = match self.goal.source {
            DistanceSource::Fixed(_) => Some(initial + odometer_m),
            DistanceSource::Vision => None,
        };
        self.estimator.initialize()?;
        self.ctrl.reset();
        Ok(())
    }

    /// Feed one snapshot. Fixed-distance goals range on odometry alone: fed
    /// consistent streams, the matched low/high-pass pair reduces to the
    /// exact dead-reckoned distance.
    pub fn update(&mut self, vision_distance_m: Option<f64>, odometer_m: f64) -> Result<RangeUpdate> {
        if let Some(anchor) = self.fixed_anchor {
            self.range_cell.set(anchor - odometer_m);
        } else if let Some(d) = vision_distance_m {
            self.range_cell.set(d);
        }
        self.odo_cell.set(odometer_m);
        let fused = self.estimator.get().wrap_err("range estimate")?;
        // Positive error (too far) drives forward.
        let output = self.ctrl.update(fused, self.goal.desired_distance_m);
        Ok(RangeUpdate {
            output,
            distance_m: fused,
            error_m: fused - self.goal.desired_distance_m,
        })
    }

    pub fn in_tolerance(&self, tolerance_m: f64) -> Result<bool> {
        Ok(self.ctrl.is_done(tolerance_m)?)
    }
}

/// Statically-dispatched alignment core over concrete devices.
pub struct AlignCore<V: VisionSensor, N: MotionSensor, D: Drivetrain> {
    vision: V,
    motion: N,
    drive: D,
    params: AlignParams,
    geometry: CameraGeometry,
    tables: Option<ShotTables>,
    clock: Arc<dyn Clock + Send + Sync>,

    turn: TurnAligner,
    range: Option<RangeAligner>,
    speed_filter: LowPassFilter,
    done: Debouncer,

    state: AlignState,
    attempt_start: Option<Instant>,
    vision_lost_since: Option<Instant>,
    vision_enabled: bool,

    last_angle_error: Option<f64>,
    last_distance: Option<f64>,
    last_shot: Option<ShotParams>,
}

impl<V: VisionSensor, N: MotionSensor, D: Drivetrain> AlignCore<V, N, D> {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        vision: V,
        motion: N,
        drive: D,
        params: AlignParams,
        goal: Option<RangeGoal>,
        geometry: CameraGeometry,
        turn_gains: PidGains,
        range_gains: PidGains,
        fusion_time_constant_s: f64,
        tables: Option<ShotTables>,
        turn_ctrl: Option<Box<dyn FeedbackController>>,
        range_ctrl: Option<Box<dyn FeedbackController>>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let period_s = params.period_s();
        let fusion = FusionParams {
            time_constant_s: fusion_time_constant_s,
            period_s,
        };
        let turn = match turn_ctrl {
            Some(ctrl) => TurnAligner::new(fusion, ctrl),
            None => TurnAligner::with_default_pid(turn_gains, fusion),
        };
        let range = goal.map(|goal| match range_ctrl {
            Some(ctrl) => RangeAligner::new(goal, fusion, ctrl),
            None => RangeAligner::with_default_pid(goal, range_gains, fusion),
        });
        let done = Debouncer::new(params.done_debounce_s, DebounceEdge::Rising, clock.clone());
        let speed_filter = LowPassFilter::new(params.speed_filter_time_constant_s, period_s);
        Self {
            vision,
            motion,
            drive,
            params,
            geometry,
            tables,
            clock,
            turn,
            range,
            speed_filter,
            done,
            state: AlignState::Idle,
            attempt_start: None,
            vision_lost_since: None,
            vision_enabled: false,
            last_angle_error: None,
            last_distance: None,
            last_shot: None,
        }
    }

    pub fn state(&self) -> AlignState {
        self.state
    }

    /// Telemetry: yaw error (deg, offset-corrected) from the last cycle.
    pub fn last_angle_error(&self) -> Option<f64> {
        self.last_angle_error
    }

    /// Telemetry: fused distance to the goal (m) from the last cycle; always
    /// `None` on an angle-only core.
    pub fn fused_distance(&self) -> Option<f64> {
        self.last_distance
    }

    /// Telemetry: shot parameters for the last fused distance, if tables
    /// were provided.
    pub fn last_shot_params(&self) -> Option<ShotParams> {
        self.last_shot
    }

    /// Start a fresh attempt: claim the vision pipeline, drop to low gear,
    /// anchor both sub-loops on the current readings, and reset every
    /// controller, filter, and debounce to a clean state.
    pub fn begin(&mut self) -> Result<()> {
        self.vision
            .set_enabled(true)
            .map_err(dev)
            .wrap_err("enabling vision pipeline")?;
        self.vision_enabled = true;
        self.drive
            .set_gear(Gear::Low)
            .map_err(dev)
            .wrap_err("shifting to low gear")?;

        let visible = self
            .vision
            .has_target()
            .map_err(dev)
            .wrap_err("querying target visibility")?;
        let heading = self
            .motion
            .heading_degrees()
            .map_err(dev)
            .wrap_err("reading heading")?;
        let odo = self
            .motion
            .distance_traveled()
            .map_err(dev)
            .wrap_err("reading odometer")?;

        let angle = if visible {
            self.vision
                .target_angle()
                .map_err(dev)
                .wrap_err("reading target angle")?
        } else {
            0.0
        };
        self.turn.begin(angle, heading)?;

        if self.range.is_some() {
            let vision_distance = self.vision_distance(visible)?;
            if let Some(range) = &mut self.range {
                range.begin(vision_distance, odo)?;
            }
        }

        self.speed_filter.reset();
        self.done.reset();
        self.attempt_start = Some(self.clock.now());
        self.vision_lost_since = (!visible).then(|| self.clock.now());
        self.last_angle_error = None;
        self.last_distance = None;
        self.last_shot = None;
        self.state = AlignState::Aligning;
        tracing::info!(visible, ranging = self.range.is_some(), "alignment attempt started");
        Ok(())
    }

    /// One control tick. Call at the configured sample rate while the
    /// status is `Running`.
    pub fn cycle(&mut self) -> Result<AlignStatus> {
        match self.state {
            AlignState::Idle => {
                return Err(eyre::Report::new(crate::error::ControlError::State(
                    "cycle called before begin".into(),
                )));
            }
            AlignState::Done => return Ok(AlignStatus::Complete),
            AlignState::Aligning => {}
        }

        if let Some(start) = self.attempt_start
            && self.clock.ms_since(start) >= self.params.max_attempt_ms
        {
            return self.abort(AbortReason::MaxRuntime);
        }

        // One snapshot per tick; every estimate below observes it.
        let visible = self
            .vision
            .has_target()
            .map_err(dev)
            .wrap_err("querying target visibility")?;
        if visible {
            self.vision_lost_since = None;
        } else {
            let since = *self
                .vision_lost_since
                .get_or_insert_with(|| self.clock.now());
            if self.params.vision_loss_abort_ms > 0
                && self.clock.ms_since(since) >= self.params.vision_loss_abort_ms
            {
                return self.abort(AbortReason::VisionLost);
            }
        }
        let angle = if visible {
            Some(
                self.vision
                    .target_angle()
                    .map_err(dev)
                    .wrap_err("reading target angle")?,
            )
        } else {
            None
        };
        let vision_distance = if self.range.is_some() {
            self.vision_distance(visible)?
        } else {
            None
        };
        let heading = self
            .motion
            .heading_degrees()
            .map_err(dev)
            .wrap_err("reading heading")?;
        let odo = self
            .motion
            .distance_traveled()
            .map_err(dev)
            .wrap_err("reading odometer")?;
        let velocity = self
            .motion
            .velocity()
            .map_err(dev)
            .wrap_err("reading velocity")?;

        let range_update = match &mut self.range {
            Some(range) => Some(range.update(vision_distance, odo)?),
            None => None,
        };
        let shot = match (self.tables.as_ref(), range_update) {
            (Some(tables), Some(ru)) => Some(tables.params_for(ru.distance_m)),
            _ => None,
        };
        let yaw_offset = shot.map_or(0.0, |s| s.yaw_offset_deg);
        let turn_update = self.turn.update(angle, heading, yaw_offset)?;

        let forward = match range_update {
            Some(ru) => {
                let factor = speed_adjustment(
                    turn_update.angle_error_deg,
                    self.params.max_angle_for_movement_deg,
                );
                ru.output * self.speed_filter.calculate(factor)
            }
            None => 0.0,
        };

        self.last_angle_error = Some(turn_update.angle_error_deg);
        self.last_distance = range_update.map(|ru| ru.distance_m);
        self.last_shot = shot;

        let range_ok = match &self.range {
            Some(range) => range.in_tolerance(self.params.distance_tolerance_m)?,
            None => true,
        };
        let in_tolerance = visible
            && self.turn.in_tolerance(self.params.angle_tolerance_deg)?
            && range_ok
            && velocity.abs() < self.params.velocity_threshold_mps;
        if self.done.calculate(in_tolerance) {
            self.stand_down().wrap_err("finishing alignment")?;
            self.state = AlignState::Done;
            tracing::info!(
                angle_error = turn_update.angle_error_deg,
                distance = self.last_distance,
                "alignment complete"
            );
            return Ok(AlignStatus::Complete);
        }

        self.drive
            .drive_arcade(forward, turn_update.output)
            .map_err(dev)
            .wrap_err("commanding drivetrain")?;
        tracing::trace!(
            angle_error = turn_update.angle_error_deg,
            forward,
            turn = turn_update.output,
            "align cycle"
        );
        Ok(AlignStatus::Running)
    }

    /// Cancel the attempt: stop the drivetrain, release vision, return to
    /// `Idle`. Safe to call in any state.
    pub fn interrupt(&mut self) -> Result<()> {
        self.stand_down().wrap_err("interrupting alignment")?;
        self.state = AlignState::Idle;
        tracing::info!("alignment interrupted");
        Ok(())
    }

    /// Camera-derived goal distance for this tick, when the active range
    /// goal wants one. A sample at or below the horizon is a glitch and
    /// yields `None` (hold the previous setpoint).
    fn vision_distance(&mut self, visible: bool) -> Result<Option<f64>> {
        let wants_vision = matches!(
            self.range.as_ref().map(|r| r.goal().source),
            Some(DistanceSource::Vision)
        );
        if !(visible && wants_vision) {
            return Ok(None);
        }
        let elevation = self
            .vision
            .target_elevation()
            .map_err(dev)
            .wrap_err("reading target elevation")?;
        Ok(self.geometry.distance_from_elevation(elevation))
    }

    fn abort(&mut self, reason: AbortReason) -> Result<AlignStatus> {
        self.stand_down().wrap_err("aborting alignment")?;
        self.state = AlignState::Idle;
        tracing::warn!(%reason, "alignment aborted");
        Ok(AlignStatus::Aborted(reason))
    }

    fn stand_down(&mut self) -> Result<()> {
        self.drive
            .drive_arcade(0.0, 0.0)
            .map_err(dev)
            .wrap_err("stopping drivetrain")?;
        self.vision
            .set_enabled(false)
            .map_err(dev)
            .wrap_err("releasing vision pipeline")?;
        self.vision_enabled = false;
        Ok(())
    }
}

// Releasing the vision pipeline must survive early returns in the caller;
// errors here have nowhere to go, so the attempts are best-effort.
impl<V: VisionSensor, N: MotionSensor, D: Drivetrain> Drop for AlignCore<V, N, D> {
    fn drop(&mut self) {
        if self.vision_enabled {
            let _ = self.drive.drive_arcade(0.0, 0.0);
            let _ = self.vision.set_enabled(false);
        }
    }
}

/// Boxed, dynamically-dispatched alignment core (what the builder makes).
pub struct Align {
    inner: AlignCore<Box<dyn VisionSensor>, Box<dyn MotionSensor>, Box<dyn Drivetrain>>,
}

impl std::fmt::Debug for Align {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Align").finish_non_exhaustive()
    }
}

impl Align {
    /// Start building an `Align`.
    pub fn builder() -> AlignBuilder<Missing, Missing, Missing> {
        AlignBuilder::default()
    }

    pub fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    pub fn cycle(&mut self) -> Result<AlignStatus> {
        self.inner.cycle()
    }

    pub fn interrupt(&mut self) -> Result<()> {
        self.inner.interrupt()
    }

    pub fn state(&self) -> AlignState {
        self.inner.state()
    }

    pub fn last_angle_error(&self) -> Option<f64> {
        self.inner.last_angle_error()
    }

    pub fn fused_distance(&self) -> Option<f64> {
        self.inner.fused_distance()
    }

    pub fn last_shot_params(&self) -> Option<ShotParams> {
        self.inner.last_shot_params()
    }

    pub fn params(&self) -> &AlignParams {
        &self.inner.params
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for [`Align`]. Vision, motion, and drivetrain are mandatory and
/// tracked in the type-state; supplying a range goal selects the
/// distance+angle variant, omitting it the angle-only one.
pub struct AlignBuilder<V, N, D> {
    vision: Option<Box<dyn VisionSensor>>,
    motion: Option<Box<dyn MotionSensor>>,
    drive: Option<Box<dyn Drivetrain>>,
    params: Option<AlignParams>,
    goal: Option<RangeGoal>,
    geometry: Option<CameraGeometry>,
    turn_gains: Option<PidGains>,
    range_gains: Option<PidGains>,
    fusion_time_constant_s: Option<f64>,
    tables: Option<ShotTables>,
    turn_ctrl: Option<Box<dyn FeedbackController>>,
    range_ctrl: Option<Box<dyn FeedbackController>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _v: PhantomData<V>,
    _n: PhantomData<N>,
    _d: PhantomData<D>,
}

impl Default for AlignBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            vision: None,
            motion: None,
            drive: None,
            params: None,
            goal: None,
            geometry: None,
            turn_gains: None,
            range_gains: None,
            fusion_time_constant_s: None,
            tables: None,
            turn_ctrl: None,
            range_ctrl: None,
            clock: None,
            _v: PhantomData,
            _n: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<V, N, D> AlignBuilder<V, N, D> {
    /// Fallible build available in any type-state; returns a typed
    /// `BuildError` for anything missing or out of range.
    pub fn try_build(self) -> Result<Align> {
        let AlignBuilder {
            vision,
            motion,
            drive,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: _,
            _n: _,
            _d: _,
        } = self;

        let vision = vision.ok_or_else(|| eyre::Report::new(BuildError::MissingVision))?;
        let motion = motion.ok_or_else(|| eyre::Report::new(BuildError::MissingMotion))?;
        let drive = drive.ok_or_else(|| eyre::Report::new(BuildError::MissingDrivetrain))?;

        let params = params.unwrap_or_default();
        let geometry = geometry.unwrap_or_default();
        let turn_gains = turn_gains.unwrap_or_default();
        let range_gains = range_gains.unwrap_or_default();
        let fusion_time_constant_s = fusion_time_constant_s.unwrap_or(0.25);
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        if params.sample_rate_hz == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "sample_rate_hz must be > 0",
            )));
        }
        if !(params.angle_tolerance_deg > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "angle_tolerance_deg must be > 0",
            )));
        }
        if !(params.distance_tolerance_m > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "distance_tolerance_m must be > 0",
            )));
        }
        if !(params.max_angle_for_movement_deg > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_angle_for_movement_deg must be > 0",
            )));
        }
        if params.velocity_threshold_mps < 0.0 || params.done_debounce_s < 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "thresholds must be >= 0",
            )));
        }
        if !(fusion_time_constant_s > 0.0 && fusion_time_constant_s.is_finite()) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "fusion time constant must be > 0",
            )));
        }
        if let Some(goal) = goal {
            if !(goal.desired_distance_m > 0.0 && goal.desired_distance_m.is_finite()) {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "desired distance must be > 0",
                )));
            }
            if let DistanceSource::Fixed(d) = goal.source
                && !(d > 0.0 && d.is_finite())
            {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "fixed starting distance must be > 0",
                )));
            }
        }

        Ok(Align {
            inner: AlignCore::assemble(
                vision,
                motion,
                drive,
                params,
                goal,
                geometry,
                turn_gains,
                range_gains,
                fusion_time_constant_s,
                tables,
                turn_ctrl,
                range_ctrl,
                clock,
            ),
        })
    }
}

/// Chainable setters that do not affect type-state
impl<V, N, D> AlignBuilder<V, N, D> {
    pub fn with_params(mut self, params: AlignParams) -> Self {
        self.params = Some(params);
        self
    }
    /// Select the distance+angle variant with this goal.
    pub fn with_goal(mut self, goal: RangeGoal) -> Self {
        self.goal = Some(goal);
        self
    }
    pub fn with_geometry(mut self, geometry: CameraGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
    pub fn with_turn_gains(mut self, gains: PidGains) -> Self {
        self.turn_gains = Some(gains);
        self
    }
    pub fn with_range_gains(mut self, gains: PidGains) -> Self {
        self.range_gains = Some(gains);
        self
    }
    pub fn with_fusion_time_constant(mut self, seconds: f64) -> Self {
        self.fusion_time_constant_s = Some(seconds);
        self
    }
    pub fn with_shot_tables(mut self, tables: ShotTables) -> Self {
        self.tables = Some(tables);
        self
    }
    /// Replace the default turn PID with a caller-supplied controller.
    pub fn with_turn_controller(mut self, ctrl: Box<dyn FeedbackController>) -> Self {
        self.turn_ctrl = Some(ctrl);
        self
    }
    /// Replace the default range PID with a caller-supplied controller.
    pub fn with_range_controller(mut self, ctrl: Box<dyn FeedbackController>) -> Self {
        self.range_ctrl = Some(ctrl);
        self
    }
    /// Provide a custom clock; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<N, D> AlignBuilder<Missing, N, D> {
    pub fn with_vision(self, vision: impl VisionSensor + 'static) -> AlignBuilder<Set, N, D> {
        let AlignBuilder {
            vision: _,
            motion,
            drive,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: _,
            _n: _,
            _d: _,
        } = self;
        AlignBuilder {
            vision: Some(Box::new(vision)),
            motion,
            drive,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: PhantomData,
            _n: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<V, D> AlignBuilder<V, Missing, D> {
    pub fn with_motion(self, motion: impl MotionSensor + 'static) -> AlignBuilder<V, Set, D> {
        let AlignBuilder {
            vision,
            motion: _,
            drive,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: _,
            _n: _,
            _d: _,
        } = self;
        AlignBuilder {
            vision,
            motion: Some(Box::new(motion)),
            drive,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: PhantomData,
            _n: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<V, N> AlignBuilder<V, N, Missing> {
    pub fn with_drivetrain(self, drive: impl Drivetrain + 'static) -> AlignBuilder<V, N, Set> {
        let AlignBuilder {
            vision,
            motion,
            drive: _,
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: _,
            _n: _,
            _d: _,
        } = self;
        AlignBuilder {
            vision,
            motion,
            drive: Some(Box::new(drive)),
            params,
            goal,
            geometry,
            turn_gains,
            range_gains,
            fusion_time_constant_s,
            tables,
            turn_ctrl,
            range_ctrl,
            clock,
            _v: PhantomData,
            _n: PhantomData,
            _d: PhantomData,
        }
    }
}

impl AlignBuilder<Set, Set, Set> {
    /// Validate and build. Only available once vision, motion, and the
    /// drivetrain are all set.
    pub fn build(self) -> Result<Align> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias over concrete devices.
pub type AlignG<V, N, D> = AlignCore<V, N, D>;

/// Build a generic, statically-dispatched core from concrete devices.
/// `goal: None` selects the angle-only variant.
#[allow(clippy::too_many_arguments)]
pub fn build_align<V, N, D>(
    vision: V,
    motion: N,
    drive: D,
    params: AlignParams,
    goal: Option<RangeGoal>,
    geometry: CameraGeometry,
    turn_gains: PidGains,
    range_gains: PidGains,
    fusion_time_constant_s: f64,
    tables: Option<ShotTables>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<AlignG<V, N, D>>
where
    V: VisionSensor + 'static,
    N: MotionSensor + 'static,
    D: Drivetrain + 'static,
{
    if params.sample_rate_hz == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sample_rate_hz must be > 0",
        )));
    }
    if let Some(goal) = goal
        && !(goal.desired_distance_m > 0.0 && goal.desired_distance_m.is_finite())
    {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "desired distance must be > 0",
        )));
    }
    let clock =
        clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn Clock + Send + Sync>);
    Ok(AlignCore::assemble(
        vision,
        motion,
        drive,
        params,
        goal,
        geometry,
        turn_gains,
        range_gains,
        fusion_time_constant_s,
        tables,
        None,
        None,
        clock,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use std::result::Result;
    use crate::interpolate::InterpolationTable;
    use seeker_traits::{DeviceError, ManualClock};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeVision {
        visible: Rc<Cell<bool>>,
        angle: Rc<Cell<f64>>,
        elevation: Rc<Cell<f64>>,
        enabled: Rc<Cell<bool>>,
    }

    impl VisionSensor for FakeVision {
        fn has_target(&mut self) -> Result<bool, DeviceError> {
            Ok(self.visible.get())
        }
        fn target_angle(&mut self) -> Result<f64, DeviceError> {
            Ok(self.angle.get())
        }
        fn target_elevation(&mut self) -> Result<f64, DeviceError> {
            Ok(self.elevation.get())
        }
        fn set_enabled(&mut self, enabled: bool) -> Result<(), DeviceError> {
            self.enabled.set(enabled);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeMotion {
        heading: Rc<Cell<f64>>,
        odo: Rc<Cell<f64>>,
        velocity: Rc<Cell<f64>>,
    }

    impl MotionSensor for FakeMotion {
        fn heading_degrees(&mut self) -> Result<f64, DeviceError> {
            Ok(self.heading.get())
        }
        fn distance_traveled(&mut self) -> Result<f64, DeviceError> {
            Ok(self.odo.get())
        }
        fn velocity(&mut self) -> Result<f64, DeviceError> {
            Ok(self.velocity.get())
        }
    }

    #[derive(Clone, Default)]
    struct FakeDrive {
        last: Rc<Cell<(f64, f64)>>,
        gear: Rc<Cell<Option<Gear>>>,
    }

    impl Drivetrain for FakeDrive {
        fn drive_arcade(&mut self, forward: f64, turn: f64) -> Result<(), DeviceError> {
            self.last.set((forward, turn));
            Ok(())
        }
        fn set_gear(&mut self, gear: Gear) -> Result<(), DeviceError> {
            self.gear.set(Some(gear));
            Ok(())
        }
    }

    fn small_params() -> AlignParams {
        AlignParams {
            done_debounce_s: 0.1,
            ..AlignParams::default()
        }
    }

    // Geometry where elevation 15 deg puts the goal exactly 2.0 m away.
    fn geometry() -> CameraGeometry {
        CameraGeometry {
            camera_height_m: 0.6,
            goal_height_m: 2.6,
            camera_pitch_deg: 30.0,
        }
    }

    struct Rig {
        vision: FakeVision,
        motion: FakeMotion,
        drive: FakeDrive,
        clock: Arc<ManualClock>,
        align: Align,
    }

    fn rig(params: AlignParams, goal: Option<RangeGoal>, tables: Option<ShotTables>) -> Rig {
        let vision = FakeVision::default();
        let motion = FakeMotion::default();
        let drive = FakeDrive::default();
        let clock = Arc::new(ManualClock::new());
        let mut builder = Align::builder()
            .with_vision(vision.clone())
            .with_motion(motion.clone())
            .with_drivetrain(drive.clone())
            .with_params(params)
            .with_geometry(geometry())
            .with_clock(Box::new(clock.as_ref().clone()));
        if let Some(g) = goal {
            builder = builder.with_goal(g);
        }
        if let Some(t) = tables {
            builder = builder.with_shot_tables(t);
        }
        let align = builder.build().unwrap();
        Rig {
            vision,
            motion,
            drive,
            clock,
            align,
        }
    }

    #[test]
    fn speed_adjustment_is_gaussian_in_the_error_ratio() {
        assert!((speed_adjustment(0.0, 5.0) - 1.0).abs() < 1e-12);
        assert!((speed_adjustment(5.0, 5.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!((speed_adjustment(10.0, 5.0) - (-4.0f64).exp()).abs() < 1e-12);
        assert!((speed_adjustment(-2.5, 5.0) - (-0.25f64).exp()).abs() < 1e-12);
        assert_eq!(speed_adjustment(1.0, 0.0), 0.0);
        assert_eq!(speed_adjustment(f64::NAN, 5.0), 0.0);
    }

    #[test]
    fn cycle_before_begin_is_a_state_error() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        let err = r.align.cycle().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ControlError>(),
            Some(ControlError::State(_))
        ));
    }

    #[test]
    fn begin_claims_vision_and_low_gear() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.align.begin().unwrap();
        assert!(r.vision.enabled.get());
        assert_eq!(r.drive.gear.get(), Some(Gear::Low));
        assert_eq!(r.align.state(), AlignState::Aligning);
    }

    #[test]
    fn already_converged_rig_completes_after_the_debounce() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(0.0);
        r.vision.elevation.set(15.0); // exactly 2.0 m away
        r.align.begin().unwrap();

        let mut status = AlignStatus::Running;
        for _ in 0..20 {
            status = r.align.cycle().unwrap();
            if status == AlignStatus::Complete {
                break;
            }
            r.clock.advance(Duration::from_millis(20));
        }
        assert_eq!(status, AlignStatus::Complete);
        assert_eq!(r.align.state(), AlignState::Done);
        assert!(!r.vision.enabled.get(), "vision must be released when done");
        assert_eq!(r.drive.last.get(), (0.0, 0.0));
        // Done state is sticky.
        assert_eq!(r.align.cycle().unwrap(), AlignStatus::Complete);
    }

    #[test]
    fn angle_only_variant_never_drives_forward() {
        let mut r = rig(small_params(), None, None);
        r.vision.visible.set(true);
        r.vision.angle.set(12.0);
        r.align.begin().unwrap();

        let mut status = AlignStatus::Running;
        for _ in 0..20 {
            status = r.align.cycle().unwrap();
            let (forward, _) = r.drive.last.get();
            assert_eq!(forward, 0.0, "angle-only core must not creep");
            if status == AlignStatus::Complete {
                break;
            }
            // Snap the fake onto target so the loop can finish.
            r.vision.angle.set(0.0);
            r.motion.heading.set(12.0);
            r.clock.advance(Duration::from_millis(20));
        }
        assert_eq!(status, AlignStatus::Complete);
        assert_eq!(r.align.fused_distance(), None);
    }

    #[test]
    fn misaligned_rig_turns_toward_the_target() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(10.0); // target to the right
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        let (_, turn) = r.drive.last.get();
        assert!(turn > 0.0, "positive yaw error must turn right: {turn}");
    }

    #[test]
    fn large_angle_error_suppresses_forward_motion() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(1.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(45.0); // way past max_angle_for_movement (5 deg)
        r.vision.elevation.set(15.0); // 2.0 m away, 1.0 m too far
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        let (forward, _) = r.drive.last.get();
        assert!(
            forward.abs() < 1e-6,
            "no creep while pointed away: {forward}"
        );
    }

    #[test]
    fn forward_output_is_gaussian_attenuated_by_the_angle_error() {
        // Fixed goal 1.0 m past desired with kp = 1 puts the raw range
        // output at exactly 1.0, so the forward command equals the
        // attenuation factor itself.
        let cases = [
            (10.0, 5.0, (-4.0f64).exp()),
            (5.0, 5.0, (-1.0f64).exp()),
            (3.0, 6.0, (-0.25f64).exp()),
        ];
        for (angle, max_angle, expected) in cases {
            let vision = FakeVision::default();
            let drive = FakeDrive::default();
            let clock = Arc::new(ManualClock::new());
            let params = AlignParams {
                max_angle_for_movement_deg: max_angle,
                ..small_params()
            };
            let mut align = Align::builder()
                .with_vision(vision.clone())
                .with_motion(FakeMotion::default())
                .with_drivetrain(drive.clone())
                .with_params(params)
                .with_goal(RangeGoal::fixed(2.0, 3.0))
                .with_range_gains(PidGains {
                    kp: 1.0,
                    ki: 0.0,
                    kd: 0.0,
                    integrator_range: 0.0,
                    integrator_limit: 0.0,
                })
                .with_clock(Box::new(clock.as_ref().clone()))
                .build()
                .unwrap();
            vision.visible.set(true);
            vision.angle.set(angle);
            align.begin().unwrap();
            align.cycle().unwrap();
            let (forward, _) = drive.last.get();
            assert!(
                (forward - expected).abs() < 1e-9,
                "angle {angle} max {max_angle}: forward {forward}, want {expected}"
            );
        }
    }

    #[test]
    fn max_runtime_aborts_and_stands_down() {
        let params = AlignParams {
            max_attempt_ms: 100,
            ..small_params()
        };
        let mut r = rig(params, Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(40.0); // never converges
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        r.clock.advance(Duration::from_millis(120));
        let status = r.align.cycle().unwrap();
        assert_eq!(status, AlignStatus::Aborted(AbortReason::MaxRuntime));
        assert_eq!(r.align.state(), AlignState::Idle);
        assert!(!r.vision.enabled.get());
        assert_eq!(r.drive.last.get(), (0.0, 0.0));
    }

    #[test]
    fn vision_loss_aborts_when_configured() {
        let params = AlignParams {
            vision_loss_abort_ms: 50,
            ..small_params()
        };
        let mut r = rig(params, Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        r.vision.visible.set(false);
        assert_eq!(r.align.cycle().unwrap(), AlignStatus::Running);
        r.clock.advance(Duration::from_millis(60));
        let status = r.align.cycle().unwrap();
        assert_eq!(status, AlignStatus::Aborted(AbortReason::VisionLost));
    }

    #[test]
    fn vision_loss_without_abort_holds_the_attempt_open() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(0.0);
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.vision.visible.set(false);
        for _ in 0..50 {
            let status = r.align.cycle().unwrap();
            assert_eq!(status, AlignStatus::Running, "blind loop must not finish");
            r.clock.advance(Duration::from_millis(20));
        }
    }

    #[test]
    fn interrupt_releases_vision_and_returns_to_idle() {
        let mut r = rig(small_params(), Some(RangeGoal::measured(2.0)), None);
        r.vision.visible.set(true);
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        r.align.interrupt().unwrap();
        assert_eq!(r.align.state(), AlignState::Idle);
        assert!(!r.vision.enabled.get());
        assert_eq!(r.drive.last.get(), (0.0, 0.0));
    }

    #[test]
    fn drop_releases_vision() {
        let vision = FakeVision::default();
        let enabled = vision.enabled.clone();
        {
            let mut align = Align::builder()
                .with_vision(vision)
                .with_motion(FakeMotion::default())
                .with_drivetrain(FakeDrive::default())
                .build()
                .unwrap();
            align.begin().unwrap();
            assert!(enabled.get());
        }
        assert!(!enabled.get(), "drop must release the vision pipeline");
    }

    #[test]
    fn shot_tables_bias_the_turn_target() {
        let tables = ShotTables::new(
            InterpolationTable::new([(2.0, 2500.0)]).unwrap(),
            InterpolationTable::new([(2.0, 3.0)]).unwrap(), // constant +3 deg bias
        );
        let mut r = rig(
            small_params(),
            Some(RangeGoal::measured(2.0)),
            Some(tables),
        );
        r.vision.visible.set(true);
        r.vision.angle.set(0.0); // centered, but the bias demands offset
        r.vision.elevation.set(15.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        let (_, turn) = r.drive.last.get();
        assert!(turn < 0.0, "positive yaw bias must push the turn: {turn}");
        let shot = r.align.last_shot_params().unwrap();
        assert_eq!(shot.rpm, 2500.0);
        assert_eq!(shot.yaw_offset_deg, 3.0);
    }

    #[test]
    fn fixed_distance_goal_tracks_odometry() {
        // Start 3.0 m out per external measurement; want 2.0 m. No vision
        // ranging at all: drive 1.0 m and the fused estimate reaches goal.
        let mut r = rig(small_params(), Some(RangeGoal::fixed(2.0, 3.0)), None);
        r.vision.visible.set(true);
        r.vision.angle.set(0.0);
        r.align.begin().unwrap();
        r.align.cycle().unwrap();
        let before = r.align.fused_distance().unwrap();
        assert!((before - 3.0).abs() < 0.05, "starts at the fix: {before}");
        r.motion.odo.set(1.0);
        r.align.cycle().unwrap();
        let after = r.align.fused_distance().unwrap();
        assert!(
            (after - 2.0).abs() < 0.1,
            "odometry must close the estimate: {after}"
        );
    }

    #[test]
    fn builder_requires_positive_tolerances() {
        let params = AlignParams {
            angle_tolerance_deg: 0.0,
            ..AlignParams::default()
        };
        let err = Align::builder()
            .with_vision(FakeVision::default())
            .with_motion(FakeMotion::default())
            .with_drivetrain(FakeDrive::default())
            .with_params(params)
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn try_build_reports_missing_devices() {
        let err = Align::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingVision)
        ));
    }

    #[test]
    fn turn_aligner_stands_alone() {
        let fusion = FusionParams {
            time_constant_s: 0.25,
            period_s: 0.02,
        };
        let mut turn = TurnAligner::with_default_pid(PidGains::default(), fusion);
        turn.begin(8.0, 0.0).unwrap();
        let u = turn.update(Some(8.0), 0.0, 0.0).unwrap();
        assert!(u.output > 0.0);
        assert!((u.angle_error_deg - 8.0).abs() < 1e-9);
        assert!(!turn.in_tolerance(1.0).unwrap());
        // Heading swings onto the bearing while the camera angle closes.
        let u = turn.update(Some(0.0), 8.0, 0.0).unwrap();
        assert!(u.angle_error_deg.abs() < 8.0);
    }
}
