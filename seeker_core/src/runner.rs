//! Blocking run loop: drive an alignment attempt to completion at the
//! configured sample rate.

use std::sync::Arc;
use std::time::Duration;

use seeker_traits::{Clock, Drivetrain, MonotonicClock, MotionSensor, VisionSensor};

use crate::align::{build_align, AlignStatus};
use crate::config::{AlignParams, CameraGeometry, PidGains, RangeGoal};
use crate::error::{ControlError, Report, Result};
use crate::interpolate::ShotTables;

/// Final telemetry of a successful run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignReport {
    /// Control cycles executed, including the completing one.
    pub ticks: u64,
    /// Offset-corrected yaw error (deg) at completion.
    pub angle_error_deg: f64,
    /// Fused distance to the goal (m) at completion; `None` for an
    /// angle-only run.
    pub distance_m: Option<f64>,
}

/// Tick period for a sample rate, clamped to at least 1 Hz.
#[inline]
fn tick_period(sample_rate_hz: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(sample_rate_hz.max(1)))
}

/// Build an alignment core over the given devices and run it until it
/// completes or aborts. `goal: None` runs the angle-only variant. Aborts
/// surface as `ControlError::Abort`.
#[allow(clippy::too_many_arguments)]
pub fn run_alignment<V, N, D>(
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
) -> Result<AlignReport>
where
    V: VisionSensor + 'static,
    N: MotionSensor + 'static,
    D: Drivetrain + 'static,
{
    let clock =
        clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn Clock + Send + Sync>);
    let period = tick_period(params.sample_rate_hz);

    let mut core = build_align(
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
        Some(clock.clone()),
    )?;
    core.begin()?;
    tracing::info!(
        desired_m = goal.map(|g| g.desired_distance_m),
        rate_hz = params.sample_rate_hz,
        "alignment run start"
    );

    let mut ticks: u64 = 0;
    loop {
        ticks += 1;
        match core.cycle()? {
            AlignStatus::Running => clock.sleep(period),
            AlignStatus::Complete => {
                let report = AlignReport {
                    ticks,
                    angle_error_deg: core.last_angle_error().unwrap_or(0.0),
                    distance_m: core.fused_distance(),
                };
                tracing::info!(
                    ticks,
                    angle_error_deg = report.angle_error_deg,
                    distance_m = report.distance_m,
                    "alignment run complete"
                );
                return Ok(report);
            }
            AlignStatus::Aborted(reason) => {
                tracing::error!(%reason, "alignment run aborted");
                return Err(Report::new(ControlError::Abort(reason)));
            }
        }
    }
}
