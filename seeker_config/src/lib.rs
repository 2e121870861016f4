#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and control-point table parsing for the alignment core.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Shot tables (distance→RPM, distance→yaw offset) are empirically
//!   measured control points; the CSV loader enforces headers and strictly
//!   increasing distances so the nearest-neighbor lookup stays well-defined.
//!
//! Everything here is hot-tunable: callers may re-parse at any time and swap
//! the resulting values into the running control loops between ticks.

use serde::Deserialize;
use serde::de::Deserializer;

/// Control-point CSV schema.
///
/// Expected headers:
/// distance,value
///
/// Example:
/// distance,value
/// 1.5,2300.0
/// 2.4,2650.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ControlPointRow {
    pub distance: f64,
    pub value: f64,
}

/// PID gains plus integrator gating for one feedback loop.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Integrator accumulates only while |error| < range.
    pub integrator_range: f64,
    /// Accumulated integral is clamped to ±limit.
    pub integrator_limit: f64,
}

impl Default for PidCfg {
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

/// Complementary-fusion parameters shared by both estimator filters.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FusionCfg {
    /// Shared low/high-pass time constant (s). Both corner frequencies must
    /// match or the fused estimate gains a gap/double-counted band.
    pub time_constant_s: f64,
}

impl Default for FusionCfg {
    fn default() -> Self {
        Self { time_constant_s: 0.25 }
    }
}

/// Alignment loop tuning.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AlignCfg {
    /// Control tick rate (Hz).
    pub sample_rate_hz: u32,
    /// Turn loop completion tolerance (deg).
    pub angle_tolerance_deg: f64,
    /// Range loop completion tolerance (m).
    pub distance_tolerance_m: f64,
    /// Angle error at which forward output is attenuated to exp(-1) (deg).
    pub max_angle_for_movement_deg: f64,
    /// Drivetrain must be under this speed for "done" (m/s).
    pub velocity_threshold_mps: f64,
    /// Done conditions must hold this long before completion (s).
    pub done_debounce_s: f64,
    /// Time constant of the forward speed-adjust low-pass (s).
    pub speed_filter_time_constant_s: f64,
    /// Hard cap on one alignment attempt (ms). Also accepts alias "max_run_ms".
    #[serde(alias = "max_run_ms")]
    pub max_attempt_ms: u64,
    /// Abort when vision target is lost continuously this long (ms); 0 disables.
    pub vision_loss_abort_ms: u64,
}

impl Default for AlignCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            angle_tolerance_deg: 1.0,
            distance_tolerance_m: 0.08,
            max_angle_for_movement_deg: 5.0,
            velocity_threshold_mps: 0.05,
            done_debounce_s: 0.15,
            speed_filter_time_constant_s: 0.1,
            max_attempt_ms: 10_000,
            vision_loss_abort_ms: 0,
        }
    }
}

/// Camera mounting geometry for elevation→distance conversion.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CameraCfg {
    pub camera_height_m: f64,
    pub goal_height_m: f64,
    pub camera_pitch_deg: f64,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            camera_height_m: 0.6,
            goal_height_m: 2.6,
            camera_pitch_deg: 30.0,
        }
    }
}

/// Shot lookup tables. Accepts either:
/// - array of tables: [{ distance = 1.5, value = 2300.0 }, ...]
/// - array of tuples: [[1.5, 2300.0], [2.4, 2650.0], ...]
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ShotTablesCfg {
    /// distance (m) → flywheel RPM
    #[serde(deserialize_with = "de_control_points")]
    pub rpm: Vec<(f64, f64)>,
    /// distance (m) → aiming yaw offset (deg)
    #[serde(deserialize_with = "de_control_points")]
    pub yaw_offset: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Turn (angle) loop gains.
    pub turn: PidCfg,
    /// Range (distance) loop gains.
    pub range: PidCfg,
    pub fusion: FusionCfg,
    pub align: AlignCfg,
    pub camera: CameraCfg,
    pub shot_tables: ShotTablesCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Validate ranges and table monotonicity with typed messages.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.align.sample_rate_hz == 0 {
            eyre::bail!("align.sample_rate_hz must be > 0");
        }
        if !(self.fusion.time_constant_s.is_finite() && self.fusion.time_constant_s > 0.0) {
            eyre::bail!("fusion.time_constant_s must be finite and > 0");
        }
        if self.align.angle_tolerance_deg <= 0.0 {
            eyre::bail!("align.angle_tolerance_deg must be > 0");
        }
        if self.align.distance_tolerance_m <= 0.0 {
            eyre::bail!("align.distance_tolerance_m must be > 0");
        }
        if !(self.align.max_angle_for_movement_deg.is_finite()
            && self.align.max_angle_for_movement_deg > 0.0)
        {
            eyre::bail!("align.max_angle_for_movement_deg must be finite and > 0");
        }
        if self.align.velocity_threshold_mps < 0.0 {
            eyre::bail!("align.velocity_threshold_mps must be >= 0");
        }
        if self.align.done_debounce_s < 0.0 {
            eyre::bail!("align.done_debounce_s must be >= 0");
        }
        for (name, cfg) in [("turn", &self.turn), ("range", &self.range)] {
            if !(cfg.kp.is_finite() && cfg.ki.is_finite() && cfg.kd.is_finite()) {
                eyre::bail!("{name}: gains must be finite");
            }
            if cfg.integrator_range < 0.0 || cfg.integrator_limit < 0.0 {
                eyre::bail!("{name}: integrator range/limit must be >= 0");
            }
        }
        if self.camera.goal_height_m <= self.camera.camera_height_m {
            eyre::bail!("camera.goal_height_m must exceed camera_height_m");
        }
        for (name, pts) in [
            ("shot_tables.rpm", &self.shot_tables.rpm),
            ("shot_tables.yaw_offset", &self.shot_tables.yaw_offset),
        ] {
            validate_control_points(name, pts)?;
        }
        Ok(())
    }
}

/// Require finite values and strictly increasing keys (empty is allowed at
/// the schema level; the core table constructor requires >= 1 point).
pub fn validate_control_points(name: &str, pts: &[(f64, f64)]) -> eyre::Result<()> {
    for (i, (k, v)) in pts.iter().enumerate() {
        if !k.is_finite() || !v.is_finite() {
            eyre::bail!("{name}: control point {i} is not finite");
        }
    }
    for i in 1..pts.len() {
        if pts[i].0 <= pts[i - 1].0 {
            eyre::bail!(
                "{name}: control point keys must be strictly increasing (index {} vs {})",
                i - 1,
                i
            );
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointToml {
    Tuple((f64, f64)),
    Table { distance: f64, value: f64 },
}

fn de_control_points<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<PointToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for p in items {
            match p {
                PointToml::Tuple((d, v)) => out.push((d, v)),
                PointToml::Table { distance, value } => out.push((distance, value)),
            }
        }
    }
    Ok(out)
}

/// Load shot-table control points from CSV text (headers: distance,value).
///
/// Rejects empty tables, non-finite values, and non-increasing distances, so
/// the result can feed `InterpolationTable::new` directly.
pub fn control_points_from_csv(csv_text: &str) -> eyre::Result<Vec<(f64, f64)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers = rdr.headers().map_err(|e| eyre::eyre!("csv headers: {e}"))?;
    if headers.len() < 2 || &headers[0] != "distance" || &headers[1] != "value" {
        eyre::bail!("control point csv must have headers: distance,value");
    }

    let mut rows: Vec<(f64, f64)> = Vec::new();
    for (i, rec) in rdr.deserialize::<ControlPointRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("csv row {}: {e}", i + 1))?;
        rows.push((row.distance, row.value));
    }
    if rows.is_empty() {
        eyre::bail!("control point csv contains no rows");
    }
    validate_control_points("csv", &rows)?;
    Ok(rows)
}
