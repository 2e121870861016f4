//! Nearest-neighbor interpolation over empirically measured control points.
//!
//! The shot tables were measured at discrete distances; intermediate points
//! were never validated to be monotonic or linear, so lookups snap to the
//! closest measured point instead of blending.

use crate::error::BuildError;

/// Immutable table of (key, value) control points, keys strictly increasing.
#[derive(Debug, Clone)]
pub struct InterpolationTable {
    keys: Vec<f64>,
    values: Vec<f64>,
}

impl InterpolationTable {
    /// Build from ≥1 control points with strictly increasing, finite keys.
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, BuildError> {
        let (keys, values): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        if keys.is_empty() {
            return Err(BuildError::EmptyTable);
        }
        if keys
            .iter()
            .zip(&values)
            .any(|(k, v)| !k.is_finite() || !v.is_finite())
        {
            return Err(BuildError::InvalidConfig("control points must be finite"));
        }
        for i in 1..keys.len() {
            if keys[i] <= keys[i - 1] {
                return Err(BuildError::NonIncreasingKeys { index: i });
            }
        }
        Ok(Self { keys, values })
    }

    /// Value of the control point whose key is numerically closest to `x`;
    /// ties break toward the lower key, out-of-range clamps to the endpoint.
    pub fn interpolate(&self, x: f64) -> f64 {
        let n = self.keys.len();
        if x.is_nan() {
            tracing::warn!("interpolation query is NaN; clamping to first point");
            return self.values[0];
        }
        if x <= self.keys[0] {
            return self.values[0];
        }
        if x >= self.keys[n - 1] {
            return self.values[n - 1];
        }
        // First index with key > x; the bracketing pair is (hi-1, hi).
        let hi = self.keys.partition_point(|&k| k <= x);
        let lo = hi - 1;
        if x - self.keys[lo] <= self.keys[hi] - x {
            self.values[lo]
        } else {
            self.values[hi]
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Shot parameters for one distance query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotParams {
    /// Flywheel speed (RPM).
    pub rpm: f64,
    /// Aiming yaw bias (deg) applied to the turn target.
    pub yaw_offset_deg: f64,
}

/// The two system tables: distance→RPM and distance→yaw offset.
#[derive(Debug, Clone)]
pub struct ShotTables {
    rpm: InterpolationTable,
    yaw_offset: InterpolationTable,
}

impl ShotTables {
    pub fn new(rpm: InterpolationTable, yaw_offset: InterpolationTable) -> Self {
        Self { rpm, yaw_offset }
    }

    /// Build both tables from the validated config schema.
    pub fn from_cfg(cfg: &seeker_config::ShotTablesCfg) -> Result<Self, BuildError> {
        Ok(Self {
            rpm: InterpolationTable::new(cfg.rpm.iter().copied())?,
            yaw_offset: InterpolationTable::new(cfg.yaw_offset.iter().copied())?,
        })
    }

    pub fn params_for(&self, distance_m: f64) -> ShotParams {
        ShotParams {
            rpm: self.rpm.interpolate(distance_m),
            yaw_offset_deg: self.yaw_offset.interpolate(distance_m),
        }
    }
}
