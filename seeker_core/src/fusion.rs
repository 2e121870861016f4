//! Complementary fusion of a slow absolute measurement with a fast
//! relative one.
//!
//! The setpoint stream (e.g. vision angle) is accurate but noisy and
//! intermittent; the measurement stream (e.g. gyro heading) is high-rate but
//! drifts. Low-passing the setpoint suppresses its noise; high-passing the
//! measurement residual tracks fast relative motion without inheriting
//! long-term drift. Both filters share one time constant so their corner
//! frequencies match.

use std::cell::Cell;
use std::rc::Rc;

use eyre::WrapErr;
use seeker_traits::ScalarStream;

use crate::config::FusionParams;
use crate::error::{ControlError, Result};
use crate::filter::{Filter, HighPassFilter, LowPassFilter};
use crate::hw_error::map_device_error;

/// Fused estimator over a setpoint stream and a relative measurement stream.
///
/// Lifecycle: `initialize()` must run before the first `get()`; it captures
/// `target = setpoint(t0) + measurement(t0)` and resets both filters.
/// Re-initializing at any time resets accumulated drift.
pub struct FusionEstimator<S: ScalarStream, M: ScalarStream> {
    setpoint: S,
    measurement: M,
    lowpass: LowPassFilter,
    highpass: HighPassFilter,
    target: Option<f64>,
}

impl<S: ScalarStream, M: ScalarStream> FusionEstimator<S, M> {
    pub fn new(setpoint: S, measurement: M, params: FusionParams) -> Self {
        Self {
            setpoint,
            measurement,
            lowpass: LowPassFilter::new(params.time_constant_s, params.period_s),
            highpass: HighPassFilter::new(params.time_constant_s, params.period_s),
            target: None,
        }
    }

    /// Capture the fusion anchor and reset both filters to a fresh state.
    pub fn initialize(&mut self) -> Result<()> {
        let s = self
            .setpoint
            .get()
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("reading setpoint stream")?;
        let m = self
            .measurement
            .get()
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("reading measurement stream")?;
        let target = s + m;
        self.target = Some(target);
        self.lowpass.reset();
        self.highpass.reset();
        // Seed both filters with the t0 samples so later calls measure
        // change relative to the anchor, not to their own first input.
        self.lowpass.calculate(s);
        self.highpass.calculate(target - m);
        tracing::debug!(target, "fusion estimator initialized");
        Ok(())
    }

    /// `lowpass(setpoint(t)) + highpass(target - measurement(t))`.
    ///
    /// Stream failures propagate; the estimator never guesses.
    pub fn get(&mut self) -> Result<f64> {
        let target = self
            .target
            .ok_or_else(|| eyre::Report::new(ControlError::NeverInitialized))?;
        let s = self
            .setpoint
            .get()
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("reading setpoint stream")?;
        let m = self
            .measurement
            .get()
            .map_err(|e| eyre::Report::new(map_device_error(&*e)))
            .wrap_err("reading measurement stream")?;
        Ok(self.lowpass.calculate(s) + self.highpass.calculate(target - m))
    }
}

/// Infallible stream over a shared sample cell.
///
/// The alignment loop writes one sensor snapshot into these cells per tick,
/// so every estimator read inside the tick observes the same values.
#[derive(Debug, Clone)]
pub struct SharedSample(Rc<Cell<f64>>);

impl SharedSample {
    pub fn new(initial: f64) -> Self {
        Self(Rc::new(Cell::new(initial)))
    }

    pub fn handle(&self) -> Rc<Cell<f64>> {
        Rc::clone(&self.0)
    }

    pub fn set(&self, v: f64) {
        self.0.set(v);
    }

    pub fn value(&self) -> f64 {
        self.0.get()
    }
}

impl ScalarStream for SharedSample {
    fn get(&mut self) -> std::result::Result<f64, seeker_traits::DeviceError> {
        Ok(self.0.get())
    }
}
