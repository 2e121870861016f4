//! Scalar stream filters used by the estimators and controllers.
//!
//! Each filter owns its own state and is reset only explicitly; controllers
//! and estimators own their filters exclusively, so resetting a loop resets
//! exactly the filters that belong to it.

/// One-in, one-out scalar filter.
pub trait Filter {
    fn calculate(&mut self, input: f64) -> f64;
    /// Discard internal state; the next sample re-seeds the filter.
    fn reset(&mut self);
}

/// Discrete smoothing gain for a first-order filter:
/// `alpha = exp(-period / time_constant)`.
///
/// A low-pass and a high-pass built from the same `alpha` have matching
/// corner frequencies, which the fusion estimator relies on (no gap or
/// double-counted band between the two).
#[inline]
pub fn smoothing_gain(time_constant_s: f64, period_s: f64) -> f64 {
    if time_constant_s <= 0.0 || !time_constant_s.is_finite() {
        return 0.0; // degenerate config: passthrough low-pass, dead high-pass
    }
    (-period_s / time_constant_s).exp()
}

/// Single-pole IIR low-pass: `y = alpha*y_prev + (1-alpha)*x`.
///
/// The first sample after construction/reset seeds the output directly so
/// the filter starts unbiased instead of decaying up from zero.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    gain: f64,
    prev_output: Option<f64>,
}

impl LowPassFilter {
    pub fn new(time_constant_s: f64, period_s: f64) -> Self {
        Self {
            gain: smoothing_gain(time_constant_s, period_s),
            prev_output: None,
        }
    }
}

impl Filter for LowPassFilter {
    fn calculate(&mut self, input: f64) -> f64 {
        let y = match self.prev_output {
            None => input,
            Some(prev) => self.gain * prev + (1.0 - self.gain) * input,
        };
        self.prev_output = Some(y);
        y
    }

    fn reset(&mut self) {
        self.prev_output = None;
    }
}

/// Single-pole high-pass, complement of [`LowPassFilter`] at the same gain:
/// `y = alpha*(y_prev + x - x_prev)`.
///
/// The first sample after reset yields 0 (a constant input contributes
/// nothing), so a freshly initialized fusion estimate starts at the
/// low-passed setpoint alone.
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    gain: f64,
    prev_input: Option<f64>,
    prev_output: f64,
}

impl HighPassFilter {
    pub fn new(time_constant_s: f64, period_s: f64) -> Self {
        Self {
            gain: smoothing_gain(time_constant_s, period_s),
            prev_input: None,
            prev_output: 0.0,
        }
    }
}

impl Filter for HighPassFilter {
    fn calculate(&mut self, input: f64) -> f64 {
        let y = match self.prev_input {
            None => 0.0,
            Some(prev_in) => self.gain * (self.prev_output + input - prev_in),
        };
        self.prev_input = Some(input);
        self.prev_output = y;
        y
    }

    fn reset(&mut self) {
        self.prev_input = None;
        self.prev_output = 0.0;
    }
}

/// Limits the per-sample change of the stream to ±`max_delta`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_delta: f64,
    prev_output: Option<f64>,
}

impl RateLimiter {
    pub fn new(max_delta_per_sample: f64) -> Self {
        Self {
            max_delta: max_delta_per_sample.abs(),
            prev_output: None,
        }
    }
}

impl Filter for RateLimiter {
    fn calculate(&mut self, input: f64) -> f64 {
        let y = match self.prev_output {
            None => input,
            Some(prev) => input.clamp(prev - self.max_delta, prev + self.max_delta),
        };
        self.prev_output = Some(y);
        y
    }

    fn reset(&mut self) {
        self.prev_output = None;
    }
}

/// Stateless hard clamp to `[lo, hi]` (actuator range on output chains).
#[derive(Debug, Clone, Copy)]
pub struct ClampFilter {
    lo: f64,
    hi: f64,
}

impl ClampFilter {
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "clamp bounds inverted");
        Self { lo, hi }
    }

    /// Symmetric clamp to ±magnitude.
    pub fn symmetric(magnitude: f64) -> Self {
        Self::new(-magnitude.abs(), magnitude.abs())
    }
}

impl Filter for ClampFilter {
    fn calculate(&mut self, input: f64) -> f64 {
        input.clamp(self.lo, self.hi)
    }

    fn reset(&mut self) {}
}
