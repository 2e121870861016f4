//! Feedback controllers: PID with gated integrator, and bang-bang.
//!
//! The trait is the substitution seam: anything implementing
//! `FeedbackController` (including an auto-tuning variant supplied by the
//! caller) can drive a loop; the alignment core never downcasts.

use crate::config::PidGains;
use crate::error::ControlError;
use crate::filter::Filter;

/// Closed-loop controller over one scalar error.
pub trait FeedbackController {
    /// Compute the next output from `target` and `measurement`.
    fn update(&mut self, target: f64, measurement: f64) -> f64;

    /// Error recorded by the most recent `update()`, if any.
    fn last_error(&self) -> Option<f64>;

    /// True iff `|last_error| < tolerance`. Querying before the first
    /// `update()` is a programmer error and fails loudly.
    fn is_done(&self, tolerance: f64) -> Result<bool, ControlError> {
        match self.last_error() {
            Some(e) => Ok(e.abs() < tolerance),
            None => Err(ControlError::NeverUpdated),
        }
    }

    /// Return to the fresh state expected at the start of an attempt.
    fn reset(&mut self);
}

/// Anti-windup gate: accumulate only while `|error| < range`, clamp the
/// accumulator to `±limit`.
#[derive(Debug, Clone, Copy)]
struct IntegratorGate {
    range: f64,
    limit: f64,
    accum: f64,
}

impl IntegratorGate {
    fn new(range: f64, limit: f64) -> Self {
        Self {
            range,
            limit,
            accum: 0.0,
        }
    }

    fn accumulate(&mut self, error: f64, period_s: f64) -> f64 {
        if error.abs() < self.range {
            self.accum = (self.accum + error * period_s).clamp(-self.limit, self.limit);
        }
        self.accum
    }

    fn reset(&mut self) {
        self.accum = 0.0;
    }
}

/// PID controller with optional error/output filter chains.
///
/// `output = kp*e + ki*∫e + kd*de/dt` where `e` is the error after the
/// error-filter chain and the integral is gated by [`IntegratorGate`].
pub struct PidController {
    gains: PidGains,
    period_s: f64,
    integrator: IntegratorGate,
    error_filters: Vec<Box<dyn Filter>>,
    output_filters: Vec<Box<dyn Filter>>,
    prev_error: Option<f64>,
    last_error: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains, period_s: f64) -> Self {
        Self {
            gains,
            period_s,
            integrator: IntegratorGate::new(gains.integrator_range, gains.integrator_limit),
            error_filters: Vec::new(),
            output_filters: Vec::new(),
            prev_error: None,
            last_error: None,
        }
    }

    /// Append a filter to the error chain (applied before the gains).
    pub fn with_error_filter(mut self, f: Box<dyn Filter>) -> Self {
        self.error_filters.push(f);
        self
    }

    /// Append a filter to the output chain (applied after the gains).
    pub fn with_output_filter(mut self, f: Box<dyn Filter>) -> Self {
        self.output_filters.push(f);
        self
    }
}

impl FeedbackController for PidController {
    fn update(&mut self, target: f64, measurement: f64) -> f64 {
        let mut e = target - measurement;
        for f in &mut self.error_filters {
            e = f.calculate(e);
        }

        let i = self.integrator.accumulate(e, self.period_s);
        let d = match self.prev_error {
            Some(prev) => (e - prev) / self.period_s,
            None => 0.0,
        };
        self.prev_error = Some(e);
        self.last_error = Some(e);

        let mut out = self.gains.kp * e + self.gains.ki * i + self.gains.kd * d;
        for f in &mut self.output_filters {
            out = f.calculate(out);
        }
        tracing::trace!(error = e, integral = i, derivative = d, out, "pid update");
        out
    }

    fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    fn reset(&mut self) {
        self.integrator.reset();
        self.prev_error = None;
        self.last_error = None;
        for f in &mut self.error_filters {
            f.reset();
        }
        for f in &mut self.output_filters {
            f.reset();
        }
    }
}

/// Fixed-magnitude controller: `sign(e) * magnitude`, zero at `e == 0`.
///
/// Used for characterization runs and coarse control.
pub struct BangBangController {
    magnitude: f64,
    last_error: Option<f64>,
}

impl BangBangController {
    pub fn new(magnitude: f64) -> Self {
        Self {
            magnitude: magnitude.abs(),
            last_error: None,
        }
    }
}

impl FeedbackController for BangBangController {
    fn update(&mut self, target: f64, measurement: f64) -> f64 {
        let e = target - measurement;
        self.last_error = Some(e);
        if e > 0.0 {
            self.magnitude
        } else if e < 0.0 {
            -self.magnitude
        } else {
            0.0
        }
    }

    fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    fn reset(&mut self) {
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ClampFilter;

    fn p_only(kp: f64) -> PidGains {
        PidGains {
            kp,
            ki: 0.0,
            kd: 0.0,
            integrator_range: 0.0,
            integrator_limit: 0.0,
        }
    }

    #[test]
    fn is_done_before_update_fails() {
        let pid = PidController::new(PidGains::default(), 0.02);
        assert!(matches!(pid.is_done(1.0), Err(ControlError::NeverUpdated)));
        let bb = BangBangController::new(0.5);
        assert!(matches!(bb.is_done(1.0), Err(ControlError::NeverUpdated)));
    }

    #[test]
    fn proportional_only_output_is_kp_times_error() {
        let mut pid = PidController::new(p_only(0.04), 0.02);
        for _ in 0..20 {
            let out = pid.update(10.0, 0.0);
            assert!((out - 0.4).abs() < 1e-12);
        }
    }

    #[test]
    fn integrator_only_accumulates_inside_range() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            integrator_range: 2.0,
            integrator_limit: 10.0,
        };
        let mut pid = PidController::new(gains, 0.1);
        // |e| = 5 >= range: no accumulation
        assert_eq!(pid.update(5.0, 0.0), 0.0);
        // |e| = 1 < range: accumulates e*dt per call
        let a = pid.update(1.0, 0.0);
        let b = pid.update(1.0, 0.0);
        assert!((a - 0.1).abs() < 1e-12);
        assert!((b - 0.2).abs() < 1e-12);
    }

    #[test]
    fn integrator_clamps_at_limit() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            integrator_range: 10.0,
            integrator_limit: 0.25,
        };
        let mut pid = PidController::new(gains, 0.1);
        let mut out = 0.0;
        for _ in 0..100 {
            out = pid.update(5.0, 0.0);
        }
        assert!((out - 0.25).abs() < 1e-12, "integral must clamp: {out}");
    }

    #[test]
    fn derivative_sees_error_change() {
        let gains = PidGains {
            kp: 0.0,
            ki: 0.0,
            kd: 0.1,
            integrator_range: 0.0,
            integrator_limit: 0.0,
        };
        let mut pid = PidController::new(gains, 0.1);
        assert_eq!(pid.update(1.0, 0.0), 0.0); // first call: no derivative
        let out = pid.update(2.0, 0.0); // de = 1.0 over 0.1s
        assert!((out - 1.0).abs() < 1e-12);
    }

    #[test]
    fn output_filter_chain_applies() {
        let mut pid = PidController::new(p_only(1.0), 0.02)
            .with_output_filter(Box::new(ClampFilter::symmetric(0.3)));
        assert!((pid.update(10.0, 0.0) - 0.3).abs() < 1e-12);
        assert!((pid.update(-10.0, 0.0) + 0.3).abs() < 1e-12);
    }

    #[test]
    fn reset_makes_the_controller_fresh() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            integrator_range: 10.0,
            integrator_limit: 10.0,
        };
        let mut pid = PidController::new(gains, 0.1);
        pid.update(1.0, 0.0);
        pid.reset();
        assert!(matches!(pid.is_done(1.0), Err(ControlError::NeverUpdated)));
        // Integrator starts over after reset.
        let out = pid.update(1.0, 0.0);
        assert!((out - 0.1).abs() < 1e-12);
    }

    #[test]
    fn is_done_reflects_most_recent_update_only() {
        let mut pid = PidController::new(p_only(1.0), 0.02);
        pid.update(10.0, 0.0);
        assert!(!pid.is_done(1.0).unwrap());
        pid.update(10.0, 9.8);
        assert!(pid.is_done(1.0).unwrap());
        pid.update(10.0, 0.0);
        assert!(!pid.is_done(1.0).unwrap());
    }

    #[test]
    fn bang_bang_outputs_sign_times_magnitude() {
        let mut bb = BangBangController::new(0.6);
        assert_eq!(bb.update(1.0, 0.0), 0.6);
        assert_eq!(bb.update(-1.0, 0.0), -0.6);
        assert_eq!(bb.update(5.0, 5.0), 0.0);
        assert_eq!(bb.last_error(), Some(0.0));
    }
}
