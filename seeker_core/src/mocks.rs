//! Deterministic scalar streams for tests.

use seeker_traits::{DeviceError, ScalarStream};

/// Always yields the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstantStream(pub f64);

impl ScalarStream for ConstantStream {
    fn get(&mut self) -> Result<f64, DeviceError> {
        Ok(self.0)
    }
}

/// Yields a scripted sequence, then repeats the last value forever.
#[derive(Debug, Clone)]
pub struct ScriptStream {
    samples: Vec<f64>,
    index: usize,
}

impl ScriptStream {
    /// Panics on an empty script; a stream must have something to yield.
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        let samples: Vec<f64> = samples.into_iter().collect();
        assert!(!samples.is_empty(), "script must not be empty");
        Self { samples, index: 0 }
    }
}

impl ScalarStream for ScriptStream {
    fn get(&mut self) -> Result<f64, DeviceError> {
        let v = self.samples[self.index];
        if self.index + 1 < self.samples.len() {
            self.index += 1;
        }
        Ok(v)
    }
}

/// Fails every read.
#[derive(Debug, Clone, Copy)]
pub struct FailingStream;

impl ScalarStream for FailingStream {
    fn get(&mut self) -> Result<f64, DeviceError> {
        Err("stream offline".into())
    }
}
