//! Duration-based debounce over a boolean condition stream.
//!
//! The alignment loop ANDs its completion sub-conditions (target visible,
//! velocity under threshold, both errors in tolerance) and debounces the
//! result so a single-cycle sensor glitch can neither grant nor revoke
//! "done" spuriously.

use std::sync::Arc;
use std::time::Instant;

use seeker_traits::Clock;

/// Which transition(s) must persist before the output follows the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceEdge {
    /// false→true requires persistence; true→false is immediate.
    Rising,
    /// true→false requires persistence; false→true is immediate.
    Falling,
    /// Both transitions require persistence.
    Both,
}

/// Debounced boolean stream; call `calculate` once per control cycle.
pub struct Debouncer {
    duration_s: f64,
    edge: DebounceEdge,
    clock: Arc<dyn Clock + Send + Sync>,
    /// Start of the current uninterrupted run of the raw input.
    run_start: Instant,
    last_raw: Option<bool>,
    output: bool,
}

impl Debouncer {
    pub fn new(duration_s: f64, edge: DebounceEdge, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let run_start = clock.now();
        Self {
            duration_s: duration_s.max(0.0),
            edge,
            clock,
            run_start,
            last_raw: None,
            output: false,
        }
    }

    /// Feed one raw sample; returns the debounced value.
    pub fn calculate(&mut self, raw: bool) -> bool {
        if self.last_raw != Some(raw) {
            self.run_start = self.clock.now();
            self.last_raw = Some(raw);
        }
        let held = self.clock.secs_since(self.run_start) >= self.duration_s;

        self.output = match self.edge {
            DebounceEdge::Rising => raw && held,
            DebounceEdge::Falling => raw || (self.output && !held),
            DebounceEdge::Both => {
                if held {
                    raw
                } else {
                    self.output
                }
            }
        };
        self.output
    }

    /// Restart the debounce for a fresh session (required when reusing the
    /// same instance across independent attempts).
    pub fn reset(&mut self) {
        self.run_start = self.clock.now();
        self.last_raw = None;
        self.output = false;
    }
}
