//! Per-pass control variable schedule.
//!
//! Grounded in `original_source/src/clc/Controller.{h,cpp}`: `gamma` starts
//! at `0.99999`, and `set_gamma(pass)` steps it down on each subsequent
//! forward pass.

/// Produces the γ used by [`crate::clock::ControlledClock::amortize_forward_intern`]
/// for a given forward pass index (1-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassController {
    gamma: f64,
}

impl Default for PassController {
    fn default() -> Self {
        Self { gamma: 0.99999 }
    }
}

impl PassController {
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// `pass` is 1-based, matching the source's `apply_controller(pass)`
    /// call sites. Pass 1 → 0.99999, pass 2 → 0.9999, pass 3 → 0.999,
    /// pass ≥ 4 → 0.9 times the previous pass's gamma.
    pub fn apply(&mut self, pass: u32) {
        self.gamma = match pass {
            1 => 0.99999,
            2 => 0.9999,
            3 => 0.999,
            _ => 0.9 * self.gamma,
        };
    }
}
