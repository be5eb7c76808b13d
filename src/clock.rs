//! Per-location controlled clock state and the forward amortization formulas.
//!
//! Grounded in `original_source/src/clc/Clock.{h,cpp}`. Field names mirror the
//! source (`value`, `delta`, `prevEvtT`) with the delta fixed at `1.0e-9` as
//! the source constructs it; `Controller`'s role is taken over by
//! [`crate::pass::PassController`].

use crate::pass::PassController;

/// Which violation counter a forward-amortized receive event contributes to.
/// Mirrors `clc_event_t` in `original_source/src/clc/include/clc_types.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    P2p,
    Coll,
    Omp,
}

/// One location's running clock state across the forward amortization pass.
#[derive(Debug, Clone)]
pub struct ControlledClock {
    value: f64,
    delta: f64,
    prev_evt_t: f64,
    pass: PassController,
    num_viol: u64,
    p2p_violation: u64,
    coll_violation: u64,
    omp_violation: u64,
}

impl Default for ControlledClock {
    /// Matches `Clock::Clock()`: `value = -DBL_MAX`, `delta = 1.0e-9`,
    /// `prevEvtT = 0.5 * DBL_MAX`.
    fn default() -> Self {
        Self {
            value: -f64::MAX,
            delta: 1.0e-9,
            prev_evt_t: 0.5 * f64::MAX,
            pass: PassController::default(),
            num_viol: 0,
            p2p_violation: 0,
            coll_violation: 0,
            omp_violation: 0,
        }
    }
}

impl ControlledClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn set_value(&mut self, v: f64) {
        self.value = v;
    }

    pub fn set_delta(&mut self, d: f64) {
        self.delta = d;
    }

    pub fn set_prev(&mut self, p: f64) {
        self.prev_evt_t = p;
    }

    pub fn num_violations(&self) -> u64 {
        self.num_viol
    }

    pub fn p2p_violations(&self) -> u64 {
        self.p2p_violation
    }

    pub fn coll_violations(&self) -> u64 {
        self.coll_violation
    }

    pub fn omp_violations(&self) -> u64 {
        self.omp_violation
    }

    /// `apply_controller(pass)`: advances the gamma schedule for the next
    /// forward pass.
    pub fn apply_controller(&mut self, pass: u32) {
        self.pass.apply(pass);
    }

    /// `reset()`: clears the violation tally and the "previous event"
    /// anchor between passes. `value` and `delta` survive a reset — only a
    /// fresh [`ControlledClock`] starts them at their defaults.
    pub fn reset(&mut self) {
        self.num_viol = 0;
        self.prev_evt_t = f64::MAX;
    }

    /// Equation (3): amortizes an internal (non-communication) event
    /// forward. Returns the corrected timestamp.
    pub fn amortize_forward_intern(&mut self, cur_evt_t: f64) -> f64 {
        self.value = (self.value + self.delta)
            .max(self.value + self.pass.gamma() * (cur_evt_t - self.prev_evt_t))
            .max(cur_evt_t);
        self.prev_evt_t = cur_evt_t;
        self.value
    }

    /// Equation (4): amortizes a receive event forward. Returns the
    /// *internal-only* amortized timestamp (before the clock-condition
    /// correction is applied) — callers needing the corrected value read
    /// [`Self::value`] afterwards.
    pub fn amortize_forward_recv(
        &mut self,
        cur_evt_t: f64,
        send_evt_t: f64,
        latency: f64,
        event_type: EventClass,
    ) -> f64 {
        let intern_t = self.amortize_forward_intern(cur_evt_t);
        self.value = (send_evt_t + latency).max(intern_t);
        self.is_violation(intern_t, send_evt_t + latency, event_type);
        intern_t
    }

    fn is_violation(&mut self, cur_evt_t: f64, send_evt_t: f64, event_type: EventClass) {
        if cur_evt_t < send_evt_t {
            self.num_viol += 1;
            match event_type {
                EventClass::P2p => self.p2p_violation += 1,
                EventClass::Coll => self.coll_violation += 1,
                EventClass::Omp => self.omp_violation += 1,
            }
        }
    }
}
