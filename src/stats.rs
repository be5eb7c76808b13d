//! Runtime statistics accumulated across passes and reported after
//! `synchronize()` returns.
//!
//! Grounded in `original_source/src/clc/RuntimeStat.h` (pass/error
//! bookkeeping) and `Synchronizer::print_statistics` (the reduction and
//! report it builds from `Clock`'s per-channel violation counters plus its
//! own pass/error/slope state). `final_relative_error` is the relative
//! error at the trace's last event, `(ts'(last) - ts(last)) / (ts(last) -
//! ts(first))`; `max_clock_error`/`sum_clock_error` stay as the
//! per-correction absolute bookkeeping used for the `max. error [s]` line.

use std::time::{Duration, Instant};

/// Per-pass correction totals a [`crate::forward::ForwardEngine`] reports
/// back to the orchestrator after replaying one forward pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassStats {
    pub max_abs_correction: f64,
    pub sum_abs_correction: f64,
    pub num_clock_corr: u64,
}

impl PassStats {
    pub fn record(&mut self, original: f64, corrected: f64) {
        let diff = (corrected - original).abs();
        self.sum_abs_correction += diff;
        if diff > self.max_abs_correction {
            self.max_abs_correction = diff;
        }
        if diff > 0.0 {
            self.num_clock_corr += 1;
        }
    }
}

/// Accumulated across the whole `synchronize()` call, reduced across
/// locations by the host before being printed.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub pass: u32,
    pub num_events: u64,
    pub num_clock_corr: u64,
    pub max_clock_error: f64,
    pub sum_clock_error: f64,
    /// `err_k` at the last pass run: `(ts'(last) − ts(last)) / (ts(last) −
    /// ts(first))`, the same metric the orchestrator's loop terminates on.
    pub final_relative_error: f64,
    pub total_violations: u64,
    pub p2p_violations: u64,
    pub coll_violations: u64,
    pub omp_violations: u64,
    pub max_backward_slope: f64,
    wall_start: Option<Instant>,
    pub wall_time: Duration,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            pass: 0,
            num_events: 0,
            num_clock_corr: 0,
            max_clock_error: 0.0,
            sum_clock_error: 0.0,
            final_relative_error: 0.0,
            total_violations: 0,
            p2p_violations: 0,
            coll_violations: 0,
            omp_violations: 0,
            max_backward_slope: 0.01,
            wall_start: None,
            wall_time: Duration::ZERO,
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self) {
        self.wall_start = Some(Instant::now());
    }

    pub fn stop_timer(&mut self) {
        if let Some(start) = self.wall_start.take() {
            self.wall_time += start.elapsed();
        }
    }

    pub fn next_pass(&mut self) {
        self.pass += 1;
    }

    pub fn absorb_pass(&mut self, pass: PassStats) {
        self.num_clock_corr += pass.num_clock_corr;
        self.sum_clock_error += pass.sum_abs_correction;
        if pass.max_abs_correction > self.max_clock_error {
            self.max_clock_error = pass.max_abs_correction;
        }
    }

    pub fn record_backward_slope(&mut self, slope: f64) {
        if slope > self.max_backward_slope {
            self.max_backward_slope = slope;
        }
    }

    /// Records `err_k`, the relative error at the trace's last event after
    /// the most recently completed pass — the same quantity that gates the
    /// orchestrator's forward-pass loop.
    pub fn record_relative_error(&mut self, err: f64) {
        self.final_relative_error = err;
    }

    /// Human-readable report, matching the fields
    /// `Synchronizer::print_statistics` prints (pass count, violations,
    /// corrections, max error, final error percentage, max slope).
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# passes        : {}\n", self.pass));
        out.push_str(&format!("# violated      : {}\n", self.total_violations));
        out.push_str(&format!(
            "final error     : {:.6} %\n",
            self.final_relative_error * 100.0
        ));
        if self.total_violations > 0 {
            out.push_str(&format!("# corrected     : {}\n", self.num_clock_corr));
            out.push_str(&format!("# reversed-p2p  : {}\n", self.p2p_violations));
            out.push_str(&format!("# reversed-coll : {}\n", self.coll_violations));
            out.push_str(&format!("# reversed-omp  : {}\n", self.omp_violations));
            out.push_str(&format!("# events        : {}\n", self.num_events));
            out.push_str(&format!("max. error      : {:.6} [s]\n", self.max_clock_error));
            out.push_str(&format!("Max slope       : {:.9}\n", self.max_backward_slope));
        }
        out
    }
}
