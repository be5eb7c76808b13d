//! Top-level driver tying the forward and backward amortization passes
//! together, one per location.
//!
//! Grounded in `original_source/src/clc/Synchronizer::synchronize` (forward
//! then conditional backward) and its constructor defaults
//! (`max_error = 0.01`, `threshold = 0.05`, `m_max_slope = 0.01`). The pass
//! budget and latency parameters are exposed as configuration instead of
//! compiled-in constants, resolving the Open Question spec.md §9 raises
//! about the latency model ("an implementation should accept them as
//! input").

use tracing::info;

use crate::backward::BackwardEngine;
use crate::comm::{AsyncMessagePool, Communicator, ReverseCommCache, ThreadTeam};
use crate::event::EventRef;
use crate::forward::ForwardEngine;
use crate::latency::LatencyModel;
use crate::stats::Statistics;

#[derive(Debug, Clone, Copy)]
pub struct SynchronizerConfig {
    /// Forward passes budget. The source defaults to a single pass
    /// (`RuntimeStat(1)`); a larger budget lets the loop keep re-replaying
    /// while the relative error at the trace's last event stays above
    /// `error_threshold`.
    pub max_passes: u32,
    /// Threshold on `err_k = (ts'(last) − ts(last)) / (ts(last) − ts(first))`,
    /// not an absolute correction in seconds.
    pub error_threshold: f64,
    pub latency: LatencyModel,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            max_passes: 1,
            error_threshold: 0.05,
            latency: LatencyModel::default(),
        }
    }
}

pub struct Orchestrator {
    config: SynchronizerConfig,
    stats: Statistics,
}

impl Orchestrator {
    pub fn new(config: SynchronizerConfig) -> Self {
        Self {
            config,
            stats: Statistics::new(),
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Runs forward amortization (one or more passes, bounded by
    /// `max_passes`/`error_threshold`) followed by backward amortization
    /// when any clock-condition violation occurred anywhere in the run.
    ///
    /// `events` is this location's local trace, sorted by (pre-correction)
    /// timestamp; `comm` and `team` are the transport and shared-memory
    /// rendezvous this location participates through; `global_violations`
    /// reports whether *any* location (not just this one) saw a violation,
    /// since backward amortization must run everywhere or nowhere for the
    /// collectives it issues to stay matched.
    pub fn synchronize<E: EventRef, C: Communicator>(
        &mut self,
        events: &mut [E],
        comm: &mut C,
        team: &impl ThreadTeam,
        global_violations: impl Fn(u64) -> anyhow::Result<u64>,
    ) -> anyhow::Result<()> {
        self.stats.start_timer();

        let mut forward = ForwardEngine::new(self.config.latency);
        let mut pool = AsyncMessagePool::new();
        let mut pass = 0;
        let mut gl_error = f64::MAX;

        // Snapshotted on pass 1, restored before every later pass, so each
        // pass re-amortizes the original trace rather than one already
        // corrected by its predecessor.
        let mut original_ts: Vec<f64> = Vec::new();

        while pass < self.config.max_passes && gl_error > self.config.error_threshold {
            pass += 1;
            if pass == 1 {
                original_ts = events.iter().map(|e| e.timestamp()).collect();
            } else {
                for (event, &ts) in events.iter_mut().zip(original_ts.iter()) {
                    event.set_timestamp(ts);
                }
            }

            forward.reset();
            forward.apply_controller(pass);
            self.stats.next_pass();

            let pass_stats = forward.run_pass(events, comm, team, &mut pool)?;
            self.stats.absorb_pass(pass_stats);
            gl_error = relative_error(&original_ts, events);
        }
        pool.cancel_remaining();
        self.stats.record_relative_error(if pass > 0 { gl_error } else { 0.0 });

        self.stats.total_violations = forward.num_violations();
        self.stats.p2p_violations = forward.p2p_violations();
        self.stats.coll_violations = forward.coll_violations();
        self.stats.omp_violations = forward.omp_violations();
        self.stats.num_events = events.len() as u64;

        let gl_violations = global_violations(forward.num_violations())?;

        if gl_violations > 0 {
            let first_evt_t = forward.first_event_timestamp().unwrap_or(f64::MIN);
            let violations = forward.into_violations();

            let mut backward = BackwardEngine::new(self.config.latency);
            let mut reverse_cache = ReverseCommCache::new();
            backward.collect(events, comm, team, &mut reverse_cache, &mut pool)?;
            pool.cancel_remaining();
            backward.local_correction(events, &violations, first_evt_t);
            self.stats.record_backward_slope(backward.max_slope());
        }

        self.stats.stop_timer();
        Ok(())
    }

    pub fn print_statistics(&self) {
        info!("{}", self.stats.report());
    }
}

/// `err_k = (ts'(last) − ts(last)) / (ts(last) − ts(first))`, the outer
/// loop's termination metric. `original_ts` holds the pass-1 snapshot;
/// `events` holds this pass's corrected timestamps. Zero when the trace has
/// fewer than two events or its original span is degenerate.
fn relative_error<E: EventRef>(original_ts: &[f64], events: &[E]) -> f64 {
    if original_ts.len() < 2 || events.len() != original_ts.len() {
        return 0.0;
    }
    let ts_first = original_ts[0];
    let ts_last = *original_ts.last().expect("checked len >= 2");
    let span = ts_last - ts_first;
    if span.abs() < f64::EPSILON {
        return 0.0;
    }
    let corrected_last = events.last().expect("checked len >= 2").timestamp();
    ((corrected_last - ts_last) / span).abs()
}
