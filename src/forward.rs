//! Forward amortization: a single pass that propagates corrections along
//! causal edges using the controlled logical clock.
//!
//! Grounded in `original_source/src/clc/Synchronizer.cpp`'s
//! `amortize_fwd_*` callback family. The source drives these through a
//! trace-replay's preprocess/postprocess hooks (every event gets
//! `fa_amortize_intern` applied by default; receive-like events instead run
//! `fa_amortize_recv`, which embeds the same internal step). This engine
//! makes that choice explicit: each event is routed to exactly one of
//! [`ForwardEngine::intern`] or [`ForwardEngine::recv`].

use tracing::debug;

use crate::clock::{ControlledClock, EventClass};
use crate::collective::{classify, CollectiveClass};
use crate::comm::{AsyncMessagePool, Communicator, ThreadTeam};
use crate::event::{EventKind, EventRef, RegionRole};
use crate::latency::LatencyModel;
use crate::location::Channel;
use crate::payload::{AmortPayload, ReduceOp};
use crate::stats::PassStats;
use crate::violation::ViolationMap;

/// Sentinel used in place of a real timestamp when a collective call
/// carries no payload on this side, so the reduction can never trigger a
/// receive amortization. Mirrors the source's `-DBL_MAX`/`DBL_MAX` sentinels.
const NO_PAYLOAD_SEND: f64 = f64::MIN;
const NO_PAYLOAD_RECV: f64 = f64::MIN;

pub struct ForwardEngine {
    clock: ControlledClock,
    latency: LatencyModel,
    violations: ViolationMap,
    first_evt_t: Option<f64>,
    team_max: Option<f64>,
}

impl ForwardEngine {
    pub fn new(latency: LatencyModel) -> Self {
        Self {
            clock: ControlledClock::new(),
            latency,
            violations: ViolationMap::new(),
            first_evt_t: None,
            team_max: None,
        }
    }

    pub fn apply_controller(&mut self, pass: u32) {
        self.clock.apply_controller(pass);
    }

    /// `prepare_replay`'s clock-side half: reset violation bookkeeping for
    /// the next pass. `value`/`delta` survive, matching `Clock::reset`.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.violations.clear();
        self.first_evt_t = None;
        self.team_max = None;
    }

    pub fn first_event_timestamp(&self) -> Option<f64> {
        self.first_evt_t
    }

    pub fn violations(&self) -> &ViolationMap {
        &self.violations
    }

    pub fn into_violations(self) -> ViolationMap {
        self.violations
    }

    pub fn num_violations(&self) -> u64 {
        self.clock.num_violations()
    }

    pub fn p2p_violations(&self) -> u64 {
        self.clock.p2p_violations()
    }

    pub fn coll_violations(&self) -> u64 {
        self.clock.coll_violations()
    }

    pub fn omp_violations(&self) -> u64 {
        self.clock.omp_violations()
    }

    fn note_first_event(&mut self, original_ts: f64) {
        if self.first_evt_t.is_none() {
            self.first_evt_t = Some(original_ts);
        }
    }

    fn intern<E: EventRef>(&mut self, event: &mut E, pass_stats: &mut PassStats) {
        let cur_t = event.timestamp();
        self.note_first_event(cur_t);
        let corrected = self.clock.amortize_forward_intern(cur_t);
        event.set_timestamp(corrected);
        pass_stats.record(cur_t, corrected);
    }

    fn recv<E: EventRef>(
        &mut self,
        event: &mut E,
        send_evt_t: f64,
        latency: f64,
        class: EventClass,
        pass_stats: &mut PassStats,
    ) {
        let cur_t = event.timestamp();
        self.note_first_event(cur_t);
        let intern_t = self.clock.amortize_forward_recv(cur_t, send_evt_t, latency, class);
        let corrected = self.clock.value();
        event.set_timestamp(corrected);
        if intern_t < corrected {
            self.violations.insert(event.local_index(), intern_t);
        }
        pass_stats.record(cur_t, corrected);
    }

    /// Runs one forward pass over `events` (assumed sorted by local
    /// timestamp) against the single communicator and thread team `comm`
    /// and `team` cover. Returns this pass's correction statistics.
    pub fn run_pass<E: EventRef, C: Communicator>(
        &mut self,
        events: &mut [E],
        comm: &mut C,
        team: &impl ThreadTeam,
        pool: &mut AsyncMessagePool<C::Handle>,
    ) -> anyhow::Result<PassStats> {
        let mut pass_stats = PassStats::default();
        let my_loc = events.first().map(|e| e.location());

        for event in events.iter_mut() {
            self.dispatch(event, comm, team, pool, &mut pass_stats)?;
        }

        if let Some(loc) = my_loc {
            debug!(?loc, corrections = pass_stats.num_clock_corr, "forward pass complete");
        }
        Ok(pass_stats)
    }

    fn dispatch<E: EventRef, C: Communicator>(
        &mut self,
        event: &mut E,
        comm: &mut C,
        team: &impl ThreadTeam,
        pool: &mut AsyncMessagePool<C::Handle>,
        pass_stats: &mut PassStats,
    ) -> anyhow::Result<()> {
        match event.kind() {
            EventKind::Internal => self.intern(event, pass_stats),

            EventKind::Send => {
                self.intern(event, pass_stats);
                let dest = event
                    .peer_rank()
                    .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingPeerRank))?;
                let tag = event.tag().unwrap_or(0);
                let payload = AmortPayload::pack(event.location(), event.timestamp());
                let handle = comm.isend(dest, tag, payload)?;
                pool.post(handle);
                pool.test_some();
            }

            EventKind::Receive => {
                let source = event
                    .peer_rank()
                    .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingPeerRank))?;
                let tag = event.tag().unwrap_or(0);
                let payload = comm.recv(source, tag)?;
                let (sender_loc, send_evt_t) = payload.unpack();
                let latency = self.latency.latency(sender_loc, event.location(), Channel::PointToPoint);
                self.recv(event, send_evt_t, latency, EventClass::P2p, pass_stats);
            }

            EventKind::CollectiveEnd => self.dispatch_collective(event, comm, pass_stats)?,

            EventKind::ThreadForkLeave => {
                self.intern(event, pass_stats);
                team.publish(event.timestamp());
            }

            EventKind::ThreadTeamBegin => {
                team.barrier();
                let send_evt_t = team.read_shared();
                let latency = self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                self.recv(event, send_evt_t, latency, EventClass::Omp, pass_stats);
            }

            EventKind::ThreadTeamEnd => {
                self.intern(event, pass_stats);
                self.team_max = Some(team.allreduce_max(event.timestamp()));
            }

            EventKind::ThreadJoinLeave => {
                let send_evt_t = self.team_max.take().unwrap_or(event.timestamp());
                let latency = self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                self.recv(event, send_evt_t, latency, EventClass::Omp, pass_stats);
            }

            EventKind::FunctionLeave => match event.region_role() {
                RegionRole::Ordinary => self.intern(event, pass_stats),

                RegionRole::MpiInitOrFinalize => {
                    let enter = event.enter();
                    let enter_ts = enter.map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                    let local = AmortPayload::pack(event.location(), enter_ts);
                    let reduced = comm.allreduce(ReduceOp::Max, local)?;
                    let (sender_loc, send_evt_t) = reduced.unpack();
                    let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                    self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
                }

                RegionRole::SharedMemoryBarrier => {
                    if event.thread_team().is_none() {
                        // Leave-barrier outside any parallel block: treat as
                        // internal to avoid a deadlock waiting on threads
                        // that never enter the replay.
                        self.intern(event, pass_stats);
                    } else {
                        let enter = event.enter();
                        let enter_ts = enter.map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                        let send_evt_t = team.allreduce_max(enter_ts);
                        let latency = self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                        self.recv(event, send_evt_t, latency, EventClass::Omp, pass_stats);
                    }
                }
            },
        }
        Ok(())
    }

    fn dispatch_collective<E: EventRef, C: Communicator>(
        &mut self,
        event: &mut E,
        comm: &mut C,
        pass_stats: &mut PassStats,
    ) -> anyhow::Result<()> {
        if comm.size() == 1 {
            self.intern(event, pass_stats);
            return Ok(());
        }

        let sub_kind = event
            .collective_sub_kind()
            .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingCollectiveSubKind))?;

        match classify(sub_kind) {
            CollectiveClass::Opaque => self.intern(event, pass_stats),

            CollectiveClass::Barrier => {
                let begin = event.begin();
                let begin_ts = begin.map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                let local = AmortPayload::pack(event.location(), begin_ts);
                let reduced = comm.allreduce(ReduceOp::Max, local)?;
                let (sender_loc, send_evt_t) = reduced.unpack();
                let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
            }

            CollectiveClass::OneToN => {
                let root = event
                    .root()
                    .ok_or_else(|| anyhow::anyhow!("1-to-N collective missing root"))?;
                let on_root = comm.local_rank() == root;
                let send_evt_t = if on_root {
                    let begin_ts = event.begin().map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                    if event.bytes_sent() == 0 {
                        NO_PAYLOAD_SEND
                    } else {
                        begin_ts
                    }
                } else {
                    0.0
                };
                let local = AmortPayload::pack(event.location(), send_evt_t);
                let broadcast = comm.bcast(root, local)?;
                if !on_root && event.bytes_received() > 0 {
                    let (sender_loc, send_evt_t) = broadcast.unpack();
                    let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                    self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
                } else {
                    self.intern(event, pass_stats);
                }
            }

            CollectiveClass::NToOne => {
                let root = event
                    .root()
                    .ok_or_else(|| anyhow::anyhow!("N-to-1 collective missing root"))?;
                let begin_ts = event.begin().map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                let send_evt_t = if event.bytes_sent() == 0 { NO_PAYLOAD_SEND } else { begin_ts };
                let local = AmortPayload::pack(event.location(), send_evt_t);
                let reduced = comm.reduce(root, ReduceOp::Max, local)?;
                if comm.local_rank() == root && event.bytes_received() > 0 {
                    let (sender_loc, send_evt_t) = reduced.unpack();
                    let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                    self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
                } else {
                    self.intern(event, pass_stats);
                }
            }

            CollectiveClass::NToN => {
                let begin_ts = event.begin().map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                let send_evt_t = if event.bytes_sent() == 0 { NO_PAYLOAD_SEND } else { begin_ts };
                let local = AmortPayload::pack(event.location(), send_evt_t);
                let reduced = comm.allreduce(ReduceOp::Max, local)?;
                let (sender_loc, mut send_evt_t) = reduced.unpack();
                if event.bytes_received() == 0 {
                    send_evt_t = NO_PAYLOAD_RECV;
                }
                let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
            }

            CollectiveClass::Prefix => {
                let begin_ts = event.begin().map(|e| e.timestamp()).unwrap_or_else(|| event.timestamp());
                let send_evt_t = if event.bytes_sent() == 0 { NO_PAYLOAD_SEND } else { begin_ts };
                let local = AmortPayload::pack(event.location(), send_evt_t);
                let scanned = comm.scan(ReduceOp::Max, local)?;
                let (sender_loc, mut send_evt_t) = scanned.unpack();
                if event.bytes_received() == 0 {
                    send_evt_t = NO_PAYLOAD_RECV;
                }
                let latency = self.latency.latency(sender_loc, event.location(), Channel::Collective);
                self.recv(event, send_evt_t, latency, EventClass::Coll, pass_stats);
            }
        }
        Ok(())
    }
}
