//! Backward amortization: a reverse replay that computes, for every logical
//! send, the latest timestamp it could have carried without violating the
//! clock condition at its matching receive — then a local piecewise-linear
//! interpolation that redistributes the corrections forward-amortization
//! introduced, bounded by a slope cap.
//!
//! Grounded in `original_source/src/clc/Synchronizer.cpp`'s `amortize_bkwd_*`
//! callback family (role-inverted relative to the forward pass: a
//! point-to-point send becomes a *receiver* of its matching receive's
//! corrected timestamp) and `ba_amortize`/`ba_piecewise_interpolation`.

use std::collections::HashMap;

use crate::collective::{classify, CollectiveClass};
use crate::comm::{AsyncMessagePool, Communicator, ReverseCommCache, ThreadTeam};
use crate::event::{EventKind, EventRef, RegionRole};
use crate::latency::LatencyModel;
use crate::location::Channel;
use crate::payload::{AmortPayload, ReduceOp};
use crate::violation::ViolationMap;

/// Sentinel used where a collective side carries no payload, chosen so the
/// CLC-min reduction never selects it as the binding bound. Mirrors the
/// source's `DBL_MAX`.
const NO_PAYLOAD: f64 = f64::MAX;

const DEFAULT_SLOPE_CAP: f64 = 0.01;

pub struct BackwardEngine {
    latency: LatencyModel,
    tsa: Vec<f64>,
    /// Marks, by local index, which events contributed a `tsa` entry during
    /// collection — used by the local-correction walk to track the `mySend`
    /// cursor without re-deriving a rank-aware "is this a logical send"
    /// predicate from scratch.
    contributed: HashMap<u64, ()>,
    max_slope: f64,
}

impl BackwardEngine {
    pub fn new(latency: LatencyModel) -> Self {
        Self {
            latency,
            tsa: Vec::new(),
            contributed: HashMap::new(),
            max_slope: DEFAULT_SLOPE_CAP,
        }
    }

    pub fn max_slope(&self) -> f64 {
        self.max_slope
    }

    fn push_bound(&mut self, event_idx: u64, bound: f64) {
        self.tsa.push(bound);
        self.contributed.insert(event_idx, ());
    }

    /// Reverse replay: walks `events` from last to first, collecting the
    /// backward timestamp bound at every logical send. `pool` carries the
    /// non-blocking sends the former-receive handler posts — mirroring the
    /// forward pass, the reverse replay never blocks waiting for its own
    /// sends to land.
    pub fn collect<E: EventRef, C: Communicator>(
        &mut self,
        events: &mut [E],
        comm: &mut C,
        team: &impl ThreadTeam,
        reverse_cache: &mut ReverseCommCache<C>,
        pool: &mut AsyncMessagePool<C::Handle>,
    ) -> anyhow::Result<()> {
        let mut team_shared = 0.0;
        for event in events.iter_mut().rev() {
            self.collect_one(event, comm, team, reverse_cache, pool, &mut team_shared)?;
        }
        Ok(())
    }

    fn collect_one<E: EventRef, C: Communicator>(
        &mut self,
        event: &mut E,
        comm: &mut C,
        team: &impl ThreadTeam,
        reverse_cache: &mut ReverseCommCache<C>,
        pool: &mut AsyncMessagePool<C::Handle>,
        team_shared: &mut f64,
    ) -> anyhow::Result<()> {
        match event.kind() {
            EventKind::Internal => {}

            EventKind::Send => {
                let dest = event
                    .peer_rank()
                    .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingPeerRank))?;
                let tag = event.tag().unwrap_or(0);
                let payload = comm.recv(dest, tag)?;
                let (recv_loc, recv_evt_t) = payload.unpack();
                let bound = recv_evt_t - self.latency.latency(recv_loc, event.location(), Channel::PointToPoint);
                self.push_bound(event.local_index(), bound);
            }

            EventKind::Receive => {
                let source = event
                    .peer_rank()
                    .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingPeerRank))?;
                let tag = event.tag().unwrap_or(0);
                let payload = AmortPayload::pack(event.location(), event.timestamp());
                let handle = comm.isend(source, tag, payload)?;
                pool.post(handle);
                pool.test_some();
            }

            EventKind::CollectiveEnd => self.collect_collective(event, comm, reverse_cache)?,

            EventKind::ThreadForkLeave => {
                let bound = *team_shared - self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                self.push_bound(event.local_index(), bound);
            }

            EventKind::ThreadTeamBegin => {
                *team_shared = team.allreduce_min(event.timestamp());
            }

            EventKind::ThreadTeamEnd => {
                let bound = *team_shared - self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                self.push_bound(event.local_index(), bound);
            }

            EventKind::ThreadJoinLeave => {
                *team_shared = event.timestamp();
            }

            EventKind::FunctionLeave => match event.region_role() {
                RegionRole::Ordinary => {}

                RegionRole::MpiInitOrFinalize => {
                    let local = AmortPayload::pack(event.location(), event.timestamp());
                    let reduced = comm.allreduce(ReduceOp::Min, local)?;
                    let (ex_loc, recv_evt_t) = reduced.unpack();
                    let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                    self.push_bound(event.local_index(), bound);
                }

                RegionRole::SharedMemoryBarrier => {
                    if event.thread_team().is_some() {
                        let recv_evt_t = team.allreduce_min(event.timestamp());
                        let bound =
                            recv_evt_t - self.latency.latency(event.location(), event.location(), Channel::SharedMemory);
                        self.push_bound(event.local_index(), bound);
                    }
                }
            },
        }
        Ok(())
    }

    fn collect_collective<E: EventRef, C: Communicator>(
        &mut self,
        event: &mut E,
        comm: &mut C,
        reverse_cache: &mut ReverseCommCache<C>,
    ) -> anyhow::Result<()> {
        if comm.size() == 1 {
            return Ok(());
        }
        let sub_kind = event
            .collective_sub_kind()
            .ok_or_else(|| anyhow::anyhow!(crate::error::MalformedTrace::MissingCollectiveSubKind))?;

        match classify(sub_kind) {
            CollectiveClass::Opaque => {}

            CollectiveClass::Barrier => {
                let local = AmortPayload::pack(event.location(), event.timestamp());
                let reduced = comm.allreduce(ReduceOp::Min, local)?;
                let (ex_loc, recv_evt_t) = reduced.unpack();
                let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                self.push_bound(event.local_index(), bound);
            }

            CollectiveClass::OneToN => {
                let root = event.root().ok_or_else(|| anyhow::anyhow!("1-to-N collective missing root"))?;
                let mut recv_evt_t = event.timestamp();
                if event.bytes_received() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let local = AmortPayload::pack(event.location(), recv_evt_t);
                let reduced = comm.reduce(root, ReduceOp::Min, local)?;
                if comm.local_rank() == root {
                    let (ex_loc, mut recv_evt_t) = reduced.unpack();
                    if event.bytes_sent() == 0 {
                        recv_evt_t = NO_PAYLOAD;
                    }
                    let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                    self.push_bound(event.local_index(), bound);
                }
            }

            CollectiveClass::NToOne => {
                let root = event.root().ok_or_else(|| anyhow::anyhow!("N-to-1 collective missing root"))?;
                let mut recv_evt_t = event.timestamp();
                if event.bytes_received() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let local = AmortPayload::pack(event.location(), recv_evt_t);
                let broadcast = comm.bcast(root, local)?;
                if comm.local_rank() != root {
                    let (ex_loc, mut recv_evt_t) = broadcast.unpack();
                    if event.bytes_sent() == 0 {
                        recv_evt_t = NO_PAYLOAD;
                    }
                    let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                    self.push_bound(event.local_index(), bound);
                }
            }

            CollectiveClass::NToN => {
                let mut recv_evt_t = event.timestamp();
                if event.bytes_received() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let local = AmortPayload::pack(event.location(), recv_evt_t);
                let reduced = comm.allreduce(ReduceOp::Min, local)?;
                let (ex_loc, mut recv_evt_t) = reduced.unpack();
                if event.bytes_sent() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                self.push_bound(event.local_index(), bound);
            }

            CollectiveClass::Prefix => {
                let mut recv_evt_t = event.timestamp();
                if event.bytes_received() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let local = AmortPayload::pack(event.location(), recv_evt_t);
                let reversed = reverse_cache.get_or_split(&*comm)?;
                let scanned = reversed.scan(ReduceOp::Min, local)?;
                let (ex_loc, mut recv_evt_t) = scanned.unpack();
                if event.bytes_sent() == 0 {
                    recv_evt_t = NO_PAYLOAD;
                }
                let bound = recv_evt_t - self.latency.latency(ex_loc, event.location(), Channel::Collective);
                self.push_bound(event.local_index(), bound);
            }
        }
        Ok(())
    }

    /// Local correction: for every receive in `violations`, redistributes
    /// the gap it absorbed backward over a bounded interval.
    ///
    /// Grounded in `Synchronizer::ba_amortize`'s local-correction loop.
    pub fn local_correction<E: EventRef>(&mut self, events: &mut [E], violations: &ViolationMap, first_evt_t: f64) {
        let mut my_send = self.tsa.len() as i64 - 1;
        for idx in 0..events.len() {
            let local_idx = events[idx].local_index();
            if let Some(internal_ts) = violations.get(local_idx) {
                let recv_s = events[idx].timestamp();
                let delta_r = recv_s - internal_ts;
                self.piecewise_interpolation(events, idx, internal_ts, delta_r, DEFAULT_SLOPE_CAP, my_send, first_evt_t);
            }
            if self.contributed.contains_key(&local_idx) {
                my_send -= 1;
            }
        }
    }

    /// `ba_piecewise_interpolation`: amortizes the interval `(t_l, event_rhs)`
    /// using a linear stretch, recursing leftward if a conflicting send is
    /// found with a steeper individual slope.
    #[allow(clippy::too_many_arguments)]
    fn piecewise_interpolation<E: EventRef>(
        &mut self,
        events: &mut [E],
        rhs_idx: usize,
        mut time_rhs: f64,
        delta_rhs: f64,
        slope_g1: f64,
        send_idx: i64,
        first_evt_t: f64,
    ) {
        let mut prec_send_idx = send_idx + 1;
        let mut m_left = time_rhs - delta_rhs / slope_g1;
        let mut m_slope = slope_g1;
        if m_left < first_evt_t {
            m_left = first_evt_t;
            m_slope = delta_rhs / (time_rhs - m_left);
        }
        let mut m_const = -m_slope * m_left;

        let mut found_send: Option<(usize, f64, f64, f64, i64)> = None;

        let mut i = rhs_idx;
        while i > 0 {
            i -= 1;
            if events[i].timestamp() <= m_left {
                break;
            }
            if self.contributed.contains_key(&events[i].local_index()) {
                let tsa_idx = prec_send_idx as usize;
                if tsa_idx < self.tsa.len() {
                    let delta_i = self.tsa[tsa_idx] - events[i].timestamp();
                    let slope_i = (delta_rhs - delta_i) / (time_rhs - events[i].timestamp());
                    if slope_i > m_slope {
                        m_slope = slope_i;
                        let const_send = delta_i - slope_i * events[i].timestamp();
                        found_send = Some((i, delta_i, slope_i, const_send, prec_send_idx));
                    }
                }
                prec_send_idx += 1;
            }
        }

        match found_send {
            None => {
                self.linear_amortize_from_time(events, m_left, rhs_idx, m_slope, m_const);
            }
            Some((send_i, delta_send, slope_send, const_send, index_send)) => {
                self.linear_amortize_between_events(events, send_i, rhs_idx, slope_send, const_send);
                time_rhs = events[send_i].timestamp() - delta_send;
                let new_slope = delta_send / (time_rhs - m_left);
                if delta_send > 0.0 {
                    self.piecewise_interpolation(events, send_i, time_rhs, delta_send, new_slope, index_send, first_evt_t);
                }
            }
        }
        let _ = m_const;
    }

    fn linear_amortize_between_events<E: EventRef>(
        &mut self,
        events: &mut [E],
        lhs_idx: usize,
        rhs_idx: usize,
        slope_g: f64,
        c_g: f64,
    ) {
        let mut i = rhs_idx;
        while i > lhs_idx {
            i -= 1;
            let ts = events[i].timestamp();
            events[i].set_timestamp(ts + slope_g * ts + c_g);
        }
        if self.max_slope < slope_g {
            self.max_slope = slope_g;
        }
    }

    fn linear_amortize_from_time<E: EventRef>(&mut self, events: &mut [E], time_lhs: f64, rhs_idx: usize, slope_g: f64, c_g: f64) {
        let mut i = rhs_idx;
        while i > 0 {
            i -= 1;
            if events[i].timestamp() <= time_lhs {
                break;
            }
            let ts = events[i].timestamp();
            events[i].set_timestamp(ts + slope_g * ts + c_g);
        }
    }
}
