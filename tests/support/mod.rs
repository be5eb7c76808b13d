//! In-memory test doubles for `Communicator`/`ThreadTeam`/`EventRef`, built
//! the same way the teacher's own test modules fake out a transport: real
//! rendezvous over `Mutex`/`Condvar`, no actual network or MPI runtime.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Barrier, Condvar, Mutex};

use clc_sync::comm::{Communicator, PendingSend, ThreadTeam};
use clc_sync::event::{CollectiveSubKind, EventKind, EventRef, RegionRole};
use clc_sync::location::{Channel, Location};
use clc_sync::payload::{clc_reduce, AmortPayload, ReduceOp};

/// Installs a `tracing` subscriber for the duration of the test binary.
/// The library itself never does this (a lib has no business installing a
/// global subscriber) — it's the integration tests' stand-in for the
/// teacher's own `bench-clock`, which calls `tracing_subscriber::fmt::init()`
/// from its binary entry point. Safe to call from every test; only the
/// first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

// ---------------------------------------------------------------------
// EventRef test double
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventData {
    pub kind: Option<EventKind>,
    pub ts: f64,
    pub location: Location,
    pub peer_rank: Option<i32>,
    pub tag: Option<i32>,
    pub comm_id: Option<u32>,
    pub root: Option<i32>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub sub_kind: Option<CollectiveSubKind>,
    pub region_role: RegionRole,
    pub thread_team: Option<u32>,
    pub channel: Channel,
    /// Index of the matching enter/leave/begin/end event in the same trace.
    pub pair_idx: Option<usize>,
}

impl Default for EventData {
    fn default() -> Self {
        Self {
            kind: None,
            ts: 0.0,
            location: Location::new(0, 0, 0, 0),
            peer_rank: None,
            tag: None,
            comm_id: None,
            root: None,
            bytes_sent: 0,
            bytes_received: 0,
            sub_kind: None,
            region_role: RegionRole::Ordinary,
            thread_team: None,
            channel: Channel::PointToPoint,
            pair_idx: None,
        }
    }
}

/// A single location's local trace: a flat, shared, mutable event list.
/// `FakeEvent` is a handle (index + shared list) rather than an owned
/// record, so `set_timestamp` through one handle is visible through every
/// other handle into the same trace, matching how the real replay engine's
/// event reference works.
#[derive(Clone)]
pub struct FakeEvent {
    trace: Rc<RefCell<Vec<EventData>>>,
    idx: usize,
}

pub struct FakeTrace {
    data: Rc<RefCell<Vec<EventData>>>,
}

impl FakeTrace {
    pub fn new(events: Vec<EventData>) -> Self {
        Self {
            data: Rc::new(RefCell::new(events)),
        }
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        (0..self.data.borrow().len())
            .map(|idx| FakeEvent {
                trace: self.data.clone(),
                idx,
            })
            .collect()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.data.borrow().iter().map(|e| e.ts).collect()
    }
}

impl EventRef for FakeEvent {
    fn location(&self) -> Location {
        self.trace.borrow()[self.idx].location
    }
    fn local_index(&self) -> u64 {
        self.idx as u64
    }
    fn kind(&self) -> EventKind {
        self.trace.borrow()[self.idx].kind.expect("event kind must be set")
    }
    fn timestamp(&self) -> f64 {
        self.trace.borrow()[self.idx].ts
    }
    fn set_timestamp(&mut self, ts: f64) {
        self.trace.borrow_mut()[self.idx].ts = ts;
    }
    fn peer_rank(&self) -> Option<i32> {
        self.trace.borrow()[self.idx].peer_rank
    }
    fn tag(&self) -> Option<i32> {
        self.trace.borrow()[self.idx].tag
    }
    fn comm_id(&self) -> Option<u32> {
        self.trace.borrow()[self.idx].comm_id
    }
    fn root(&self) -> Option<i32> {
        self.trace.borrow()[self.idx].root
    }
    fn bytes_sent(&self) -> u64 {
        self.trace.borrow()[self.idx].bytes_sent
    }
    fn bytes_received(&self) -> u64 {
        self.trace.borrow()[self.idx].bytes_received
    }
    fn collective_sub_kind(&self) -> Option<CollectiveSubKind> {
        self.trace.borrow()[self.idx].sub_kind
    }
    fn region_role(&self) -> RegionRole {
        self.trace.borrow()[self.idx].region_role
    }
    fn thread_team(&self) -> Option<u32> {
        self.trace.borrow()[self.idx].thread_team
    }
    fn channel(&self) -> Channel {
        self.trace.borrow()[self.idx].channel
    }
    fn enter(&self) -> Option<Self> {
        self.paired()
    }
    fn leave(&self) -> Option<Self> {
        self.paired()
    }
    fn begin(&self) -> Option<Self> {
        self.paired()
    }
    fn end(&self) -> Option<Self> {
        self.paired()
    }
    fn prev(&self) -> Option<Self> {
        if self.idx == 0 {
            None
        } else {
            Some(Self {
                trace: self.trace.clone(),
                idx: self.idx - 1,
            })
        }
    }
    fn next(&self) -> Option<Self> {
        if self.idx + 1 < self.trace.borrow().len() {
            Some(Self {
                trace: self.trace.clone(),
                idx: self.idx + 1,
            })
        } else {
            None
        }
    }
}

impl FakeEvent {
    fn paired(&self) -> Option<Self> {
        self.trace.borrow()[self.idx].pair_idx.map(|idx| Self {
            trace: self.trace.clone(),
            idx,
        })
    }
}

// ---------------------------------------------------------------------
// Communicator test double: a shared rendezvous point reached by real
// OS threads, one per rank.
// ---------------------------------------------------------------------

enum CollOp {
    Bcast(i32),
    Reduce(i32, ReduceOp),
    Allreduce(ReduceOp),
    Scan(ReduceOp),
}

struct CollRound {
    size: usize,
    slots: Vec<Option<AmortPayload>>,
    arrived: usize,
    results: Vec<Option<AmortPayload>>,
    departed: usize,
    generation: u64,
}

impl CollRound {
    fn new(size: usize) -> Self {
        Self {
            size,
            slots: vec![None; size],
            arrived: 0,
            results: vec![None; size],
            departed: 0,
            generation: 0,
        }
    }
}

fn compute_results(op: &CollOp, slots: &[AmortPayload]) -> Vec<AmortPayload> {
    let size = slots.len();
    match op {
        CollOp::Bcast(root) => vec![slots[*root as usize]; size],
        CollOp::Reduce(root, rop) => {
            let folded = slots.iter().copied().reduce(|a, b| clc_reduce(*rop, a, b)).unwrap();
            let mut v = vec![folded; size];
            v[*root as usize] = folded;
            v
        }
        CollOp::Allreduce(rop) => {
            let folded = slots.iter().copied().reduce(|a, b| clc_reduce(*rop, a, b)).unwrap();
            vec![folded; size]
        }
        CollOp::Scan(rop) => {
            let mut out = Vec::with_capacity(size);
            let mut acc = slots[0];
            out.push(acc);
            for item in &slots[1..] {
                acc = clc_reduce(*rop, acc, *item);
                out.push(acc);
            }
            out
        }
    }
}

pub struct World {
    mail: Mutex<HashMap<(u32, i32, i32, i32), VecDeque<AmortPayload>>>,
    mail_cv: Condvar,
    colls: Mutex<HashMap<u32, CollRound>>,
    coll_cv: Condvar,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mail: Mutex::new(HashMap::new()),
            mail_cv: Condvar::new(),
            colls: Mutex::new(HashMap::new()),
            coll_cv: Condvar::new(),
        })
    }
}

#[derive(Clone, Copy)]
pub struct TestHandle;
impl PendingSend for TestHandle {
    fn is_complete(&self) -> bool {
        true
    }
}

pub struct TestComm {
    world: Arc<World>,
    id: u32,
    rank: i32,
    size: i32,
}

impl TestComm {
    pub fn new(world: Arc<World>, id: u32, rank: i32, size: i32) -> Self {
        Self { world, id, rank, size }
    }

    fn collective_call(&self, op: CollOp, payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        let mut colls = self.world.colls.lock().unwrap();
        let round = colls.entry(self.id).or_insert_with(|| CollRound::new(self.size as usize));
        let my_gen = round.generation;
        round.slots[self.rank as usize] = Some(payload);
        round.arrived += 1;
        if round.arrived == self.size as usize {
            let slots: Vec<AmortPayload> = round.slots.iter().map(|s| s.unwrap()).collect();
            round.results = compute_results(&op, &slots).into_iter().map(Some).collect();
            round.arrived = 0;
            round.slots = vec![None; self.size as usize];
            round.generation += 1;
            self.world.coll_cv.notify_all();
        } else {
            let (guard, _) = self
                .world
                .coll_cv
                .wait_timeout_while(colls, std::time::Duration::from_secs(10), |c| {
                    c.get(&self.id).map(|r| r.generation == my_gen).unwrap_or(false)
                })
                .unwrap();
            colls = guard;
        }
        let round = colls.get_mut(&self.id).unwrap();
        let result = round.results[self.rank as usize].take().expect("collective result ready");
        round.departed += 1;
        if round.departed == self.size as usize {
            round.departed = 0;
        }
        Ok(result)
    }
}

impl Communicator for TestComm {
    type Handle = TestHandle;

    fn id(&self) -> u32 {
        self.id
    }
    fn size(&self) -> i32 {
        self.size
    }
    fn local_rank(&self) -> i32 {
        self.rank
    }

    fn send(&mut self, dest: i32, tag: i32, payload: AmortPayload) -> anyhow::Result<()> {
        let mut mail = self.world.mail.lock().unwrap();
        mail.entry((self.id, self.rank, dest, tag)).or_default().push_back(payload);
        self.world.mail_cv.notify_all();
        Ok(())
    }

    fn isend(&mut self, dest: i32, tag: i32, payload: AmortPayload) -> anyhow::Result<Self::Handle> {
        self.send(dest, tag, payload)?;
        Ok(TestHandle)
    }

    fn recv(&mut self, source: i32, tag: i32) -> anyhow::Result<AmortPayload> {
        let mut mail = self.world.mail.lock().unwrap();
        loop {
            if let Some(queue) = mail.get_mut(&(self.id, source, self.rank, tag)) {
                if let Some(payload) = queue.pop_front() {
                    return Ok(payload);
                }
            }
            mail = self.world.mail_cv.wait(mail).unwrap();
        }
    }

    fn bcast(&mut self, root: i32, payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        self.collective_call(CollOp::Bcast(root), payload)
    }

    fn reduce(&mut self, root: i32, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        self.collective_call(CollOp::Reduce(root, op), payload)
    }

    fn allreduce(&mut self, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        self.collective_call(CollOp::Allreduce(op), payload)
    }

    fn scan(&mut self, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        self.collective_call(CollOp::Scan(op), payload)
    }

    fn split(&self, colour: i32, key: i32) -> anyhow::Result<Self> {
        let new_id = self.id.wrapping_mul(2_654_435_761).wrapping_add(colour as u32);
        Ok(Self {
            world: self.world.clone(),
            id: new_id,
            rank: key,
            size: self.size,
        })
    }
}

// ---------------------------------------------------------------------
// ThreadTeam test double, same rendezvous shape as `TestComm` but for
// shared-memory fork/join across sibling OS threads of one location.
// ---------------------------------------------------------------------

struct ReduceRound {
    n: usize,
    acc: f64,
    arrived: usize,
    result: f64,
    generation: u64,
}

pub struct TeamWorld {
    barrier: Barrier,
    shared: Mutex<f64>,
    max_round: Mutex<ReduceRound>,
    min_round: Mutex<ReduceRound>,
    cv: Condvar,
}

impl TeamWorld {
    pub fn new(n: usize) -> Arc<Self> {
        Arc::new(Self {
            barrier: Barrier::new(n),
            shared: Mutex::new(0.0),
            max_round: Mutex::new(ReduceRound {
                n,
                acc: f64::MIN,
                arrived: 0,
                result: 0.0,
                generation: 0,
            }),
            min_round: Mutex::new(ReduceRound {
                n,
                acc: f64::MAX,
                arrived: 0,
                result: 0.0,
                generation: 0,
            }),
            cv: Condvar::new(),
        })
    }

    fn reduce(&self, round: &Mutex<ReduceRound>, value: f64, combine: fn(f64, f64) -> f64, init: f64) -> f64 {
        let mut g = round.lock().unwrap();
        let my_gen = g.generation;
        g.acc = combine(g.acc, value);
        g.arrived += 1;
        if g.arrived == g.n {
            g.result = g.acc;
            g.acc = init;
            g.arrived = 0;
            g.generation += 1;
            self.cv.notify_all();
        } else {
            g = self.cv.wait_while(g, |s| s.generation == my_gen).unwrap();
        }
        g.result
    }
}

pub struct TestTeam {
    world: Arc<TeamWorld>,
}

impl TestTeam {
    pub fn new(world: Arc<TeamWorld>) -> Self {
        Self { world }
    }
}

impl ThreadTeam for TestTeam {
    fn barrier(&self) {
        self.world.barrier.wait();
    }
    fn allreduce_max(&self, value: f64) -> f64 {
        self.world.reduce(&self.world.max_round, value, f64::max, f64::MIN)
    }
    fn allreduce_min(&self, value: f64) -> f64 {
        self.world.reduce(&self.world.min_round, value, f64::min, f64::MAX)
    }
    fn publish(&self, value: f64) {
        *self.world.shared.lock().unwrap() = value;
    }
    fn read_shared(&self) -> f64 {
        *self.world.shared.lock().unwrap()
    }
}

// ---------------------------------------------------------------------
// A `Communicator`/`ThreadTeam` pair that is never actually invoked: for
// traces made only of internal/OpenMP events the dispatcher never reaches
// the branches that would call into them, but the generic bounds still
// need something to name.
// ---------------------------------------------------------------------

pub struct NullComm;

impl Communicator for NullComm {
    type Handle = TestHandle;
    fn id(&self) -> u32 {
        0
    }
    fn size(&self) -> i32 {
        1
    }
    fn local_rank(&self) -> i32 {
        0
    }
    fn send(&mut self, _dest: i32, _tag: i32, _payload: AmortPayload) -> anyhow::Result<()> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn isend(&mut self, _dest: i32, _tag: i32, _payload: AmortPayload) -> anyhow::Result<Self::Handle> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn recv(&mut self, _source: i32, _tag: i32) -> anyhow::Result<AmortPayload> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn bcast(&mut self, _root: i32, _payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn reduce(&mut self, _root: i32, _op: ReduceOp, _payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn allreduce(&mut self, _op: ReduceOp, _payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn scan(&mut self, _op: ReduceOp, _payload: AmortPayload) -> anyhow::Result<AmortPayload> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
    fn split(&self, _colour: i32, _key: i32) -> anyhow::Result<Self> {
        unreachable!("NullComm is never called by an internal-only trace")
    }
}
