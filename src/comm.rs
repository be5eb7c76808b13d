// The core algorithm only ever needs three things from its transport: a
// point-to-point send/receive of an `AmortPayload`, a handful of collectives
// parameterized by a `ReduceOp`, and a way to get a rank-reversed view of a
// communicator for the backward pass's reverse-scan. Everything else (wire
// framing, connection setup, retry) is the host's problem, same as the
// teacher pulls `net::SendMessage`/`Udp`/`Tcp` out from under its protocol
// logic and depends only on the trait.
//
// The async send pool and the reverse-communicator cache live here rather
// than behind the trait because the component table places both inside the
// core: what's pluggable is the wire, not the bookkeeping around it.

use std::collections::HashMap;

use tracing::warn;

use crate::payload::{AmortPayload, ReduceOp};

/// Colour used to split a communicator into its rank-reversed twin.
/// Grounded in `Synchronizer::getReverseComm`'s hard-coded `42`; the value
/// itself is arbitrary, any single shared colour per pool works.
pub const REVERSE_COMM_COLOUR: i32 = 42;

/// A pending, not-yet-confirmed-delivered send. Opaque to this crate; the
/// host's `Communicator::isend` returns one and later resolves it in
/// `test_some`.
pub trait PendingSend {
    fn is_complete(&self) -> bool;
}

/// MPI-like communicator: point-to-point exchange plus the small set of
/// collectives the amortization handlers issue, parameterized over
/// [`ReduceOp`] so one call site covers both the max- and min-reductions the
/// forward and backward passes need.
pub trait Communicator {
    type Handle: PendingSend;

    fn id(&self) -> u32;
    fn size(&self) -> i32;
    /// This location's rank within the communicator.
    fn local_rank(&self) -> i32;

    fn send(&mut self, dest: i32, tag: i32, payload: AmortPayload) -> anyhow::Result<()>;
    /// Non-blocking send; the pool polls the returned handle for completion.
    fn isend(&mut self, dest: i32, tag: i32, payload: AmortPayload) -> anyhow::Result<Self::Handle>;
    fn recv(&mut self, source: i32, tag: i32) -> anyhow::Result<AmortPayload>;

    fn bcast(&mut self, root: i32, payload: AmortPayload) -> anyhow::Result<AmortPayload>;
    fn reduce(&mut self, root: i32, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload>;
    fn allreduce(&mut self, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload>;
    fn scan(&mut self, op: ReduceOp, payload: AmortPayload) -> anyhow::Result<AmortPayload>;

    /// Splits into a new communicator grouped by `colour`, ranked by `key`.
    /// Used to build the rank-reversed twin the backward pass's
    /// reverse-scan runs over.
    fn split(&self, colour: i32, key: i32) -> anyhow::Result<Self>
    where
        Self: Sized;
}

/// MPI_Testsome-style non-blocking send pool: tracks outstanding sends so
/// the forward pass doesn't block on delivery confirmation, and cancels
/// whatever is still outstanding at teardown.
///
/// Grounded in `Synchronizer::update_requests`/`delete_requests`.
#[derive(Default)]
pub struct AsyncMessagePool<H: PendingSend> {
    pending: Vec<H>,
}

impl<H: PendingSend> AsyncMessagePool<H> {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn post(&mut self, handle: H) {
        self.pending.push(handle);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// `update_requests`: drops whichever pending sends have completed.
    pub fn test_some(&mut self) {
        self.pending.retain(|h| !h.is_complete());
    }

    /// `delete_requests`: called at teardown. Anything still outstanding is
    /// a straggler; warn and drop it rather than block waiting for it.
    pub fn cancel_remaining(&mut self) {
        self.test_some();
        if !self.pending.is_empty() {
            warn!(
                count = self.pending.len(),
                "cancelling unreceived send operations at teardown"
            );
            self.pending.clear();
        }
    }
}

impl<H: PendingSend> Drop for AsyncMessagePool<H> {
    fn drop(&mut self) {
        self.cancel_remaining();
    }
}

/// Caches rank-reversed communicators by the id of the communicator they
/// were derived from, so the backward pass doesn't re-split on every prefix
/// collective it walks.
///
/// Grounded in `Synchronizer::getReverseComm`/`freeReverseComms`.
#[derive(Default)]
pub struct ReverseCommCache<C> {
    reversed: HashMap<u32, C>,
}

impl<C: Communicator> ReverseCommCache<C> {
    pub fn new() -> Self {
        Self {
            reversed: HashMap::new(),
        }
    }

    /// Returns the cached rank-reversed twin of `comm`, splitting and
    /// caching it on first use.
    pub fn get_or_split(&mut self, comm: &C) -> anyhow::Result<&mut C> {
        if !self.reversed.contains_key(&comm.id()) {
            let key = comm.size() - comm.local_rank() - 1;
            let reversed = comm.split(REVERSE_COMM_COLOUR, key)?;
            self.reversed.insert(comm.id(), reversed);
        }
        Ok(self.reversed.get_mut(&comm.id()).expect("just inserted"))
    }

    pub fn clear(&mut self) {
        self.reversed.clear();
    }
}

/// Shared-memory rendezvous within a process's thread team: the Rust
/// equivalent of the "three timestamp slots... under thread-team barriers"
/// the concurrency model describes. `SoloTeam` below is the trivial
/// single-threaded implementation for locations with no sibling threads.
pub trait ThreadTeam {
    fn barrier(&self);
    fn allreduce_max(&self, value: f64) -> f64;
    fn allreduce_min(&self, value: f64) -> f64;
    /// Master writes, all threads read after a barrier.
    fn publish(&self, value: f64);
    fn read_shared(&self) -> f64;
}

/// A thread team of size one: every operation is a trivial self-reduction.
#[derive(Debug, Default)]
pub struct SoloTeam {
    slot: std::cell::Cell<f64>,
}

impl ThreadTeam for SoloTeam {
    fn barrier(&self) {}

    fn allreduce_max(&self, value: f64) -> f64 {
        value
    }

    fn allreduce_min(&self, value: f64) -> f64 {
        value
    }

    fn publish(&self, value: f64) {
        self.slot.set(value);
    }

    fn read_shared(&self) -> f64 {
        self.slot.get()
    }
}
