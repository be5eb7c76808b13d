//! Collective classifier: maps a collective-end event to the exchange
//! pattern that drives both forward and backward amortization.
//!
//! Grounded in spec.md §4.8 and the dispatch actually performed in
//! `original_source/src/clc/Synchronizer.cpp`'s collective-end handler
//! (`isLogicalSend`/the per-kind branches querying `pearl::MpiComm`). The
//! trace's own collective-kind enumeration is represented here by
//! [`crate::event::CollectiveSubKind`] — this module only maps it to the
//! coarser pattern the amortization logic dispatches on.

use crate::event::CollectiveSubKind;

/// Exchange pattern driving the forward/backward handlers for a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectiveClass {
    Barrier,
    OneToN,
    NToOne,
    NToN,
    Prefix,
    /// alltoallv/alltoallw or a size-1 (self) communicator: the
    /// point-to-point structure is not recoverable from the trace, so the
    /// event is treated as internal.
    Opaque,
}

/// Classifies a collective-end event's sub-kind into its exchange pattern.
/// Exhaustive over the closed set of sub-kinds the trace model can report;
/// there is no "unknown" arm because every sub-kind the replay engine can
/// hand back is named here.
pub fn classify(sub_kind: CollectiveSubKind) -> CollectiveClass {
    match sub_kind {
        CollectiveSubKind::Barrier => CollectiveClass::Barrier,
        CollectiveSubKind::Broadcast | CollectiveSubKind::Scatter => CollectiveClass::OneToN,
        CollectiveSubKind::Gather | CollectiveSubKind::Reduce => CollectiveClass::NToOne,
        CollectiveSubKind::Allgather | CollectiveSubKind::Allreduce => CollectiveClass::NToN,
        CollectiveSubKind::Scan | CollectiveSubKind::Exscan => CollectiveClass::Prefix,
        CollectiveSubKind::Alltoallv | CollectiveSubKind::Alltoallw | CollectiveSubKind::SelfComm => {
            CollectiveClass::Opaque
        }
    }
}
