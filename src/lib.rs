//! Postmortem timestamp synchronizer for parallel-application event traces.
//!
//! Implements the Extended Controlled Logical Clock (ECLC): a forward
//! amortization pass that propagates clock corrections along causal edges,
//! followed by a conditional backward amortization pass that redistributes
//! the corrections introduced by clock-condition violations. See
//! [`orchestrator::Orchestrator`] for the entry point.

pub mod backward;
pub mod clock;
pub mod collective;
pub mod comm;
pub mod error;
pub mod event;
pub mod forward;
pub mod latency;
pub mod location;
pub mod orchestrator;
pub mod pass;
pub mod payload;
pub mod stats;
pub mod violation;

pub use event::{CollectiveSubKind, EventKind, EventRef, RegionRole};
pub use location::{Channel, Location};
pub use orchestrator::{Orchestrator, SynchronizerConfig};
