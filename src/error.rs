//! Crate-local error marker distinguishing "the trace is broken" from an
//! ordinary transport failure, so callers can match on it the way the
//! rust-embedded-itm sibling example distinguishes its own decode errors
//! from I/O errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedTrace {
    #[error("unreachable collective sub-kind reached the classifier: {0:?}")]
    UnreachableCollective(crate::event::CollectiveSubKind),

    #[error("collective-end event carries no collective sub-kind")]
    MissingCollectiveSubKind,

    #[error("point-to-point event carries no peer rank")]
    MissingPeerRank,

    #[error("event carries no communicator id")]
    MissingCommId,
}
