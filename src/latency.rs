//! Minimum one-way latency between two locations on a given channel.
//!
//! Grounded in `original_source/src/clc/Latency.{h,cpp}`: six scalar
//! parameters, defaulted to the values the source constructs its
//! `Synchronizer` with. The FIXME in the source asking for these to become
//! configuration is resolved here by taking them as constructor input
//! (see DESIGN.md, Open Question).

use crate::location::{Channel, Location};

/// Six latency parameters, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyModel {
    pub machine_hop: f64,
    pub p2p_intra_node: f64,
    pub p2p_inter_node: f64,
    pub coll_intra_node: f64,
    pub coll_inter_node: f64,
    pub shared_memory: f64,
}

impl Default for LatencyModel {
    /// Matches the values `Synchronizer::Synchronizer` constructs its
    /// `Latency` with: `Latency(0.0, 1.0e-6, 1.0e-6, 1.0e-6, 1.0e-6, 0.01e-6)`.
    fn default() -> Self {
        Self {
            machine_hop: 0.0,
            p2p_intra_node: 1.0e-6,
            p2p_inter_node: 1.0e-6,
            coll_intra_node: 1.0e-6,
            coll_inter_node: 1.0e-6,
            shared_memory: 0.01e-6,
        }
    }
}

impl LatencyModel {
    /// `latency(src, dst, channel)`. `dst` is `self`'s location in the
    /// distance calculation below (the receiving side asks "how far is the
    /// sender from me").
    pub fn latency(&self, from: Location, to: Location, channel: Channel) -> f64 {
        if channel == Channel::SharedMemory {
            return self.shared_memory;
        }

        let mut lat = 0.0;
        if !from.same_machine(&to) {
            lat += self.machine_hop;
        }
        match channel {
            Channel::PointToPoint => {
                lat += if from.same_node(&to) {
                    self.p2p_intra_node
                } else {
                    self.p2p_inter_node
                };
            }
            Channel::Collective => {
                lat += if from.same_node(&to) {
                    self.coll_intra_node
                } else {
                    self.coll_inter_node
                };
            }
            Channel::SharedMemory => unreachable!("handled above"),
        }
        lat
    }
}
