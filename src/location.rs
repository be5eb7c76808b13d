//! Physical endpoint coordinates and the channel classification derived from them.

use serde::{Deserialize, Serialize};

/// A `(machine, node, process, thread)` coordinate identifying a physical
/// endpoint. Compared componentwise to classify a communication as
/// shared-memory, intra-node, inter-node, or inter-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub machine: i32,
    pub node: i32,
    pub process: i32,
    pub thread: i32,
}

impl Location {
    pub const fn new(machine: i32, node: i32, process: i32, thread: i32) -> Self {
        Self {
            machine,
            node,
            process,
            thread,
        }
    }

    pub fn same_machine(&self, other: &Self) -> bool {
        self.machine == other.machine
    }

    pub fn same_node(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

/// Selects which latency term applies to a communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    PointToPoint,
    Collective,
    SharedMemory,
}
