//! Wire payloads exchanged between locations, and the user-defined
//! reductions defined over them.
//!
//! Grounded in `original_source/src/clc/AmortData.{h,cpp}` (the
//! `amortization_data` struct and `pack_data`/`unpack_data`) and
//! `original_source/src/clc/Operator.cpp` (`clc_max`/`clc_min`). The teacher's
//! wire-message convention (`serde`-derived structs, `bincode` on the wire,
//! see `crate::net::{serialize, deserialize}` style helpers) is reused here.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Fixed-size record exchanged over the wire: four 32-bit coordinates plus a
/// 64-bit timestamp. `bincode`'s fixed-int encoding lays this out as the
/// 24-byte struct spec.md §6 describes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmortPayload {
    pub loc: Location,
    pub timestamp: f64,
}

impl AmortPayload {
    pub fn pack(loc: Location, timestamp: f64) -> Self {
        Self { loc, timestamp }
    }

    pub fn unpack(self) -> (Location, f64) {
        (self.loc, self.timestamp)
    }

    pub fn to_bytes(self) -> Vec<u8> {
        bincode::serialize(&self).expect("AmortPayload is a plain fixed-size struct")
    }

    pub fn from_bytes(buf: &[u8]) -> anyhow::Result<Self> {
        Ok(bincode::deserialize(buf)?)
    }
}

/// Reduction kind applied to an [`AmortPayload`] or [`StatPayload`] during a
/// collective exchange. Ties carry the left (incoming) operand's location,
/// matching "ties carry the incoming (left) operand's location" in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
    Min,
}

/// CLC-max / CLC-min: picks the extremum timestamp and carries that
/// element's location.
pub fn clc_reduce(op: ReduceOp, lhs: AmortPayload, rhs: AmortPayload) -> AmortPayload {
    let keep_lhs = match op {
        ReduceOp::Max => lhs.timestamp >= rhs.timestamp,
        ReduceOp::Min => lhs.timestamp <= rhs.timestamp,
    };
    if keep_lhs {
        lhs
    } else {
        rhs
    }
}

/// Statistics payload reduced across locations when `Orchestrator`
/// aggregates the final report (see `original_source/src/clc/StatData.h` and
/// `Operator.cpp`'s `stat_rel_max`/`stat_abs_max`/`stat_rel_min`/`stat_abs_min`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatPayload {
    pub rel: f64,
    pub abs: f64,
    pub org: f64,
    pub syn: f64,
}

pub fn stat_reduce(op: ReduceOp, lhs: StatPayload, rhs: StatPayload) -> StatPayload {
    let keep_lhs = match op {
        ReduceOp::Max => lhs.abs >= rhs.abs,
        ReduceOp::Min => lhs.abs <= rhs.abs,
    };
    if keep_lhs {
        lhs
    } else {
        rhs
    }
}
