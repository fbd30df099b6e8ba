//! Flow identification and endpoint model.
//!
//! The upstream TCP tracker hands us segments tagged with a [`FlowTuple`]
//! and a [`Direction`]. The tuple keeps the orientation it had at first
//! observation; `Direction::Reverse` marks traffic flowing against it.

use std::net::{IpAddr, Ipv4Addr};

use compact_str::CompactString;

/// The 4-tuple identifying a TCP flow, plus a disambiguating id assigned
/// by the flow tracker (ports get reused; the id keeps successive flows on
/// the same tuple apart).
///
/// Hashable and `Copy`; used directly as the transaction-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowTuple {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub id: u64,
}

impl FlowTuple {
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16, id: u64) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            id,
        }
    }
}

impl Default for FlowTuple {
    fn default() -> Self {
        Self {
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_port: 0,
            id: 0,
        }
    }
}

/// Direction of a segment relative to the flow tuple's orientation at
/// first observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// Return a string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// One side of a transaction: address, port, and the owning process name
/// when attribution is available.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
    pub process: CompactString,
}

/// Process names for both ends of a flow, as resolved by the host's
/// process attributor. Empty strings when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessPair {
    pub src: CompactString,
    pub dst: CompactString,
}

/// Resolves which local processes own the sockets of a flow.
///
/// Consulted once per completed message. Implementations live outside the
/// decoder (procfs scraping, eBPF, a static map, ...).
pub trait ProcessAttributor {
    fn find_processes(&self, flow: &FlowTuple) -> ProcessPair;
}

/// Attributor that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessInfo;

impl ProcessAttributor for NoProcessInfo {
    fn find_processes(&self, _flow: &FlowTuple) -> ProcessPair {
        ProcessPair::default()
    }
}
