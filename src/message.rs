//! Decoded message and field model.

use std::fmt;

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::flow::{Direction, FlowTuple, ProcessPair};

/// Thrift message types, as carried in the header's low byte.
pub const MSG_TYPE_CALL: u32 = 1;
pub const MSG_TYPE_REPLY: u32 = 2;
pub const MSG_TYPE_EXCEPTION: u32 = 3;
pub const MSG_TYPE_ONEWAY: u32 = 4;

/// One field of a struct payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThriftField {
    pub type_id: u8,
    pub id: u16,
    pub value: CompactString,
}

/// One decoded Thrift call or reply.
///
/// Built incrementally by the stream parser; only fully finalized messages
/// (header through the terminating STOP field) ever leave it. The flow
/// tuple, direction, and process pair are filled in by the dispatcher on
/// completion.
#[derive(Debug, Clone, Default)]
pub struct ThriftMessage {
    /// Capture timestamp of the first segment of this message
    /// (epoch microseconds).
    pub timestamp_us: i64,
    pub flow: FlowTuple,
    pub direction: Direction,

    pub is_request: bool,
    pub has_exception: bool,
    /// Masked version word from a strict header; 0 in no-version mode.
    pub version: u32,
    /// Raw message type from the wire (1=call, 2=reply, 3=exception,
    /// 4=oneway).
    pub msg_type: u32,
    pub method: CompactString,
    pub seq_id: u32,
    /// Formatted argument struct, requests only.
    pub params: String,
    /// Formatted return value (reply field id 0), replies only.
    pub return_value: String,
    /// Formatted exception fields, replies only.
    pub exceptions: String,
    /// Bytes the message occupied on the wire. Read from the frame header
    /// on the framed transport, synthesized from the parse offsets
    /// otherwise.
    pub frame_size: u32,
    /// Owning service name, when the IDL resolver knows the method.
    pub service: CompactString,
    pub processes: ProcessPair,

    /// Parse offset at which this message started.
    pub(crate) start: usize,
    pub(crate) fields: SmallVec<[ThriftField; 4]>,
}

impl ThriftMessage {
    pub(crate) fn new(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            ..Default::default()
        }
    }
}

impl fmt::Display for ThriftMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "is_request: {} type: {} method: {} seq_id: {} params: {} \
             return_value: {} exceptions: {}",
            self.is_request,
            self.msg_type,
            self.method,
            self.seq_id,
            self.params,
            self.return_value,
            self.exceptions
        )
    }
}
