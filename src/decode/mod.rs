//! Resumable decoders for the Thrift binary protocol.
//!
//! Every reader consumes a prefix of a byte slice and reports one of three
//! outcomes: the value with its consumed length, "need more bytes", or a
//! structural error. Readers never block and never consume past the slice;
//! the stream parser calls them again once more data has been buffered.
//!
//! ## Components
//!
//! - [`value`] - primitive readers (bool, byte, double, i16/i32/i64,
//!   string)
//! - [`composite`] - list/set/map/struct readers with size caps and
//!   rendering truncation

mod composite;
mod value;

pub(crate) use composite::format_struct;
pub use value::ValueDecoder;

use crate::error::DecodeError;

/// Thrift wire-type ids (binary protocol).
pub const TYPE_STOP: u8 = 0;
pub const TYPE_BOOL: u8 = 2;
pub const TYPE_BYTE: u8 = 3;
pub const TYPE_DOUBLE: u8 = 4;
pub const TYPE_I16: u8 = 6;
pub const TYPE_I32: u8 = 8;
pub const TYPE_I64: u8 = 10;
pub const TYPE_STRING: u8 = 11;
pub const TYPE_STRUCT: u8 = 12;
pub const TYPE_MAP: u8 = 13;
pub const TYPE_SET: u8 = 14;
pub const TYPE_LIST: u8 = 15;

/// Containers and structs deeper than this are treated as structural
/// errors rather than recursed into.
pub const MAX_NESTING_DEPTH: usize = 10;

/// Outcome of one resumable decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The value was fully decoded from the first `consumed` bytes.
    Complete { value: T, consumed: usize },
    /// The slice holds only a prefix of the value; retry with more bytes.
    NeedMore,
}

impl<T> Decoded<T> {
    /// The decoded value, if complete.
    pub fn value(self) -> Option<T> {
        match self {
            Decoded::Complete { value, .. } => Some(value),
            Decoded::NeedMore => None,
        }
    }
}

/// Result of one decode step: complete, suspended, or structurally invalid
/// (the flow must be dropped).
pub type DecodeResult<T> = Result<Decoded<T>, DecodeError>;
