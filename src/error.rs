//! Error types for thriftwatch.
//!
//! - [`enum@Error`] - Top-level error enum
//! - [`DecodeError`] - Structural errors from the binary-protocol decoder
//! - [`ConfigError`] - Errors from configuration values
//!
//! A [`DecodeError`] is never recoverable mid-stream: the dispatcher
//! reacts by discarding the buffered bytes for the affected flow
//! direction. Truncated input is not an error; decoders signal it with
//! [`Decoded::NeedMore`](crate::decode::Decoded).

use thiserror::Error;

/// Top-level error type for thriftwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Structural error while decoding a stream
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Structural errors from the binary-protocol decoder.
///
/// Any of these means the stream is desynchronized or hostile; the owning
/// flow direction must be dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A length prefix decoded to a negative value
    #[error("{what}: negative length {len}")]
    NegativeLength { what: &'static str, len: i32 },

    /// A type byte does not map to any known wire type
    #[error("field type {type_id} not known")]
    UnknownType { type_id: u8 },

    /// A struct ran past the configured field cap without a STOP marker
    #[error("struct has more than {max} fields, dropping as error")]
    StructTooLarge { max: usize },

    /// Nested containers/structs exceeded the depth limit
    #[error("value nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },
}

/// Errors from configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Unrecognized transport type name
    #[error("transport type `{0}` not known")]
    UnknownTransport(String),

    /// Unrecognized protocol type name
    #[error("protocol type `{0}` not known")]
    UnknownProtocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
