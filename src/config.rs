//! Decoder configuration.
//!
//! [`ThriftConfig`] carries every knob the decoder recognizes, with the
//! defaults a bare deployment gets. Loading values from a file is the
//! host's concern; this module only defines the surface and validates the
//! enumerated options.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Thrift transport framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    /// Raw socket transport, no length prefix; message boundaries are
    /// inferred only by a full parse.
    #[default]
    Socket,
    /// Framed transport: each message is preceded by a 4-byte big-endian
    /// frame length.
    Framed,
}

impl FromStr for TransportType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "socket" => Ok(TransportType::Socket),
            "framed" => Ok(TransportType::Framed),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

/// Thrift protocol variant. Only the binary protocol is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolType {
    #[default]
    Binary,
}

impl FromStr for ProtocolType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(ProtocolType::Binary),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Configuration for the Thrift decoder.
#[derive(Debug, Clone)]
pub struct ThriftConfig {
    /// Max bytes of any rendered Thrift string before truncation+ellipsis.
    pub string_max_size: usize,
    /// Max elements rendered per list/set/map/struct before ellipsis.
    pub collection_max_size: usize,
    /// Struct field cap; exceeding it fails the flow.
    pub drop_after_n_struct_fields: usize,
    /// Transport framing on the wire.
    pub transport_type: TransportType,
    /// Protocol variant; `binary` is the only supported value.
    pub protocol_type: ProtocolType,
    /// If false, parse reply headers only and skip reply bodies.
    pub capture_reply: bool,
    /// If true, replace all non-empty string renderings with `"*"`.
    pub obfuscate_strings: bool,
    /// Include the raw request string in emitted events.
    pub send_request: bool,
    /// Include the raw response string in emitted events.
    pub send_response: bool,
    /// Maximum buffered bytes per stream direction before the flow is
    /// discarded.
    pub tcp_max_data_in_stream: usize,
    /// How long a request waits for its reply before being expired
    /// (microseconds).
    pub transaction_timeout_us: i64,
    /// Capacity of the bounded publish channel.
    pub publish_queue_size: usize,
    /// IDL file paths, consumed by the IDL collaborator (opaque here).
    pub idl_files: Vec<PathBuf>,
}

impl Default for ThriftConfig {
    fn default() -> Self {
        Self {
            string_max_size: 200,
            collection_max_size: 15,
            drop_after_n_struct_fields: 500,
            transport_type: TransportType::Socket,
            protocol_type: ProtocolType::Binary,
            capture_reply: true,
            obfuscate_strings: false,
            send_request: true,
            send_response: true,
            tcp_max_data_in_stream: 10 * 1024 * 1024, // 10 MiB per direction
            transaction_timeout_us: 10_000_000,       // 10 seconds
            publish_queue_size: 1000,
            idl_files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ThriftConfig::default();
        assert_eq!(cfg.string_max_size, 200);
        assert_eq!(cfg.collection_max_size, 15);
        assert_eq!(cfg.drop_after_n_struct_fields, 500);
        assert_eq!(cfg.transport_type, TransportType::Socket);
        assert_eq!(cfg.protocol_type, ProtocolType::Binary);
        assert!(cfg.capture_reply);
        assert!(!cfg.obfuscate_strings);
        assert_eq!(cfg.publish_queue_size, 1000);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("socket".parse(), Ok(TransportType::Socket));
        assert_eq!("framed".parse(), Ok(TransportType::Framed));
        assert!(matches!(
            "http".parse::<TransportType>(),
            Err(ConfigError::UnknownTransport(_))
        ));
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("binary".parse(), Ok(ProtocolType::Binary));
        // `compact` exists on the wire but is out of scope here.
        assert!(matches!(
            "compact".parse::<ProtocolType>(),
            Err(ConfigError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_protocol_parse_leaves_transport_alone() {
        let mut cfg = ThriftConfig::default();
        cfg.protocol_type = "binary".parse().unwrap();
        assert_eq!(cfg.transport_type, TransportType::Socket);
    }
}
