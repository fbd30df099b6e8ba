//! # thriftwatch
//!
//! Passive, streaming decoder for the Thrift RPC binary protocol.
//!
//! thriftwatch observes reassembled TCP byte streams between Thrift
//! clients and servers and emits structured request/reply transactions
//! for downstream telemetry. It never initiates or mutates traffic. The
//! upstream flow tracker feeds it segments tagged with a flow tuple and a
//! direction; completed transactions leave through a bounded channel
//! drained by a publisher worker.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use thriftwatch::{
//!     transaction_channel, EventSink, Publisher, StreamManager, ThriftConfig,
//!     ThriftEvent,
//! };
//!
//! struct StdoutSink;
//! impl EventSink for StdoutSink {
//!     fn publish(&mut self, event: ThriftEvent) {
//!         println!("{} {}", event.thrift.request.method, event.response_time_ms);
//!     }
//! }
//!
//! let cfg = ThriftConfig::default();
//! let (tx, rx) = transaction_channel(cfg.publish_queue_size);
//! let publisher = Publisher::new(rx, Box::new(StdoutSink), &cfg);
//! let worker = publisher.spawn().unwrap();
//!
//! let mut manager = StreamManager::new(cfg, tx);
//! // for each reassembled TCP segment:
//! // manager.process_segment(flow, Direction::Forward, payload, timestamp_us);
//! // manager.flow_fin(flow, direction) on teardown;
//! // manager.expire_transactions(now_us) on a timer tick.
//! # let _ = (worker, &mut manager);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                           thriftwatch                              |
//! +--------------------------------------------------------------------+
//! |  decode/     - resumable value/composite readers, rendering caps   |
//! |  stream/     - per-direction parser state machine, flow dispatch   |
//! |  correlate/  - request/reply pairing, one-way detection, expiry    |
//! |  publish/    - bounded channel, event construction, sink worker    |
//! |  flow/       - flow tuple, direction, endpoints, process names     |
//! |  idl/        - optional method-name metadata interface             |
//! |  config/     - recognized options and defaults                     |
//! |  error/      - error types                                         |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Decoding is single-threaded per flow: feed each flow tuple from one
//! thread at a time and no locks are needed. The bounded publish channel
//! is the only blocking point and applies natural backpressure when the
//! sink falls behind.

pub mod config;
pub mod correlate;
pub mod decode;
pub mod error;
pub mod flow;
pub mod idl;
pub mod message;
pub mod publish;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use config::{ProtocolType, ThriftConfig, TransportType};
pub use correlate::ThriftTransaction;
pub use decode::{Decoded, DecodeResult, ValueDecoder};
pub use error::{ConfigError, DecodeError, Error, Result};
pub use flow::{
    Direction, Endpoint, FlowTuple, NoProcessInfo, ProcessAttributor, ProcessPair,
};
pub use idl::{IdlMethod, IdlResolver, StaticIdl};
pub use message::{ThriftField, ThriftMessage};
pub use publish::{
    transaction_channel, EventSink, EventStatus, Publisher, ReplyRecord, RequestRecord,
    ThriftEvent, ThriftRecord,
};
pub use stream::{ParseProgress, StreamManager, ThriftStream};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
