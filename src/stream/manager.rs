//! Flow dispatch: per-direction stream state and segment ingest.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::config::ThriftConfig;
use crate::correlate::{Correlator, ThriftTransaction};
use crate::flow::{Direction, FlowTuple, ProcessAttributor};
use crate::idl::IdlResolver;
use crate::message::ThriftMessage;

use super::parser::{MessageParser, ParseProgress, ThriftStream};

/// Central entry point of the decoder.
///
/// Owns the per-(flow, direction) stream table and the transaction
/// correlator. The upstream TCP tracker feeds it reassembled segments and
/// FIN notifications; completed transactions leave through the publish
/// channel handed to [`StreamManager::new`].
///
/// Single-threaded by design: each flow tuple must be fed from one thread
/// at a time, so stream and transaction state need no locks. Shard by flow
/// hash to scale out.
pub struct StreamManager {
    cfg: ThriftConfig,
    streams: HashMap<(FlowTuple, Direction), ThriftStream>,
    correlator: Correlator,
    idl: Option<Box<dyn IdlResolver>>,
    processes: Option<Box<dyn ProcessAttributor>>,
}

impl StreamManager {
    pub fn new(cfg: ThriftConfig, publish: Sender<ThriftTransaction>) -> Self {
        let correlator = Correlator::new(publish, cfg.transaction_timeout_us);
        Self {
            cfg,
            streams: HashMap::new(),
            correlator,
            idl: None,
            processes: None,
        }
    }

    /// Attach an IDL resolver; renderings then use parameter/exception
    /// names instead of numeric field ids.
    pub fn with_idl(mut self, idl: impl IdlResolver + 'static) -> Self {
        self.idl = Some(Box::new(idl));
        self
    }

    /// Attach a process attributor for endpoint process names.
    pub fn with_process_attributor(mut self, attributor: impl ProcessAttributor + 'static) -> Self {
        self.processes = Some(Box::new(attributor));
        self
    }

    pub fn config(&self) -> &ThriftConfig {
        &self.cfg
    }

    /// Number of live per-direction streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_transactions(&self) -> usize {
        self.correlator.len()
    }

    /// Feed one reassembled segment.
    ///
    /// Any fault inside decoding is trapped here and converted to a flow
    /// drop; one hostile flow must not tear down the dispatcher.
    pub fn process_segment(
        &mut self,
        flow: FlowTuple,
        direction: Direction,
        payload: &[u8],
        timestamp_us: i64,
    ) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.ingest(flow, direction, payload, timestamp_us)
        }));
        if outcome.is_err() {
            warn!(?flow, direction = direction.as_str(), "decoder fault, dropping stream");
            self.streams.remove(&(flow, direction));
        }
    }

    /// The flow tracker saw a FIN/teardown for this direction. A request
    /// still pending on the flow is published as presumed one-way.
    pub fn flow_fin(&mut self, flow: FlowTuple, direction: Direction) {
        self.streams.remove(&(flow, direction));
        self.correlator.on_fin(&flow);
    }

    /// Sweep pending transactions whose reply never arrived within the
    /// configured timeout. Returns how many were dropped. The host ticks
    /// this with its clock; `now_us` compares against request timestamps.
    pub fn expire_transactions(&mut self, now_us: i64) -> usize {
        self.correlator.expire(now_us)
    }

    fn ingest(&mut self, flow: FlowTuple, direction: Direction, payload: &[u8], timestamp_us: i64) {
        let key = (flow, direction);
        match self.streams.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(ThriftStream::new(payload.to_vec()));
            }
            Entry::Occupied(mut entry) => {
                let stream = entry.get_mut();
                if stream.skip_input {
                    // stream currently suspended in this direction
                    return;
                }
                stream.buf.extend_from_slice(payload);
                if stream.buf.len() > self.cfg.tcp_max_data_in_stream {
                    debug!(?flow, "stream data too large, dropping tcp stream");
                    entry.remove();
                    return;
                }
            }
        }

        self.drive(flow, direction, timestamp_us);
    }

    /// Run the parser until it suspends, completing any number of messages.
    fn drive(&mut self, flow: FlowTuple, direction: Direction, timestamp_us: i64) {
        let key = (flow, direction);
        loop {
            let Some(stream) = self.streams.get_mut(&key) else {
                return;
            };
            if stream.buf.is_empty() {
                return;
            }
            if stream.message.is_none() {
                stream.message = Some(ThriftMessage::new(timestamp_us));
            }

            let parser = MessageParser::new(&self.cfg);
            match parser.parse(stream, self.idl.as_deref()) {
                Err(err) => {
                    // drop this stream; a later segment may resynchronize
                    debug!(%err, ?flow, "ignoring thrift message, dropping tcp stream");
                    self.streams.remove(&key);
                    return;
                }
                Ok(ParseProgress::NeedMore) => return,
                Ok(ParseProgress::Complete) => self.complete_message(flow, direction),
            }
        }
    }

    fn complete_message(&mut self, flow: FlowTuple, direction: Direction) {
        let key = (flow, direction);
        let Some(stream) = self.streams.get_mut(&key) else {
            return;
        };
        let mut msg = stream
            .message
            .take()
            .expect("parser completed with a message");
        let parse_offset = stream.parse_offset;

        let mut flush = false;
        if msg.is_request {
            debug!(method = %msg.method, "thrift request message");
            if !self.cfg.capture_reply {
                // re-enable the reverse direction so the reply header can
                // still be observed
                if let Some(reverse) = self.streams.get_mut(&(flow, direction.reversed())) {
                    reverse.skip_input = false;
                }
            }
        } else {
            debug!(method = %msg.method, "thrift response message");
            if !self.cfg.capture_reply {
                if let Some(stream) = self.streams.get_mut(&key) {
                    stream.skip_input = true;
                }
                flush = true;
            }
        }

        msg.flow = flow;
        msg.direction = direction;
        if let Some(attributor) = &self.processes {
            msg.processes = attributor.find_processes(&flow);
        }
        if msg.frame_size == 0 {
            msg.frame_size = (parse_offset - msg.start) as u32;
        }

        self.correlator.on_message(msg);

        if let Some(stream) = self.streams.get_mut(&key) {
            stream.prepare_for_new_message(flush);
        }
    }
}
