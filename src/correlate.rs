//! Request/reply correlation.
//!
//! One pending transaction per flow tuple: a request opens it, the
//! matching reply (same method name, reverse direction) closes and
//! publishes it. Requests superseded by a newer request, or left pending
//! at flow teardown, are published as presumed one-way calls. Requests
//! whose reply never arrives within the timeout are swept away
//! unpublished.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::flow::{Direction, Endpoint, FlowTuple};
use crate::message::ThriftMessage;

/// A correlated request/reply pair.
#[derive(Debug, Clone)]
pub struct ThriftTransaction {
    pub flow: FlowTuple,
    pub src: Endpoint,
    pub dst: Endpoint,
    /// Request capture timestamp (epoch microseconds).
    pub request_ts_us: i64,
    /// Reply latency in milliseconds; 0 when no reply was seen.
    pub response_time_ms: i32,
    pub request: ThriftMessage,
    /// Absent for one-way and orphaned requests.
    pub reply: Option<ThriftMessage>,
    /// When this transaction expires if no reply arrives.
    pub(crate) deadline_us: i64,
}

/// The transaction table and pairing rules.
pub(crate) struct Correlator {
    table: HashMap<FlowTuple, ThriftTransaction>,
    publish: Sender<ThriftTransaction>,
    timeout_us: i64,
}

impl Correlator {
    pub(crate) fn new(publish: Sender<ThriftTransaction>, timeout_us: i64) -> Self {
        Self {
            table: HashMap::new(),
            publish,
            timeout_us,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn on_message(&mut self, msg: ThriftMessage) {
        if msg.is_request {
            self.on_request(msg);
        } else {
            self.on_reply(msg);
        }
    }

    fn on_request(&mut self, msg: ThriftMessage) {
        let flow = msg.flow;
        if let Some(previous) = self.table.remove(&flow) {
            debug!(
                method = %previous.request.method,
                "two requests without a reply, assuming the old one is one-way"
            );
            self.send(previous);
        }

        // endpoints follow the request's direction of travel
        let mut src = Endpoint {
            ip: flow.src_ip,
            port: flow.src_port,
            process: msg.processes.src.clone(),
        };
        let mut dst = Endpoint {
            ip: flow.dst_ip,
            port: flow.dst_port,
            process: msg.processes.dst.clone(),
        };
        if msg.direction == Direction::Reverse {
            std::mem::swap(&mut src, &mut dst);
        }

        let deadline_us = msg.timestamp_us + self.timeout_us;
        self.table.insert(
            flow,
            ThriftTransaction {
                flow,
                src,
                dst,
                request_ts_us: msg.timestamp_us,
                response_time_ms: 0,
                request: msg,
                reply: None,
                deadline_us,
            },
        );
    }

    fn on_reply(&mut self, msg: ThriftMessage) {
        let Entry::Occupied(entry) = self.table.entry(msg.flow) else {
            debug!(method = %msg.method, "response from unknown transaction, ignoring");
            return;
        };
        if entry.get().request.method != msg.method {
            debug!(
                expected = %entry.get().request.method,
                got = %msg.method,
                "response from another request, ignoring"
            );
            return;
        }

        let mut trans = entry.remove();
        trans.response_time_ms = ((msg.timestamp_us - trans.request_ts_us) / 1_000) as i32;
        trans.reply = Some(msg);
        self.send(trans);
    }

    /// The flow closed; a request still pending is a one-way call.
    pub(crate) fn on_fin(&mut self, flow: &FlowTuple) {
        let Some(trans) = self.table.remove(flow) else {
            return;
        };
        debug!(
            method = %trans.request.method,
            "flow closed with only a request, assuming one-way"
        );
        self.send(trans);
    }

    /// Remove every pending transaction whose deadline passed. Expired
    /// transactions are not published.
    pub(crate) fn expire(&mut self, now_us: i64) -> usize {
        let before = self.table.len();
        self.table.retain(|_, trans| trans.deadline_us > now_us);
        before - self.table.len()
    }

    fn send(&self, trans: ThriftTransaction) {
        // bounded channel: blocks when the publisher falls behind
        if self.publish.send(trans).is_err() {
            warn!("publish channel disconnected, dropping transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::transaction_channel;
    use std::net::{IpAddr, Ipv4Addr};

    fn flow() -> FlowTuple {
        FlowTuple::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)),
            51000,
            IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
            9090,
            3,
        )
    }

    fn message(method: &str, is_request: bool, direction: Direction, ts: i64) -> ThriftMessage {
        let mut msg = ThriftMessage::new(ts);
        msg.flow = flow();
        msg.method = method.into();
        msg.is_request = is_request;
        msg.direction = direction;
        msg
    }

    fn correlator() -> (Correlator, crossbeam_channel::Receiver<ThriftTransaction>) {
        let (tx, rx) = transaction_channel(16);
        (Correlator::new(tx, 10_000_000), rx)
    }

    #[test]
    fn test_pairs_request_and_reply() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("echo", true, Direction::Forward, 1_000_000));
        assert_eq!(correlator.len(), 1);

        correlator.on_message(message("echo", false, Direction::Reverse, 1_250_000));
        let trans = rx.try_recv().unwrap();
        assert_eq!(trans.request.method, "echo");
        assert_eq!(trans.reply.unwrap().method, "echo");
        assert_eq!(trans.response_time_ms, 250);
        assert_eq!(correlator.len(), 0);
    }

    #[test]
    fn test_orphan_reply_dropped() {
        let (mut correlator, rx) = correlator();
        correlator.on_message(message("foo", false, Direction::Reverse, 0));
        assert!(rx.try_recv().is_err());
        assert_eq!(correlator.len(), 0);
    }

    #[test]
    fn test_method_mismatch_dropped() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("add", true, Direction::Forward, 0));
        correlator.on_message(message("sub", false, Direction::Reverse, 100));

        // reply dropped, request still pending
        assert!(rx.try_recv().is_err());
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_superseded_request_published_oneway() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("a", true, Direction::Forward, 0));
        correlator.on_message(message("b", true, Direction::Forward, 500));

        let trans = rx.try_recv().unwrap();
        assert_eq!(trans.request.method, "a");
        assert!(trans.reply.is_none());
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_endpoints_swapped_for_reverse_request() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("ping", true, Direction::Reverse, 0));
        correlator.on_fin(&flow());

        let trans = rx.try_recv().unwrap();
        assert_eq!(trans.src.ip, flow().dst_ip);
        assert_eq!(trans.src.port, flow().dst_port);
        assert_eq!(trans.dst.ip, flow().src_ip);
    }

    #[test]
    fn test_expiry_cancelled_by_reply() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("echo", true, Direction::Forward, 0));
        correlator.on_message(message("echo", false, Direction::Reverse, 100));
        rx.try_recv().unwrap();

        // nothing left to expire
        assert_eq!(correlator.expire(i64::MAX), 0);
    }

    #[test]
    fn test_expire_unpublished() {
        let (mut correlator, rx) = correlator();

        correlator.on_message(message("slow", true, Direction::Forward, 0));
        assert_eq!(correlator.expire(9_999_999), 0);
        assert_eq!(correlator.expire(10_000_001), 1);
        assert_eq!(correlator.len(), 0);
        assert!(rx.try_recv().is_err());
    }
}
