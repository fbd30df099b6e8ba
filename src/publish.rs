//! Event construction and the publisher worker.
//!
//! Completed transactions travel through a bounded channel; a dedicated
//! worker thread drains it, renders each transaction into a
//! [`ThriftEvent`], and hands it to the host's [`EventSink`]. The channel
//! is the decoder's only blocking point: when the sink falls behind, the
//! decoding thread blocks on `send`, pushing backpressure upstream.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use tracing::debug;

use crate::config::ThriftConfig;
use crate::correlate::ThriftTransaction;
use crate::flow::Endpoint;

/// Create the bounded transaction channel. The sender goes to the
/// [`StreamManager`](crate::StreamManager), the receiver to a
/// [`Publisher`].
pub fn transaction_channel(
    capacity: usize,
) -> (Sender<ThriftTransaction>, Receiver<ThriftTransaction>) {
    bounded(capacity)
}

/// Transaction outcome as reported downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Ok,
    Error,
}

/// The request half of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub params: String,
    pub size: u32,
}

/// The reply half of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRecord {
    #[serde(rename = "returnValue")]
    pub return_value: String,
    pub exceptions: String,
    pub size: u32,
}

/// Protocol-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThriftRecord {
    pub request: RequestRecord,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRecord>,
}

/// One emitted transaction, ready for the downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThriftEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub status: EventStatus,
    pub response_time_ms: i32,
    /// Request capture timestamp (epoch microseconds).
    pub timestamp_us: i64,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub thrift: ThriftRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_raw: Option<String>,
}

/// Downstream consumer of emitted events. Implementations live outside
/// the decoder (message queues, log shippers, test collectors).
pub trait EventSink: Send {
    fn publish(&mut self, event: ThriftEvent);
}

/// Worker that drains the transaction channel into an [`EventSink`].
pub struct Publisher {
    rx: Receiver<ThriftTransaction>,
    sink: Box<dyn EventSink>,
    send_request: bool,
    send_response: bool,
}

impl Publisher {
    pub fn new(
        rx: Receiver<ThriftTransaction>,
        sink: Box<dyn EventSink>,
        cfg: &ThriftConfig,
    ) -> Self {
        Self {
            rx,
            sink,
            send_request: cfg.send_request,
            send_response: cfg.send_response,
        }
    }

    /// Drain transactions until every sender is dropped.
    pub fn run(mut self) {
        while let Ok(trans) = self.rx.recv() {
            let event = build_event(&trans, self.send_request, self.send_response);
            self.sink.publish(event);
            debug!(method = %trans.request.method, "published event");
        }
    }

    /// Run on a dedicated thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("thrift-publisher".into())
            .spawn(move || self.run())
    }
}

fn build_event(trans: &ThriftTransaction, send_request: bool, send_response: bool) -> ThriftEvent {
    let request = &trans.request;
    let has_exception = trans
        .reply
        .as_ref()
        .is_some_and(|reply| reply.has_exception);

    let status = if has_exception {
        EventStatus::Error
    } else {
        EventStatus::Ok
    };

    let reply = trans.reply.as_ref().map(|reply| ReplyRecord {
        return_value: reply.return_value.clone(),
        exceptions: reply.exceptions.clone(),
        size: reply.frame_size,
    });

    let request_raw =
        send_request.then(|| format!("{}{}", request.method, request.params));
    let response_raw = trans.reply.as_ref().and_then(|reply| {
        if !send_response {
            return None;
        }
        if reply.has_exception {
            Some(format!("Exceptions: {}", reply.exceptions))
        } else {
            Some(reply.return_value.clone())
        }
    });

    ThriftEvent {
        event_type: "thrift",
        status,
        response_time_ms: trans.response_time_ms,
        timestamp_us: trans.request_ts_us,
        src: trans.src.clone(),
        dst: trans.dst.clone(),
        thrift: ThriftRecord {
            request: RequestRecord {
                method: request.method.to_string(),
                params: request.params.clone(),
                size: request.frame_size,
            },
            service: request.service.to_string(),
            reply,
        },
        request_raw,
        response_raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowTuple, ProcessPair};
    use crate::message::ThriftMessage;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint(last_octet: u8, port: u16) -> Endpoint {
        Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(10, 1, 1, last_octet)),
            port,
            process: "".into(),
        }
    }

    fn transaction(with_reply: bool, has_exception: bool) -> ThriftTransaction {
        let mut request = ThriftMessage::new(1_000);
        request.is_request = true;
        request.method = "add".into();
        request.params = "(1: 4, 2: 3)".to_string();
        request.frame_size = 25;
        request.service = "Calculator".into();
        request.processes = ProcessPair::default();

        let reply = with_reply.then(|| {
            let mut reply = ThriftMessage::new(3_000);
            reply.method = "add".into();
            if has_exception {
                reply.has_exception = true;
                reply.exceptions = "(1: (...))".to_string();
            } else {
                reply.return_value = "7".to_string();
            }
            reply.frame_size = 17;
            reply
        });

        ThriftTransaction {
            flow: FlowTuple::default(),
            src: endpoint(1, 50000),
            dst: endpoint(2, 9090),
            request_ts_us: 1_000,
            response_time_ms: 2,
            request,
            reply,
            deadline_us: 0,
        }
    }

    #[test]
    fn test_event_ok_status() {
        let event = build_event(&transaction(true, false), true, true);
        assert_eq!(event.status, EventStatus::Ok);
        assert_eq!(event.thrift.request.method, "add");
        assert_eq!(event.thrift.reply.as_ref().unwrap().return_value, "7");
        assert_eq!(event.request_raw.as_deref(), Some("add(1: 4, 2: 3)"));
        assert_eq!(event.response_raw.as_deref(), Some("7"));
    }

    #[test]
    fn test_event_error_status_on_exception() {
        let event = build_event(&transaction(true, true), true, true);
        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(
            event.response_raw.as_deref(),
            Some("Exceptions: (1: (...))")
        );
    }

    #[test]
    fn test_event_raw_flags() {
        let event = build_event(&transaction(true, false), false, false);
        assert!(event.request_raw.is_none());
        assert!(event.response_raw.is_none());
    }

    #[test]
    fn test_event_oneway_has_no_reply() {
        let event = build_event(&transaction(false, false), true, true);
        assert_eq!(event.status, EventStatus::Ok);
        assert!(event.thrift.reply.is_none());
        assert!(event.response_raw.is_none());
    }

    #[test]
    fn test_event_serializes() {
        let event = build_event(&transaction(true, false), true, true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "thrift");
        assert_eq!(json["status"], "OK");
        assert_eq!(json["thrift"]["reply"]["returnValue"], "7");
        assert_eq!(json["src"]["port"], 50000);
    }

    #[test]
    fn test_publisher_drains_channel() {
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Collector(Arc<Mutex<Vec<ThriftEvent>>>);
        impl EventSink for Collector {
            fn publish(&mut self, event: ThriftEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = transaction_channel(4);
        let publisher = Publisher::new(
            rx,
            Box::new(Collector(Arc::clone(&events))),
            &ThriftConfig::default(),
        );
        let handle = publisher.spawn().unwrap();

        tx.send(transaction(true, false)).unwrap();
        tx.send(transaction(false, false)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].thrift.request.method, "add");
    }
}
