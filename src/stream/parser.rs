//! Per-direction message parser.
//!
//! A [`ThriftStream`] holds one direction's growing byte buffer, the parse
//! offset into it, and the message being built. [`MessageParser`] drives
//! the START/FIELD state machine over that state: START consumes the
//! optional frame header and the message-begin block, FIELD consumes the
//! argument/result struct one field at a time. Every step either commits
//! the offset past fully decoded input or leaves it at the last known-good
//! boundary and suspends, so the caller can append the next TCP segment
//! and retry.

use compact_str::CompactString;
use tracing::{debug, warn};

use crate::config::{ThriftConfig, TransportType};
use crate::decode::{format_struct, Decoded, ValueDecoder, TYPE_STOP};
use crate::error::DecodeError;
use crate::idl::IdlResolver;
use crate::message::{ThriftField, ThriftMessage, MSG_TYPE_CALL, MSG_TYPE_ONEWAY};

/// Strict-header version handling.
const VERSION_MASK: u32 = 0xffff_0000;
const VERSION_1: u32 = 0x8001_0000;
const TYPE_MASK: u32 = 0x0000_00ff;

/// Parse state of a stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ParseState {
    #[default]
    Start,
    Field,
}

/// Progress report from one parser invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseProgress {
    /// The buffered message is fully decoded.
    Complete,
    /// More bytes are needed; parse state is preserved.
    NeedMore,
}

/// Decoder state for one direction of one flow.
#[derive(Debug, Default)]
pub struct ThriftStream {
    pub(crate) buf: Vec<u8>,
    pub(crate) parse_offset: usize,
    pub(crate) state: ParseState,
    /// When set, payload in this direction is discarded without decoding.
    /// Used to skip reply bodies when reply capture is off.
    pub(crate) skip_input: bool,
    pub(crate) message: Option<ThriftMessage>,
}

impl ThriftStream {
    pub(crate) fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            ..Default::default()
        }
    }

    /// Reset for the next message: drop the consumed prefix (or the whole
    /// buffer on `flush`) and return to START.
    pub(crate) fn prepare_for_new_message(&mut self, flush: bool) {
        if flush {
            self.buf.clear();
        } else {
            self.buf.drain(..self.parse_offset);
        }
        self.parse_offset = 0;
        self.message = None;
        self.state = ParseState::Start;
    }
}

/// The START/FIELD state machine.
pub(crate) struct MessageParser<'c> {
    cfg: &'c ThriftConfig,
}

/// Outcome of one single-field step: a decoded field, the struct's STOP
/// marker, or a suspension.
enum FieldStep {
    Field(ThriftField),
    Stop,
    NeedMore,
}

impl<'c> MessageParser<'c> {
    pub(crate) fn new(cfg: &'c ThriftConfig) -> Self {
        Self { cfg }
    }

    /// Advance the stream's message as far as the buffered bytes allow.
    ///
    /// `Err` means the stream is structurally broken and must be dropped.
    pub(crate) fn parse(
        &self,
        stream: &mut ThriftStream,
        idl: Option<&dyn IdlResolver>,
    ) -> Result<ParseProgress, DecodeError> {
        let mut msg = stream
            .message
            .take()
            .expect("dispatcher seeds the message before parsing");
        let result = self.parse_message(stream, &mut msg, idl);
        stream.message = Some(msg);
        result
    }

    fn parse_message(
        &self,
        stream: &mut ThriftStream,
        msg: &mut ThriftMessage,
        idl: Option<&dyn IdlResolver>,
    ) -> Result<ParseProgress, DecodeError> {
        while stream.parse_offset < stream.buf.len() {
            match stream.state {
                ParseState::Start => {
                    // a message always begins at the buffer start: the
                    // consumed prefix is drained before the next one
                    msg.start = 0;
                    if self.cfg.transport_type == TransportType::Framed {
                        if stream.buf.len() < 4 {
                            return Ok(ParseProgress::NeedMore);
                        }
                        msg.frame_size = u32::from_be_bytes([
                            stream.buf[0],
                            stream.buf[1],
                            stream.buf[2],
                            stream.buf[3],
                        ]);
                        stream.parse_offset = 4;
                    }

                    match self.read_message_begin(&stream.buf, &mut stream.parse_offset, msg)? {
                        ParseProgress::NeedMore => return Ok(ParseProgress::NeedMore),
                        ParseProgress::Complete => {}
                    }

                    if !msg.is_request && !self.cfg.capture_reply {
                        // don't parse the reply body at all
                        debug!(method = %msg.method, "not capturing reply body");
                        msg.return_value.clear();
                        msg.exceptions.clear();
                        return Ok(ParseProgress::Complete);
                    }
                    stream.state = ParseState::Field;
                }
                ParseState::Field => {
                    match self.read_field(&stream.buf, &mut stream.parse_offset)? {
                        FieldStep::Stop => {
                            self.finalize(msg, idl);
                            return Ok(ParseProgress::Complete);
                        }
                        FieldStep::NeedMore => return Ok(ParseProgress::NeedMore),
                        FieldStep::Field(field) => {
                            if msg.fields.len() >= self.cfg.drop_after_n_struct_fields {
                                return Err(DecodeError::StructTooLarge {
                                    max: self.cfg.drop_after_n_struct_fields,
                                });
                            }
                            msg.fields.push(field);
                        }
                    }
                }
            }
        }

        Ok(ParseProgress::NeedMore)
    }

    /// Parse the message header: either the strict version+type word or the
    /// bare no-version form, then the method name and sequence id. The
    /// offset is committed only once the whole header decodes.
    fn read_message_begin(
        &self,
        buf: &[u8],
        parse_offset: &mut usize,
        msg: &mut ThriftMessage,
    ) -> Result<ParseProgress, DecodeError> {
        let data = &buf[*parse_offset..];
        if data.len() < 9 {
            return Ok(ParseProgress::NeedMore);
        }

        let decoder = ValueDecoder::new(self.cfg);
        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if (word as i32) < 0 {
            // strict header: version and type packed into the first word
            msg.version = word & VERSION_MASK;
            if msg.version != VERSION_1 {
                debug!(version = msg.version, "unexpected thrift version");
            }
            msg.msg_type = word & TYPE_MASK;

            let mut offset = 4;
            match decoder.read_string(&data[offset..])? {
                Decoded::Complete { value, consumed } => {
                    msg.method = value;
                    offset += consumed;
                }
                Decoded::NeedMore => return Ok(ParseProgress::NeedMore),
            }

            if data.len() - offset < 4 {
                return Ok(ParseProgress::NeedMore);
            }
            msg.seq_id = u32::from_be_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            *parse_offset += offset + 4;
        } else {
            // no-version header: method string first, then one type byte
            let mut offset = 0;
            match decoder.read_string(data)? {
                Decoded::Complete { value, consumed } => {
                    msg.method = value;
                    offset += consumed;
                }
                Decoded::NeedMore => return Ok(ParseProgress::NeedMore),
            }

            if data.len() - offset < 5 {
                return Ok(ParseProgress::NeedMore);
            }
            msg.msg_type = u32::from(data[offset]);
            offset += 1;
            msg.seq_id = u32::from_be_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            *parse_offset += offset + 4;
        }

        msg.is_request = msg.msg_type == MSG_TYPE_CALL || msg.msg_type == MSG_TYPE_ONEWAY;
        Ok(ParseProgress::Complete)
    }

    /// One step of the top-level field loop. Commits the offset past each
    /// fully decoded field so a suspension resumes at the field boundary.
    fn read_field(&self, buf: &[u8], parse_offset: &mut usize) -> Result<FieldStep, DecodeError> {
        let data = &buf[*parse_offset..];
        let Some(&type_id) = data.first() else {
            return Ok(FieldStep::NeedMore);
        };
        if type_id == TYPE_STOP {
            *parse_offset += 1;
            return Ok(FieldStep::Stop);
        }

        if data.len() < 3 {
            return Ok(FieldStep::NeedMore);
        }
        let id = u16::from_be_bytes([data[1], data[2]]);

        let decoder = ValueDecoder::new(self.cfg);
        match decoder.read_value(type_id, &data[3..], 0)? {
            Decoded::Complete { value, consumed } => {
                *parse_offset += 3 + consumed;
                Ok(FieldStep::Field(ThriftField { type_id, id, value }))
            }
            Decoded::NeedMore => Ok(FieldStep::NeedMore),
        }
    }

    /// Fill the formatted payload once the terminating STOP is seen.
    fn finalize(&self, msg: &mut ThriftMessage, idl: Option<&dyn IdlResolver>) {
        let idl_method = idl.and_then(|idl| idl.find_method(&msg.method));

        if msg.is_request {
            match idl_method {
                Some(method) => {
                    msg.params = format_struct(
                        &msg.fields,
                        self.cfg.collection_max_size,
                        Some(&method.params),
                    );
                    msg.service = method.service.clone();
                }
                None => {
                    msg.params =
                        format_struct(&msg.fields, self.cfg.collection_max_size, None);
                }
            }
            return;
        }

        if msg.fields.len() > 1 {
            warn!(
                method = %msg.method,
                fields = msg.fields.len(),
                "thrift reply with more than one field, ignoring all but the first"
            );
        }
        if let Some(first) = msg.fields.first() {
            if first.id == 0 {
                msg.return_value = first.value.to_string();
                msg.exceptions = String::new();
            } else {
                msg.return_value = String::new();
                let names: Option<&[Option<CompactString>]> =
                    idl_method.map(|m| m.exceptions.as_slice());
                msg.exceptions =
                    format_struct(&msg.fields, self.cfg.collection_max_size, names);
                msg.has_exception = true;
            }
        }
    }
}
