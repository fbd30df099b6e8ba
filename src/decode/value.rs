//! Primitive value readers.
//!
//! Each reader renders the decoded value to a string, since the decoder's
//! output is telemetry, not a reconstructed payload. All integers are
//! big-endian on the wire.

use compact_str::CompactString;

use crate::config::ThriftConfig;
use crate::error::DecodeError;

use super::{
    Decoded, DecodeResult, MAX_NESTING_DEPTH, TYPE_BOOL, TYPE_BYTE, TYPE_DOUBLE, TYPE_I16,
    TYPE_I32, TYPE_I64, TYPE_LIST, TYPE_MAP, TYPE_SET, TYPE_STRING, TYPE_STRUCT,
};

/// True if the wire-type byte maps to a decoder.
pub(crate) fn is_known_type(type_id: u8) -> bool {
    matches!(
        type_id,
        TYPE_BOOL
            | TYPE_BYTE
            | TYPE_DOUBLE
            | TYPE_I16
            | TYPE_I32
            | TYPE_I64
            | TYPE_STRING
            | TYPE_STRUCT
            | TYPE_MAP
            | TYPE_SET
            | TYPE_LIST
    )
}

/// Resumable reader for binary-protocol values.
///
/// Holds only a borrow of the configuration; all parse state lives in the
/// caller's buffer and offsets, so a suspended decode is retried simply by
/// calling again with a longer slice.
#[derive(Debug, Clone, Copy)]
pub struct ValueDecoder<'c> {
    pub(crate) cfg: &'c ThriftConfig,
}

impl<'c> ValueDecoder<'c> {
    pub fn new(cfg: &'c ThriftConfig) -> Self {
        Self { cfg }
    }

    /// Decode one value of wire type `type_id` from the front of `data`,
    /// rendering it to a string.
    pub fn read(&self, type_id: u8, data: &[u8]) -> DecodeResult<CompactString> {
        self.read_value(type_id, data, 0)
    }

    /// Dispatch over the wire-type byte. `depth` counts container nesting.
    pub(crate) fn read_value(
        &self,
        type_id: u8,
        data: &[u8],
        depth: usize,
    ) -> DecodeResult<CompactString> {
        match type_id {
            TYPE_BOOL => read_bool(data),
            TYPE_BYTE => read_byte(data),
            TYPE_DOUBLE => read_double(data),
            TYPE_I16 => read_i16(data),
            TYPE_I32 => read_i32(data),
            TYPE_I64 => read_i64(data),
            TYPE_STRING => self.read_quoted_string(data),
            TYPE_STRUCT => self.read_struct(data, depth),
            TYPE_MAP => self.read_map(data, depth),
            TYPE_SET => self.read_set(data, depth),
            TYPE_LIST => self.read_list(data, depth),
            other => Err(DecodeError::UnknownType { type_id: other }),
        }
    }

    /// Check a container's nesting depth before recursing into it.
    pub(crate) fn check_depth(depth: usize) -> Result<(), DecodeError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(DecodeError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
            });
        }
        Ok(())
    }

    /// Read a length-prefixed string, capping the rendering at
    /// `string_max_size` bytes plus a literal `...`. `consumed` always
    /// covers the full on-wire length, so the stream stays aligned past an
    /// oversize value.
    pub fn read_string(&self, data: &[u8]) -> DecodeResult<CompactString> {
        let (shown, truncated, consumed) = match self.read_string_bytes(data)? {
            Decoded::Complete { value, consumed } => (value.0, value.1, consumed),
            Decoded::NeedMore => return Ok(Decoded::NeedMore),
        };

        let mut value = CompactString::from(String::from_utf8_lossy(shown));
        if truncated {
            value.push_str("...");
        }
        Ok(Decoded::Complete { value, consumed })
    }

    /// Read a string and render it for a field value: `""` when empty,
    /// `"*"` under obfuscation, quoted-and-escaped for valid UTF-8,
    /// lowercase hex otherwise.
    pub(crate) fn read_quoted_string(&self, data: &[u8]) -> DecodeResult<CompactString> {
        let (shown, truncated, consumed) = match self.read_string_bytes(data)? {
            Decoded::Complete { value, consumed } => (value.0, value.1, consumed),
            Decoded::NeedMore => return Ok(Decoded::NeedMore),
        };

        let value = if shown.is_empty() && !truncated {
            CompactString::const_new("\"\"")
        } else if self.cfg.obfuscate_strings {
            CompactString::const_new("\"*\"")
        } else {
            match std::str::from_utf8(shown) {
                Ok(text) if truncated => CompactString::from(format!("{:?}", format!("{text}..."))),
                Ok(text) => CompactString::from(format!("{text:?}")),
                Err(_) => {
                    let mut encoded = hex::encode(shown);
                    if truncated {
                        encoded.push_str("...");
                    }
                    CompactString::from(encoded)
                }
            }
        };
        Ok(Decoded::Complete { value, consumed })
    }

    /// Shared length-prefix handling. Returns the bytes to render (at most
    /// `string_max_size` of them), whether the value was truncated, and the
    /// full consumed length.
    fn read_string_bytes<'d>(&self, data: &'d [u8]) -> DecodeResult<(&'d [u8], bool)> {
        if data.len() < 4 {
            return Ok(Decoded::NeedMore);
        }
        let len = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if len < 0 {
            return Err(DecodeError::NegativeLength { what: "string", len });
        }
        let len = len as usize;
        if data.len() - 4 < len {
            return Ok(Decoded::NeedMore);
        }

        let shown_len = len.min(self.cfg.string_max_size);
        Ok(Decoded::Complete {
            value: (&data[4..4 + shown_len], len > shown_len),
            consumed: 4 + len,
        })
    }
}

fn read_bool(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(&b) = data.first() else {
        return Ok(Decoded::NeedMore);
    };
    Ok(Decoded::Complete {
        value: if b == 0 { "false" } else { "true" }.into(),
        consumed: 1,
    })
}

fn read_byte(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(&b) = data.first() else {
        return Ok(Decoded::NeedMore);
    };
    Ok(Decoded::Complete {
        value: CompactString::from(b.to_string()),
        consumed: 1,
    })
}

fn read_double(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(bytes) = data.get(..8) else {
        return Ok(Decoded::NeedMore);
    };
    let value = f64::from_be_bytes(bytes.try_into().expect("slice is 8 bytes"));
    Ok(Decoded::Complete {
        value: CompactString::from(value.to_string()),
        consumed: 8,
    })
}

fn read_i16(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(bytes) = data.get(..2) else {
        return Ok(Decoded::NeedMore);
    };
    let value = i16::from_be_bytes([bytes[0], bytes[1]]);
    Ok(Decoded::Complete {
        value: CompactString::from(value.to_string()),
        consumed: 2,
    })
}

fn read_i32(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(bytes) = data.get(..4) else {
        return Ok(Decoded::NeedMore);
    };
    let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(Decoded::Complete {
        value: CompactString::from(value.to_string()),
        consumed: 4,
    })
}

fn read_i64(data: &[u8]) -> DecodeResult<CompactString> {
    let Some(bytes) = data.get(..8) else {
        return Ok(Decoded::NeedMore);
    };
    let value = i64::from_be_bytes(bytes.try_into().expect("slice is 8 bytes"));
    Ok(Decoded::Complete {
        value: CompactString::from(value.to_string()),
        consumed: 8,
    })
}
