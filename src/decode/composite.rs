//! List/set/map/struct readers.
//!
//! Collections decode every element on the wire but render at most
//! `collection_max_size` of them, appending a single `...` placeholder
//! when elements were dropped. Structs additionally enforce
//! `drop_after_n_struct_fields` as a hard error: a struct that never STOPs
//! is assumed to be a desynchronized stream, not a real payload.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::DecodeError;
use crate::message::ThriftField;

use super::value::{is_known_type, ValueDecoder};
use super::{Decoded, DecodeResult, TYPE_STOP};

impl ValueDecoder<'_> {
    /// Shared reader for lists and sets (identical wire shape). Returns
    /// the joined element renderings without the enclosing brackets.
    fn read_list_or_set(&self, data: &[u8], depth: usize) -> DecodeResult<String> {
        Self::check_depth(depth)?;
        if data.len() < 5 {
            return Ok(Decoded::NeedMore);
        }

        let elem_type = data[0];
        if !is_known_type(elem_type) {
            return Err(DecodeError::UnknownType { type_id: elem_type });
        }
        let size = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        if size < 0 {
            return Err(DecodeError::NegativeLength {
                what: "list/set",
                len: size,
            });
        }

        let mut rendered: Vec<CompactString> = Vec::new();
        let mut offset = 5;
        for i in 0..size as usize {
            let value = match self.read_value(elem_type, &data[offset..], depth + 1)? {
                Decoded::Complete { value, consumed } => {
                    offset += consumed;
                    value
                }
                Decoded::NeedMore => return Ok(Decoded::NeedMore),
            };

            if i < self.cfg.collection_max_size {
                rendered.push(value);
            } else if i == self.cfg.collection_max_size {
                rendered.push(CompactString::const_new("..."));
            }
        }

        Ok(Decoded::Complete {
            value: rendered.join(", "),
            consumed: offset,
        })
    }

    /// List: `[a, b, c]`. An empty rendering stays empty (no brackets).
    pub(crate) fn read_list(&self, data: &[u8], depth: usize) -> DecodeResult<CompactString> {
        Ok(match self.read_list_or_set(data, depth)? {
            Decoded::Complete { value, consumed } if !value.is_empty() => Decoded::Complete {
                value: CompactString::from(format!("[{value}]")),
                consumed,
            },
            Decoded::Complete { value, consumed } => Decoded::Complete {
                value: CompactString::from(value),
                consumed,
            },
            Decoded::NeedMore => Decoded::NeedMore,
        })
    }

    /// Set: `{a, b, c}`. An empty rendering stays empty (no braces).
    pub(crate) fn read_set(&self, data: &[u8], depth: usize) -> DecodeResult<CompactString> {
        Ok(match self.read_list_or_set(data, depth)? {
            Decoded::Complete { value, consumed } if !value.is_empty() => Decoded::Complete {
                value: CompactString::from(format!("{{{value}}}")),
                consumed,
            },
            Decoded::Complete { value, consumed } => Decoded::Complete {
                value: CompactString::from(value),
                consumed,
            },
            Decoded::NeedMore => Decoded::NeedMore,
        })
    }

    /// Map: `{k1: v1, k2: v2}`, always braced even when empty.
    pub(crate) fn read_map(&self, data: &[u8], depth: usize) -> DecodeResult<CompactString> {
        Self::check_depth(depth)?;
        if data.len() < 6 {
            return Ok(Decoded::NeedMore);
        }

        let key_type = data[0];
        let value_type = data[1];
        for type_id in [key_type, value_type] {
            if !is_known_type(type_id) {
                return Err(DecodeError::UnknownType { type_id });
            }
        }
        let size = i32::from_be_bytes([data[2], data[3], data[4], data[5]]);
        if size < 0 {
            return Err(DecodeError::NegativeLength {
                what: "map",
                len: size,
            });
        }

        let mut rendered: Vec<String> = Vec::new();
        let mut offset = 6;
        for i in 0..size as usize {
            let key = match self.read_value(key_type, &data[offset..], depth + 1)? {
                Decoded::Complete { value, consumed } => {
                    offset += consumed;
                    value
                }
                Decoded::NeedMore => return Ok(Decoded::NeedMore),
            };
            let value = match self.read_value(value_type, &data[offset..], depth + 1)? {
                Decoded::Complete { value, consumed } => {
                    offset += consumed;
                    value
                }
                Decoded::NeedMore => return Ok(Decoded::NeedMore),
            };

            if i < self.cfg.collection_max_size {
                rendered.push(format!("{key}: {value}"));
            } else if i == self.cfg.collection_max_size {
                rendered.push("...".to_string());
            }
        }

        Ok(Decoded::Complete {
            value: CompactString::from(format!("{{{}}}", rendered.join(", "))),
            consumed: offset,
        })
    }

    /// Nested struct: `(id1: v1, id2: v2)`. Field names are never resolved
    /// here; the IDL only names top-level parameters and exceptions.
    pub(crate) fn read_struct(&self, data: &[u8], depth: usize) -> DecodeResult<CompactString> {
        Self::check_depth(depth)?;

        let mut fields: SmallVec<[ThriftField; 4]> = SmallVec::new();
        let mut offset = 0;
        loop {
            if fields.len() >= self.cfg.drop_after_n_struct_fields {
                return Err(DecodeError::StructTooLarge {
                    max: self.cfg.drop_after_n_struct_fields,
                });
            }
            if offset >= data.len() {
                return Ok(Decoded::NeedMore);
            }

            let type_id = data[offset];
            offset += 1;
            if type_id == TYPE_STOP {
                return Ok(Decoded::Complete {
                    value: CompactString::from(format_struct(
                        &fields,
                        self.cfg.collection_max_size,
                        None,
                    )),
                    consumed: offset,
                });
            }

            if data.len() - offset < 2 {
                return Ok(Decoded::NeedMore);
            }
            let id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            offset += 2;

            match self.read_value(type_id, &data[offset..], depth + 1)? {
                Decoded::Complete { value, consumed } => {
                    offset += consumed;
                    fields.push(ThriftField { type_id, id, value });
                }
                Decoded::NeedMore => return Ok(Decoded::NeedMore),
            }
        }
    }
}

/// Render a field list as `(id1: v1, id2: v2, ...)`, truncated at
/// `max_elements` entries. When `names` is supplied (from the IDL) and has
/// a name at a field's id, the name replaces the numeric id.
pub(crate) fn format_struct(
    fields: &[ThriftField],
    max_elements: usize,
    names: Option<&[Option<CompactString>]>,
) -> String {
    let mut rendered: Vec<String> = Vec::with_capacity(fields.len().min(max_elements + 1));
    for (i, field) in fields.iter().enumerate() {
        if i == max_elements {
            rendered.push("...".to_string());
            break;
        }
        let name = names
            .and_then(|names| names.get(field.id as usize))
            .and_then(|name| name.as_ref());
        match name {
            Some(name) => rendered.push(format!("{}: {}", name, field.value)),
            None => rendered.push(format!("{}: {}", field.id, field.value)),
        }
    }
    format!("({})", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThriftConfig;
    use crate::decode::{TYPE_BOOL, TYPE_I16, TYPE_I32, TYPE_LIST, TYPE_MAP, TYPE_SET, TYPE_STRUCT};

    fn complete(result: DecodeResult<CompactString>) -> (CompactString, usize) {
        match result.expect("decode ok") {
            Decoded::Complete { value, consumed } => (value, consumed),
            Decoded::NeedMore => panic!("expected complete"),
        }
    }

    fn list_bytes(elem_type: u8, size: i32, elems: &[u8]) -> Vec<u8> {
        let mut data = vec![elem_type];
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(elems);
        data
    }

    #[test]
    fn test_list_of_i32() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);

        let mut elems = Vec::new();
        for v in [1i32, 2, 3] {
            elems.extend_from_slice(&v.to_be_bytes());
        }
        let data = list_bytes(TYPE_I32, 3, &elems);

        let (value, consumed) = complete(d.read(TYPE_LIST, &data));
        assert_eq!(value, "[1, 2, 3]");
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_set_braces_and_empty() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);

        let mut elems = Vec::new();
        for v in [7i16, -7] {
            elems.extend_from_slice(&v.to_be_bytes());
        }
        let data = list_bytes(TYPE_I16, 2, &elems);
        let (value, _) = complete(d.read(TYPE_SET, &data));
        assert_eq!(value, "{7, -7}");

        // empty set renders as an empty string, no braces
        let data = list_bytes(TYPE_I16, 0, &[]);
        let (value, consumed) = complete(d.read(TYPE_SET, &data));
        assert_eq!(value, "");
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_collection_truncation() {
        let mut cfg = ThriftConfig::default();
        cfg.collection_max_size = 3;
        let d = ValueDecoder::new(&cfg);

        let mut elems = Vec::new();
        for v in 0..6i32 {
            elems.extend_from_slice(&v.to_be_bytes());
        }
        let data = list_bytes(TYPE_I32, 6, &elems);

        let (value, consumed) = complete(d.read(TYPE_LIST, &data));
        assert_eq!(value, "[0, 1, 2, ...]");
        // all six elements were walked on the wire
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_list_unknown_elem_type() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);
        let data = list_bytes(99, 1, &[0]);
        assert_eq!(
            d.read(TYPE_LIST, &data),
            Err(DecodeError::UnknownType { type_id: 99 })
        );
    }

    #[test]
    fn test_list_negative_size() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);
        let data = list_bytes(TYPE_I32, -5, &[]);
        assert!(matches!(
            d.read(TYPE_LIST, &data),
            Err(DecodeError::NegativeLength { .. })
        ));
    }

    #[test]
    fn test_list_partial_suspends() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);
        // claims two i32 elements, carries six bytes of them
        let data = list_bytes(TYPE_I32, 2, &[0, 0, 0, 1, 0, 0]);
        assert_eq!(d.read(TYPE_LIST, &data), Ok(Decoded::NeedMore));
    }

    #[test]
    fn test_map_rendering() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);

        let mut data = vec![TYPE_BOOL, TYPE_I32];
        data.extend_from_slice(&2i32.to_be_bytes());
        data.push(1);
        data.extend_from_slice(&10i32.to_be_bytes());
        data.push(0);
        data.extend_from_slice(&20i32.to_be_bytes());

        let (value, consumed) = complete(d.read(TYPE_MAP, &data));
        assert_eq!(value, "{true: 10, false: 20}");
        assert_eq!(consumed, data.len());

        // maps keep their braces when empty
        let mut data = vec![TYPE_BOOL, TYPE_I32];
        data.extend_from_slice(&0i32.to_be_bytes());
        let (value, _) = complete(d.read(TYPE_MAP, &data));
        assert_eq!(value, "{}");
    }

    #[test]
    fn test_map_unknown_value_type() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);
        let mut data = vec![TYPE_BOOL, 77];
        data.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(
            d.read(TYPE_MAP, &data),
            Err(DecodeError::UnknownType { type_id: 77 })
        );
    }

    #[test]
    fn test_nested_struct() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);

        // (1: true, 2: (1: 5))
        let mut data = vec![TYPE_BOOL, 0, 1, 1];
        data.extend_from_slice(&[TYPE_STRUCT, 0, 2]);
        data.extend_from_slice(&[TYPE_I32, 0, 1]);
        data.extend_from_slice(&5i32.to_be_bytes());
        data.push(TYPE_STOP); // inner
        data.push(TYPE_STOP); // outer

        let (value, consumed) = complete(d.read(TYPE_STRUCT, &data));
        assert_eq!(value, "(1: true, 2: (1: 5))");
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_struct_field_bomb() {
        let mut cfg = ThriftConfig::default();
        cfg.drop_after_n_struct_fields = 8;
        let d = ValueDecoder::new(&cfg);

        let mut data = Vec::new();
        for id in 0..20u16 {
            data.push(TYPE_BOOL);
            data.extend_from_slice(&id.to_be_bytes());
            data.push(1);
        }
        assert_eq!(
            d.read(TYPE_STRUCT, &data),
            Err(DecodeError::StructTooLarge { max: 8 })
        );
    }

    #[test]
    fn test_struct_without_stop_suspends() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);
        let data = [TYPE_BOOL, 0, 1, 1];
        assert_eq!(d.read(TYPE_STRUCT, &data), Ok(Decoded::NeedMore));
    }

    #[test]
    fn test_nesting_depth_cap() {
        let cfg = ThriftConfig::default();
        let d = ValueDecoder::new(&cfg);

        // lists nested well past the depth limit
        let mut data = Vec::new();
        for _ in 0..32 {
            data.push(TYPE_LIST);
            data.extend_from_slice(&1i32.to_be_bytes());
        }
        data.push(TYPE_BOOL);
        data.extend_from_slice(&1i32.to_be_bytes());
        data.push(1);

        assert!(matches!(
            d.read(TYPE_LIST, &data),
            Err(DecodeError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn test_format_struct_with_names() {
        let fields = vec![
            ThriftField {
                type_id: TYPE_I32,
                id: 1,
                value: "5".into(),
            },
            ThriftField {
                type_id: TYPE_I32,
                id: 2,
                value: "6".into(),
            },
        ];
        assert_eq!(format_struct(&fields, 15, None), "(1: 5, 2: 6)");

        let names = vec![None, Some(CompactString::const_new("a"))];
        assert_eq!(
            format_struct(&fields, 15, Some(&names)),
            "(a: 5, 2: 6)"
        );
        assert_eq!(format_struct(&fields, 1, None), "(1: 5, ...)");
        assert_eq!(format_struct(&[], 15, None), "()");
    }
}
