//! Optional IDL metadata interface.
//!
//! When the host has parsed the service's `.thrift` files it can supply an
//! [`IdlResolver`]; the decoder then replaces numeric field ids with
//! parameter/exception names and attaches the owning service's name to
//! requests. Without a resolver, renderings fall back to numeric ids.

use std::collections::HashMap;

use compact_str::CompactString;

/// Metadata for one RPC method, as extracted from the IDL.
///
/// `params` and `exceptions` are indexed by field id; `None` marks an id
/// the IDL does not name (ids are sparse in evolved schemas).
#[derive(Debug, Clone, Default)]
pub struct IdlMethod {
    pub service: CompactString,
    pub params: Vec<Option<CompactString>>,
    pub exceptions: Vec<Option<CompactString>>,
}

/// Pure lookup from method name to IDL metadata.
pub trait IdlResolver {
    fn find_method(&self, name: &str) -> Option<&IdlMethod>;
}

/// Map-backed resolver for hosts that build the method table themselves
/// (and for tests).
#[derive(Debug, Clone, Default)]
pub struct StaticIdl {
    methods: HashMap<CompactString, IdlMethod>,
}

impl StaticIdl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method, replacing any previous entry under that name.
    pub fn insert(&mut self, name: impl Into<CompactString>, method: IdlMethod) {
        self.methods.insert(name.into(), method);
    }
}

impl IdlResolver for StaticIdl {
    fn find_method(&self, name: &str) -> Option<&IdlMethod> {
        self.methods.get(name)
    }
}
