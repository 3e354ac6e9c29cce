use std::net::Ipv4Addr;

/// An opaque handle to a typed session attribute slot.
///
/// `TAGS` is a distinguished sentinel: an [`crate::Operation`] addressed to it
/// carries a tag name rather than a field value, and is applied via
/// [`Session::add_tag`](crate::Session::add_tag) instead of
/// [`Session::apply_field`](crate::Session::apply_field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle(pub u32);

impl FieldHandle {
    pub const TAGS: FieldHandle = FieldHandle(u32::MAX);

    pub fn is_tags(self) -> bool {
        self == FieldHandle::TAGS
    }
}

/// The declared type of a session field, which dictates how an operation's
/// payload is interpreted and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// An integer-valued field (also used for IP-array fields, which take the
    /// address's `u32` representation).
    Integer,
    /// An IPv4 address field.
    Ip,
    /// A string-array or hash-set field; both receive the raw string.
    String,
}

/// The interpreted value of an operation's payload, ready to hand to a
/// [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(u32),
    Ip(Ipv4Addr),
    Str(String),
}

/// Resolves expression names (from tagger `fields[]` lines and wise's
/// `/fields` schema) to the field handle and declared type they address.
///
/// Implemented by the host pipeline, which owns the actual session schema;
/// the enrichment cores never hardcode field names.
pub trait FieldRegistry: Send + Sync {
    fn resolve(&self, expr: &str) -> Option<(FieldHandle, FieldKind)>;
}
