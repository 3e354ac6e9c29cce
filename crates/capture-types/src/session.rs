use crate::{FieldHandle, FieldValue};
use std::net::Ipv4Addr;

/// A reconstructed session, as built by the (out-of-scope) capture pipeline.
///
/// The enrichment cores never reconstruct sessions themselves; they read the
/// identifier fields below and mutate the session in place via `add_tag` and
/// `apply_field`. Implementations own the actual field storage and schema.
pub trait Session: Send {
    /// Adds a tag by name. Idempotent: adding the same tag twice has no
    /// additional effect.
    fn add_tag(&mut self, tag: &str);

    /// Applies a typed field value to the slot addressed by `handle`.
    /// `handle` is never [`FieldHandle::TAGS`]; tag operations are routed to
    /// `add_tag` instead.
    fn apply_field(&mut self, handle: FieldHandle, value: &FieldValue);

    /// The session's two peer addresses, queried against the IP index.
    fn peer_addrs(&self) -> [Ipv4Addr; 2];

    /// Addresses carried in the session's X-Forwarded-For field set, queried
    /// the same way as a peer address.
    fn xff_addrs(&self) -> Vec<Ipv4Addr>;

    /// HTTP Host and DNS query host strings.
    fn http_hosts(&self) -> Vec<String>;
    fn dns_hosts(&self) -> Vec<String>;

    /// MD5 content digests observed over HTTP and email bodies.
    fn http_md5s(&self) -> Vec<String>;
    fn email_md5s(&self) -> Vec<String>;

    /// Email addresses observed as sender and as recipient, respectively.
    fn email_src_addrs(&self) -> Vec<String>;
    fn email_dst_addrs(&self) -> Vec<String>;

    /// HTTP request path strings.
    fn http_uris(&self) -> Vec<String>;
}
