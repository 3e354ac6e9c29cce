use capture_types::{IdentifierKind, Operation};
use std::rc::Rc;

/// One document fetched from the store: its tags and the set of index keys
/// it has inserted, so unload can remove them without scanning every index.
#[derive(Debug)]
pub struct FileRecord {
    pub id: String,
    pub md5: String,
    pub kind: IdentifierKind,
    pub tags: Vec<String>,
    /// Raw element text of every data line this file contributed, in the
    /// form it was inserted under (a CIDR string for IP files, the bare
    /// string otherwise).
    pub(crate) keys: Vec<String>,
}

/// A match record: the operations to apply plus a back-pointer to the file
/// that produced them. Held by exactly one per-kind index at a time.
#[derive(Debug)]
pub struct MatchRecord {
    pub file: Rc<FileRecord>,
    pub ops: Vec<Operation>,
}
