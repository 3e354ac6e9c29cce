//! The local intelligence index ("tagger"): documents synced from a
//! document store, applied to sessions as they finalize.
//!
//! [`Tagger`] is deliberately `!Send`: its index uses `Rc`, not `Arc`, so
//! that the single-writer invariant from the concurrency model is enforced
//! by the borrow checker rather than a mutex the capture thread never
//! actually contends on.

mod file;
mod index;
mod ip_trie;
mod parse;
mod store;
mod tagger;

pub use file::{FileRecord, MatchRecord};
pub use index::LocalIndex;
pub use parse::{parse_document, ParseError, ParsedFile};
pub use store::{DocumentStoreClient, HttpDocumentStore, StoreError};
pub use tagger::{Tagger, TaggerError};
