//! Shared types for the capture agent's enrichment cores: the session
//! interface the host pipeline implements, the field/operation model that
//! both the tagger and wise crates produce, and the identifier namespaces
//! they index by.

mod field;
mod identifier;
mod operation;
mod session;

pub use field::{FieldHandle, FieldKind, FieldRegistry, FieldValue};
pub use identifier::IdentifierKind;
pub use operation::{apply_all, Operation};
pub use session::Session;
