//! The remote cache batcher ("wise"): per-kind LRU-cached, batched lookups
//! against an intelligence service, with a custom binary wire protocol for
//! schema negotiation and request/response framing.
//!
//! Like the tagger, [`Wise`] is meant to be owned by a single task and
//! never shared behind a lock; unlike the tagger it's generic over an
//! opaque session ticket type rather than a `&mut dyn Session`, because a
//! lookup may not resolve until long after the call that issued it.

mod cache;
mod client;
mod frame;
mod kind;
mod schema;
#[allow(clippy::module_inception)]
mod wise;

pub use client::{ClientError, HttpIntelligenceClient, IntelligenceClient};
pub use frame::FrameError;
pub use kind::{normalize_domain, DomainLookup, Kind};
pub use schema::{FieldSchema, ResolvedField, SchemaError};
pub use wise::{Lookup, Wise, WiseError, MAX_BATCH, SOFT_FLUSH_THRESHOLD};
