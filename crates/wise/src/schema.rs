use crate::client::{ClientError, IntelligenceClient};
use crate::frame::decode_fields;
use capture_types::{FieldHandle, FieldKind, FieldRegistry};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Frame(#[from] crate::frame::FrameError),
}

/// What a remote `remote_field_id` short code resolves to locally: either a
/// typed field handle, or the service's reserved `tags` pseudo-field, whose
/// values become [`capture_types::Operation::TagOp`] rather than a typed
/// field write.
#[derive(Clone, Copy)]
pub enum ResolvedField {
    Field(FieldHandle, FieldKind),
    Tags,
}

/// The negotiated mapping from the service's `remote_field_id` short codes
/// back to local field handles.
///
/// A remote declaring a field name the local registry can't resolve is
/// logged and dropped from the map rather than failing negotiation outright
/// — responses that reference it are simply skipped, the same
/// skip-don't-fail posture the tagger's document parser takes.
#[derive(Default)]
pub struct FieldSchema {
    fields_ts: u32,
    by_short_id: HashMap<u8, ResolvedField>,
}

impl FieldSchema {
    pub fn fields_ts(&self) -> u32 {
        self.fields_ts
    }

    pub fn resolve(&self, short_id: u8) -> Option<ResolvedField> {
        self.by_short_id.get(&short_id).copied()
    }

    /// True once a response's `fields_ts` no longer matches what was last
    /// negotiated, meaning the remote's schema has changed and `/fields`
    /// must be re-fetched before its response can be trusted.
    pub fn is_stale(&self, response_fields_ts: u32) -> bool {
        response_fields_ts != self.fields_ts
    }

    pub async fn negotiate(
        client: &dyn IntelligenceClient,
        registry: &dyn FieldRegistry,
    ) -> Result<FieldSchema, SchemaError> {
        let bytes = client.get_fields().await?;
        let frame = decode_fields(&bytes)?;

        let mut fields_ts = frame.fields_ts;
        let mut by_short_id = HashMap::new();
        for decl in frame.decls {
            if decl.name == "tags" {
                by_short_id.insert(decl.short_id, ResolvedField::Tags);
                continue;
            }
            match registry.resolve(&decl.name) {
                Some((handle, kind)) => {
                    by_short_id.insert(decl.short_id, ResolvedField::Field(handle, kind));
                }
                None => {
                    tracing::warn!(field = %decl.name, "wise remote field unresolvable locally");
                    // An unresolvable name means this schema can't be fully
                    // trusted; zero fields_ts so the next response's
                    // mismatch forces a re-fetch rather than caching the gap.
                    fields_ts = 0;
                }
            }
        }

        Ok(FieldSchema {
            fields_ts,
            by_short_id,
        })
    }
}
