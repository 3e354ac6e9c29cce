use crate::cache::KindCache;
use crate::client::{ClientError, IntelligenceClient};
use crate::frame::{decode_response, encode_request, FrameError};
use crate::kind::{kind_index, Kind};
use crate::schema::{FieldSchema, ResolvedField, SchemaError};
use capture_types::{FieldHandle, FieldKind, FieldRegistry, Operation};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum WiseError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A `/get` batch caps at this many entries; a larger queue is split across
/// more than one flush.
pub const MAX_BATCH: usize = 256;
/// Soft threshold at which the owning task should flush early instead of
/// waiting for the 1s timer tick.
pub const SOFT_FLUSH_THRESHOLD: usize = 128;

/// The result of a single lookup against the remote cache.
pub enum Lookup {
    /// A fresh or previously cached hit: apply these operations to the
    /// session immediately.
    Hit(Vec<Operation>),
    /// Queued for (or already awaiting) a remote round-trip. The caller's
    /// per-session outstanding counter should be incremented; the eventual
    /// result for this and every other session that asked arrives via
    /// [`Wise::drain_resolved`].
    Deferred,
}

/// Owns the four per-kind caches, the pending outbound batch, and the
/// negotiated field schema.
///
/// `Wise` never holds a session reference across an `.await` point: callers
/// pass an opaque, `Clone + Eq + Hash` session ticket (`Id`) at lookup time,
/// and collect `(Id, Vec<Operation>)` pairs back out of [`drain_resolved`]
/// once a batch resolves. This mirrors the tagger's single-owner,
/// never-shared-behind-a-mutex design, without requiring `Wise` to own or
/// borrow the pipeline's actual session objects.
pub struct Wise<C, Id> {
    client: C,
    schema: FieldSchema,
    caches: Vec<KindCache<Id>>,
    pending_request: Vec<(Kind, String)>,
    resolved: Vec<(Id, Vec<Operation>)>,
}

impl<C: IntelligenceClient, Id: Clone> Wise<C, Id> {
    pub async fn connect(
        client: C,
        registry: &dyn FieldRegistry,
        max_cache_per_kind: usize,
        cache_ttl: Duration,
    ) -> Result<Self, WiseError> {
        let schema = FieldSchema::negotiate(&client, registry).await?;
        Ok(Wise {
            client,
            schema,
            caches: Kind::ALL
                .iter()
                .map(|_| KindCache::new(max_cache_per_kind, cache_ttl))
                .collect(),
            pending_request: Vec::new(),
            resolved: Vec::new(),
        })
    }

    fn cache(&self, kind: Kind) -> &KindCache<Id> {
        &self.caches[kind_index(kind)]
    }

    fn cache_mut(&mut self, kind: Kind) -> &mut KindCache<Id> {
        &mut self.caches[kind_index(kind)]
    }

    /// Looks up `key` under `kind` as of `now`. A fresh cache hit applies
    /// immediately (the caller does so); a miss, an expired cache entry, or
    /// an already-pending key enqueues `session` to be resolved on the next
    /// successful flush.
    pub fn lookup(&mut self, kind: Kind, key: &str, session: Id, now: Instant) -> Lookup {
        if let Some(ops) = self.cache_mut(kind).take_cached_if_fresh(key, now) {
            return Lookup::Hit(ops);
        }

        let created = self.cache_mut(kind).begin_pending(key);
        self.cache_mut(kind).attach_session(key, session);
        if created {
            self.pending_request.push((kind, key.to_string()));
        }
        Lookup::Deferred
    }

    pub fn queued_len(&self) -> usize {
        self.pending_request.len()
    }

    /// True once the queue has crossed the soft threshold and the owning
    /// task should flush ahead of its regular timer tick.
    pub fn should_flush_now(&self) -> bool {
        self.pending_request.len() >= SOFT_FLUSH_THRESHOLD
    }

    /// Drains up to [`MAX_BATCH`] queued entries and round-trips them to the
    /// intelligence service.
    ///
    /// A transport error or a malformed/version-mismatched response drops
    /// every entry in the batch back to absent (no caching of the failure,
    /// per the no-negative-caching rule); the sessions that were waiting on
    /// them are not resolved by this flush; they remain counted against
    /// their session's outstanding total until a later lookup re-queues the
    /// same key; or until a different enrichment path decrements the
    /// counter. A response whose `fields_ts` has drifted re-negotiates the
    /// schema and likewise drops the batch, since its field ids can no
    /// longer be trusted.
    pub async fn flush(&mut self, registry: &dyn FieldRegistry) -> Result<(), WiseError> {
        if self.pending_request.is_empty() {
            return Ok(());
        }
        let take = self.pending_request.len().min(MAX_BATCH);
        let batch: Vec<(Kind, String)> = self.pending_request.drain(..take).collect();

        let body = encode_request(&batch);
        let bytes = match self.client.post_get(body).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.drop_batch(&batch);
                return Err(err.into());
            }
        };

        let response = match decode_response(&bytes) {
            Ok(response) => response,
            Err(err) => {
                self.drop_batch(&batch);
                return Err(err.into());
            }
        };

        if self.schema.is_stale(response.fields_ts) {
            self.drop_batch(&batch);
            self.schema = FieldSchema::negotiate(&self.client, registry).await?;
            return Ok(());
        }

        let now = Instant::now();
        for ((kind, key), entry) in batch.iter().zip(response.entries.iter()) {
            let ops: Vec<Operation> = entry
                .iter()
                .filter_map(|(field_id, value)| build_op(&self.schema, *field_id, value))
                .collect();
            let waiters = self.cache_mut(*kind).resolve(key, ops.clone(), now);
            self.resolved.extend(waiters.into_iter().map(|id| (id, ops.clone())));
        }

        Ok(())
    }

    fn drop_batch(&mut self, batch: &[(Kind, String)]) {
        for (kind, key) in batch {
            self.cache_mut(*kind).drop_key(key);
        }
    }

    /// Takes every `(session, ops)` pair resolved since the last call. The
    /// caller applies each to its session and decrements that session's
    /// outstanding counter.
    pub fn drain_resolved(&mut self) -> Vec<(Id, Vec<Operation>)> {
        std::mem::take(&mut self.resolved)
    }

    #[cfg(test)]
    pub(crate) fn cached_len(&self, kind: Kind) -> usize {
        self.cache(kind).cached_len()
    }
}

fn build_op(schema: &FieldSchema, field_id: u8, value: &[u8]) -> Option<Operation> {
    match schema.resolve(field_id)? {
        ResolvedField::Tags => {
            Some(Operation::TagOp(String::from_utf8_lossy(value).into_owned()))
        }
        ResolvedField::Field(handle, FieldKind::Integer) => {
            let n: u32 = std::str::from_utf8(value).ok()?.trim_end_matches('\0').parse().ok()?;
            Some(Operation::IntOp(handle, n))
        }
        ResolvedField::Field(handle, FieldKind::Ip) => {
            let addr: Ipv4Addr = std::str::from_utf8(value)
                .ok()?
                .trim_end_matches('\0')
                .parse()
                .ok()?;
            Some(Operation::IpOp(handle, addr))
        }
        ResolvedField::Field(handle, FieldKind::String) => Some(Operation::StrOp(
            handle,
            String::from_utf8_lossy(value).into_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode_fields;
    use async_trait::async_trait;
    use byteorder::{BigEndian, WriteBytesExt};
    use bytes::Bytes;
    use std::io::Write;
    use std::sync::Mutex;

    struct FixedRegistry;
    impl FieldRegistry for FixedRegistry {
        fn resolve(&self, expr: &str) -> Option<(FieldHandle, FieldKind)> {
            match expr {
                "http.uri" => Some((FieldHandle(1), FieldKind::String)),
                "asn" => Some((FieldHandle(2), FieldKind::Integer)),
                _ => None,
            }
        }
    }

    fn fields_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(7).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u8(1).unwrap();
        buf.write_u16::<BigEndian>(9).unwrap();
        buf.write_all(b"http.uri\0").unwrap();
        assert!(decode_fields(&buf).is_ok());
        buf
    }

    struct ScriptedClient {
        fields: Vec<u8>,
        /// One scripted `/get` response per call, returned in order.
        responses: Mutex<Vec<Result<Vec<u8>, ()>>>,
    }

    #[async_trait]
    impl IntelligenceClient for ScriptedClient {
        async fn get_fields(&self) -> Result<Bytes, ClientError> {
            Ok(Bytes::from(self.fields.clone()))
        }
        async fn post_get(&self, _body: Vec<u8>) -> Result<Bytes, ClientError> {
            match self.responses.lock().unwrap().remove(0) {
                Ok(bytes) => Ok(Bytes::from(bytes)),
                Err(()) => Err(ClientError::Transport(
                    reqwest::Client::new()
                        .get("not a valid url")
                        .build()
                        .unwrap_err(),
                )),
            }
        }
    }

    fn response_with_one_string_hit(value: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(7).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u8(1).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u8(value.len() as u8).unwrap();
        buf.write_all(value.as_bytes()).unwrap();
        buf
    }

    #[tokio::test]
    async fn miss_then_resolve_delivers_ops_to_every_waiting_session() {
        let client = ScriptedClient {
            fields: fields_bytes(),
            responses: Mutex::new(vec![Ok(response_with_one_string_hit("hit"))]),
        };
        let mut wise = Wise::connect(client, &FixedRegistry, 100, Duration::from_secs(600))
            .await
            .unwrap();
        let now = Instant::now();

        assert!(matches!(
            wise.lookup(Kind::Domain, "example.com", 1u32, now),
            Lookup::Deferred
        ));
        assert!(matches!(
            wise.lookup(Kind::Domain, "example.com", 2u32, now),
            Lookup::Deferred
        ));
        assert_eq!(wise.queued_len(), 1);

        wise.flush(&FixedRegistry).await.unwrap();

        let resolved = wise.drain_resolved();
        assert_eq!(resolved.len(), 2);
        let ids: Vec<u32> = resolved.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
        for (_, ops) in &resolved {
            assert_eq!(ops, &vec![Operation::StrOp(FieldHandle(1), "hit".into())]);
        }

        match wise.lookup(Kind::Domain, "example.com", 3u32, now) {
            Lookup::Hit(ops) => {
                assert_eq!(ops, vec![Operation::StrOp(FieldHandle(1), "hit".into())])
            }
            Lookup::Deferred => panic!("expected cache hit after resolve"),
        }
    }

    #[tokio::test]
    async fn transport_failure_frees_the_batch_without_resolving_waiters() {
        let client = ScriptedClient {
            fields: fields_bytes(),
            responses: Mutex::new(vec![Err(())]),
        };
        let mut wise = Wise::connect(client, &FixedRegistry, 100, Duration::from_secs(600))
            .await
            .unwrap();
        let now = Instant::now();
        wise.lookup(Kind::Md5, "d41d8cd98f00b204e9800998ecf8427e", 1u32, now);

        assert!(wise.flush(&FixedRegistry).await.is_err());
        assert!(wise.drain_resolved().is_empty());

        // The key reverted to absent: looking it up again re-queues it
        // rather than returning a (nonexistent) cached value.
        assert!(matches!(
            wise.lookup(Kind::Md5, "d41d8cd98f00b204e9800998ecf8427e", 2u32, now),
            Lookup::Deferred
        ));
        assert_eq!(wise.queued_len(), 1);
    }

    #[tokio::test]
    async fn resolved_entries_respect_the_per_kind_cache_cap() {
        let client = ScriptedClient {
            fields: fields_bytes(),
            responses: Mutex::new(vec![
                Ok(response_with_one_string_hit("a")),
                Ok(response_with_one_string_hit("b")),
            ]),
        };
        let mut wise = Wise::connect(client, &FixedRegistry, 1, Duration::from_secs(600))
            .await
            .unwrap();
        let now = Instant::now();

        wise.lookup(Kind::Domain, "a.com", 1u32, now);
        wise.flush(&FixedRegistry).await.unwrap();
        wise.lookup(Kind::Domain, "b.com", 2u32, now);
        wise.flush(&FixedRegistry).await.unwrap();

        assert_eq!(wise.cached_len(Kind::Domain), 1);
        assert!(matches!(
            wise.lookup(Kind::Domain, "a.com", 3u32, now),
            Lookup::Deferred
        ));
    }
}
