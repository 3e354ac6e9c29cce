use crate::index::LocalIndex;
use crate::parse::parse_document;
use crate::store::{DocumentStoreClient, StoreError};
use capture_types::{apply_all, FieldRegistry, Session};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the local index and its synchronization with the document store.
///
/// Every method takes `&mut self`: there is exactly one tagger per capture
/// thread, and Rust's borrow checker — rather than a mutex — is what
/// enforces the "no concurrent index mutation" invariant from the
/// concurrency model.
pub struct Tagger<S> {
    store: S,
    registry: Arc<dyn FieldRegistry>,
    index: LocalIndex,
}

impl<S: DocumentStoreClient> Tagger<S> {
    pub fn new(store: S, registry: Arc<dyn FieldRegistry>) -> Self {
        Tagger {
            store,
            registry,
            index: LocalIndex::default(),
        }
    }

    /// Synchronous warm start: lists and fetches every current document
    /// before returning, so the index is warm before the first session is
    /// processed. Equivalent to `sync_listing`, just named for the one-time
    /// startup call site.
    pub async fn warm_start(&mut self) -> Result<(), TaggerError> {
        self.sync_listing().await
    }

    /// One iteration of the periodic (60s) poller: lists the namespace,
    /// fetches any id that's new or whose md5 has changed, and applies the
    /// results to the index. Safe to call repeatedly; a slow poll just
    /// delays the next one, it never overlaps with itself because the
    /// caller awaits it to completion.
    pub async fn poll_once(&mut self) -> Result<(), TaggerError> {
        self.sync_listing().await
    }

    async fn sync_listing(&mut self) -> Result<(), TaggerError> {
        let listing = self.store.list().await?;
        for (id, md5) in listing {
            let changed = self.index.file_md5(&id) != Some(md5.as_str());
            if !changed {
                continue;
            }
            match self.store.fetch(&id).await {
                Ok(body) => self.apply_body(&id, &md5, &body),
                Err(err) => {
                    tracing::error!(file = %id, error = %err, "tagger fetch failed");
                }
            }
        }
        Ok(())
    }

    fn apply_body(&mut self, id: &str, listed_md5: &str, body: &serde_json::Value) {
        match parse_document(id, body, self.registry.as_ref()) {
            Ok(parsed) => {
                self.index.load(
                    id,
                    listed_md5.to_string(),
                    parsed.kind,
                    parsed.tags,
                    parsed.entries,
                );
            }
            Err(err) => {
                tracing::error!(file = %id, error = %err, "tagger document parse failed, dropping");
                self.index.unload(id);
            }
        }
    }

    /// Applies every matching operation from the local index to `session`,
    /// per the §4.1 lookup policy: peer and XFF addresses against the IP
    /// trie, HTTP/DNS hosts against the domain index (with suffix-after-
    /// first-dot fallback), HTTP/email MD5s and email addresses and HTTP
    /// URIs against their respective exact-match indexes.
    pub fn lookup_session(&self, session: &mut dyn Session) {
        let mut matches = Vec::new();

        for addr in session.peer_addrs() {
            matches.extend(self.index.lookup_ip(addr));
        }
        for addr in session.xff_addrs() {
            matches.extend(self.index.lookup_ip(addr));
        }
        for host in session.http_hosts().iter().chain(session.dns_hosts().iter()) {
            matches.extend(self.index.lookup_domain(host));
        }
        for digest in session.http_md5s().iter().chain(session.email_md5s().iter()) {
            matches.extend(self.index.lookup_md5(digest));
        }
        for addr in session
            .email_src_addrs()
            .iter()
            .chain(session.email_dst_addrs().iter())
        {
            matches.extend(self.index.lookup_email(addr));
        }
        for uri in &session.http_uris() {
            matches.extend(self.index.lookup_uri(uri));
        }

        for record in matches {
            for tag in &record.file.tags {
                session.add_tag(tag);
            }
            apply_all(&record.ops, session);
        }
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> &LocalIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capture_types::{FieldHandle, FieldKind, FieldValue};
    use std::cell::RefCell;
    use std::net::Ipv4Addr;

    struct FakeStore {
        listing: Vec<(String, String)>,
        bodies: std::collections::HashMap<String, serde_json::Value>,
    }

    #[async_trait]
    impl DocumentStoreClient for FakeStore {
        async fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
            Ok(self.listing.clone())
        }
        async fn fetch(&self, id: &str) -> Result<serde_json::Value, StoreError> {
            Ok(self.bodies[id].clone())
        }
    }

    struct FixedRegistry;
    impl FieldRegistry for FixedRegistry {
        fn resolve(&self, expr: &str) -> Option<(FieldHandle, FieldKind)> {
            match expr {
                "http.uri" => Some((FieldHandle(1), FieldKind::String)),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct FakeSession {
        peers: [Ipv4Addr; 2],
        hosts: Vec<String>,
        tags: RefCell<Vec<String>>,
        fields: RefCell<Vec<(FieldHandle, FieldValue)>>,
    }

    impl Session for FakeSession {
        fn add_tag(&mut self, tag: &str) {
            self.tags.borrow_mut().push(tag.to_string());
        }
        fn apply_field(&mut self, handle: FieldHandle, value: &FieldValue) {
            self.fields.borrow_mut().push((handle, value.clone()));
        }
        fn peer_addrs(&self) -> [Ipv4Addr; 2] {
            self.peers
        }
        fn xff_addrs(&self) -> Vec<Ipv4Addr> {
            Vec::new()
        }
        fn http_hosts(&self) -> Vec<String> {
            self.hosts.clone()
        }
        fn dns_hosts(&self) -> Vec<String> {
            Vec::new()
        }
        fn http_md5s(&self) -> Vec<String> {
            Vec::new()
        }
        fn email_md5s(&self) -> Vec<String> {
            Vec::new()
        }
        fn email_src_addrs(&self) -> Vec<String> {
            Vec::new()
        }
        fn email_dst_addrs(&self) -> Vec<String> {
            Vec::new()
        }
        fn http_uris(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn e1_hostname_suffix_match_applies_tag_and_field() {
        let store = FakeStore {
            listing: vec![("A".into(), "md5-a".into())],
            bodies: [(
                "A".to_string(),
                serde_json::json!({
                    "md5": "md5-a",
                    "type": "h",
                    "tags": "t1",
                    "fields": "http.uri",
                    "data": "example.com;0=hit",
                }),
            )]
            .into_iter()
            .collect(),
        };
        let mut tagger = Tagger::new(store, Arc::new(FixedRegistry));
        tagger.warm_start().await.unwrap();

        let mut session = FakeSession {
            hosts: vec!["foo.example.com".into()],
            ..Default::default()
        };
        tagger.lookup_session(&mut session);

        assert_eq!(session.tags.borrow().as_slice(), ["t1"]);
        assert_eq!(
            session.fields.borrow().as_slice(),
            [(FieldHandle(1), FieldValue::Str("hit".into()))]
        );
    }

    #[tokio::test]
    async fn e2_cidr_match_is_scoped_to_the_prefix() {
        let store = FakeStore {
            listing: vec![("B".into(), "md5-b".into())],
            bodies: [(
                "B".to_string(),
                serde_json::json!({
                    "md5": "md5-b",
                    "type": "i",
                    "data": "10.0.0.0/24;tags=net",
                }),
            )]
            .into_iter()
            .collect(),
        };
        let mut tagger = Tagger::new(store, Arc::new(FixedRegistry));
        tagger.warm_start().await.unwrap();

        let mut hit = FakeSession {
            peers: ["10.0.0.5".parse().unwrap(), Ipv4Addr::UNSPECIFIED],
            ..Default::default()
        };
        tagger.lookup_session(&mut hit);
        assert_eq!(hit.tags.borrow().as_slice(), ["net"]);

        let mut miss = FakeSession {
            peers: [Ipv4Addr::UNSPECIFIED, "10.0.1.5".parse().unwrap()],
            ..Default::default()
        };
        tagger.lookup_session(&mut miss);
        assert!(miss.tags.borrow().is_empty());
    }

    #[test]
    fn stale_file_persists_until_document_reappears() {
        // A file removed from the listing is not proactively evicted (§4.1
        // step 4); this is a documented limitation, not a bug, so there's
        // no API to prune by listing absence.
        let index = LocalIndex::default();
        assert_eq!(index.file_count(), 0);
    }
}
