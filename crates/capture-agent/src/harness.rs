use crate::config::AgentConfig;
use crate::registry::StaticFieldRegistry;
use async_trait::async_trait;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use capture_types::{apply_all, FieldHandle, FieldValue, Session};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write as _};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{Duration, Instant};
use tagger::{DocumentStoreClient, StoreError, Tagger};
use wise::{ClientError, IntelligenceClient, Kind, Lookup, Wise};
use writer::{DiskWriter, DiskWriterConfig, SequentialFileAllocator, WriteMethod};

/// A reconstructed session, synthesized rather than read off the wire: the
/// harness plays the role the out-of-scope capture pipeline plays in
/// production, so this is the only place that ever constructs one.
struct SyntheticSession {
    id: u32,
    peers: [Ipv4Addr; 2],
    xff: Vec<Ipv4Addr>,
    http_hosts: Vec<String>,
    dns_hosts: Vec<String>,
    http_md5s: Vec<String>,
    email_md5s: Vec<String>,
    email_src: Vec<String>,
    email_dst: Vec<String>,
    http_uris: Vec<String>,
    tags: Vec<String>,
    fields: Vec<(FieldHandle, FieldValue)>,
    outstanding: u32,
}

impl SyntheticSession {
    fn new(id: u32) -> Self {
        SyntheticSession {
            id,
            peers: [Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED],
            xff: Vec::new(),
            http_hosts: Vec::new(),
            dns_hosts: Vec::new(),
            http_md5s: Vec::new(),
            email_md5s: Vec::new(),
            email_src: Vec::new(),
            email_dst: Vec::new(),
            http_uris: Vec::new(),
            tags: Vec::new(),
            fields: Vec::new(),
            outstanding: 0,
        }
    }
}

impl Session for SyntheticSession {
    fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
    fn apply_field(&mut self, handle: FieldHandle, value: &FieldValue) {
        self.fields.push((handle, value.clone()));
    }
    fn peer_addrs(&self) -> [Ipv4Addr; 2] {
        self.peers
    }
    fn xff_addrs(&self) -> Vec<Ipv4Addr> {
        self.xff.clone()
    }
    fn http_hosts(&self) -> Vec<String> {
        self.http_hosts.clone()
    }
    fn dns_hosts(&self) -> Vec<String> {
        self.dns_hosts.clone()
    }
    fn http_md5s(&self) -> Vec<String> {
        self.http_md5s.clone()
    }
    fn email_md5s(&self) -> Vec<String> {
        self.email_md5s.clone()
    }
    fn email_src_addrs(&self) -> Vec<String> {
        self.email_src.clone()
    }
    fn email_dst_addrs(&self) -> Vec<String> {
        self.email_dst.clone()
    }
    fn http_uris(&self) -> Vec<String> {
        self.http_uris.clone()
    }
}

/// Builds a handful of sessions exercising both enrichment cores: a
/// hostname-suffix tagger match, a CIDR tagger match, and a wise MD5 batch
/// hit, plus one session with nothing to match at all.
fn synthetic_sessions() -> Vec<SyntheticSession> {
    let mut hostname_match = SyntheticSession::new(1);
    hostname_match.http_hosts.push("foo.example.com".to_string());

    let mut cidr_match = SyntheticSession::new(2);
    cidr_match.peers = ["10.0.0.5".parse().unwrap(), Ipv4Addr::UNSPECIFIED];

    let mut wise_hit = SyntheticSession::new(3);
    wise_hit
        .http_md5s
        .push("d41d8cd98f00b204e9800998ecf8427e".to_string());

    let plain = SyntheticSession::new(4);

    vec![hostname_match, cidr_match, wise_hit, plain]
}

/// A fixed pair of tagger documents standing in for the document store,
/// covering the same hostname-suffix and CIDR shapes used above.
struct FakeDocumentStore;

#[async_trait]
impl DocumentStoreClient for FakeDocumentStore {
    async fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(vec![
            ("hostname-file".to_string(), "md5-hostname".to_string()),
            ("cidr-file".to_string(), "md5-cidr".to_string()),
        ])
    }

    async fn fetch(&self, id: &str) -> Result<serde_json::Value, StoreError> {
        let body = match id {
            "hostname-file" => serde_json::json!({
                "md5": "md5-hostname",
                "type": "h",
                "tags": "t1",
                "fields": "http.uri",
                "data": "example.com;0=hit",
            }),
            "cidr-file" => serde_json::json!({
                "md5": "md5-cidr",
                "type": "i",
                "data": "10.0.0.0/24;tags=net",
            }),
            other => {
                tracing::error!(id = other, "synthetic document store has no such file");
                return Err(StoreError::Malformed("unknown synthetic document id"));
            }
        };
        Ok(body)
    }
}

/// A fixed remote schema (just the `tags` pseudo-field) and a canned
/// `/get` response table keyed by `(kind, key)`, standing in for the
/// intelligence service.
struct FakeIntelligenceClient {
    canned: HashMap<(u8, String), Vec<(u8, Vec<u8>)>>,
}

impl FakeIntelligenceClient {
    fn new() -> Self {
        let mut canned = HashMap::new();
        // "tags" is the only declared field (short_id 0, its index in the
        // fields frame below).
        canned.insert(
            (Kind::Md5.wire_id(), "d41d8cd98f00b204e9800998ecf8427e".to_string()),
            vec![(0u8, b"empty-file-hash".to_vec())],
        );
        FakeIntelligenceClient { canned }
    }
}

#[async_trait]
impl IntelligenceClient for FakeIntelligenceClient {
    async fn get_fields(&self) -> Result<Bytes, ClientError> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(1).unwrap(); // fields_ts
        buf.write_u32::<BigEndian>(0).unwrap(); // version
        buf.write_u8(1).unwrap(); // count
        buf.write_u16::<BigEndian>(5).unwrap(); // len, including NUL terminator
        buf.write_all(b"tags\0").unwrap();
        Ok(Bytes::from(buf))
    }

    async fn post_get(&self, body: Vec<u8>) -> Result<Bytes, ClientError> {
        let entries = decode_request_keys(&body);

        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(1).unwrap(); // fields_ts, matching get_fields
        buf.write_u32::<BigEndian>(0).unwrap(); // version
        for (kind_byte, key) in &entries {
            match self.canned.get(&(*kind_byte, key.clone())) {
                Some(ops) => {
                    buf.write_u8(ops.len() as u8).unwrap();
                    for (field_id, value) in ops {
                        buf.write_u8(*field_id).unwrap();
                        buf.write_u8(value.len() as u8).unwrap();
                        buf.write_all(value).unwrap();
                    }
                }
                None => buf.write_u8(0).unwrap(),
            }
        }
        Ok(Bytes::from(buf))
    }
}

/// Decodes just the `(kind, key)` pairs out of a `/get` request body; the
/// harness doesn't need the full client-side framing helpers from
/// `wise::frame`; those are private to that crate.
fn decode_request_keys(body: &[u8]) -> Vec<(u8, String)> {
    let mut cur = Cursor::new(body);
    let mut out = Vec::new();
    while (cur.position() as usize) < body.len() {
        let Ok(kind_byte) = cur.read_u8() else { break };
        let Ok(len) = cur.read_u16::<BigEndian>() else { break };
        let mut key = vec![0u8; len as usize];
        if cur.read_exact(&mut key).is_err() {
            break;
        }
        out.push((kind_byte, String::from_utf8_lossy(&key).into_owned()));
    }
    out
}

/// Tallies what the run actually did, logged at the end as a summary rather
/// than returned for further processing.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sessions: usize,
    pub tags_applied: usize,
    pub fields_applied: usize,
    pub wise_hits: usize,
    pub wise_deferred: usize,
    pub packets_written: usize,
}

/// Wires the tagger, wise, and disk writer cores together against the
/// synthetic sessions above, end to end: tagger lookups apply inline, wise
/// lookups batch and resolve, and every session's packets land in a real
/// PCAP file under `out_dir`.
pub async fn run_smoke_test(
    cfg: &AgentConfig,
    write_method: WriteMethod,
    out_dir: &Path,
) -> anyhow::Result<RunSummary> {
    let registry = StaticFieldRegistry;

    let mut tagger = Tagger::new(FakeDocumentStore, std::sync::Arc::new(StaticFieldRegistry));
    tagger.warm_start().await?;

    let mut wise: Wise<FakeIntelligenceClient, u32> = Wise::connect(
        FakeIntelligenceClient::new(),
        &registry,
        cfg.wise_max_cache,
        Duration::from_secs(cfg.wise_cache_secs as u64),
    )
    .await?;

    let mut writer = DiskWriter::new(
        DiskWriterConfig {
            write_method,
            pcap_write_size: cfg.pcap_write_size,
            max_file_size_bytes: cfg.max_file_size_bytes,
            max_file_time: cfg.max_file_time(),
            max_free_output_buffers: cfg.max_free_output_buffers,
            snaplen: 65535,
            linktype: 1,
        },
        Box::new(SequentialFileAllocator::new(out_dir)),
    )?;

    let mut sessions = synthetic_sessions();
    let mut summary = RunSummary {
        sessions: sessions.len(),
        ..Default::default()
    };

    for session in sessions.iter_mut() {
        tagger.lookup_session(session);

        let md5s: Vec<String> = session
            .http_md5s
            .iter()
            .chain(session.email_md5s.iter())
            .cloned()
            .collect();
        let now = Instant::now();
        for md5 in &md5s {
            match wise.lookup(Kind::Md5, md5, session.id, now) {
                Lookup::Hit(ops) => {
                    apply_all(&ops, session);
                    summary.wise_hits += 1;
                }
                Lookup::Deferred => {
                    session.outstanding += 1;
                    summary.wise_deferred += 1;
                }
            }
        }
    }

    wise.flush(&registry).await?;
    for (id, ops) in wise.drain_resolved() {
        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            apply_all(&ops, session);
            session.outstanding = session.outstanding.saturating_sub(1);
        }
    }

    let base_ts = 1_700_000_000u32;
    for (i, session) in sessions.iter().enumerate() {
        let payload = synthetic_payload(session.id);
        writer.write_packet(
            base_ts + i as u32,
            0,
            payload.len() as u32,
            payload.len() as u32,
            &payload,
        )?;
        summary.packets_written += 1;
    }
    writer.tick_rotation_check(Instant::now())?;
    writer.exit()?;

    for session in &sessions {
        summary.tags_applied += session.tags.len();
        summary.fields_applied += session.fields.len();
        if session.outstanding != 0 {
            tracing::warn!(
                session = session.id,
                outstanding = session.outstanding,
                "session finished the run with a nonzero wise outstanding counter"
            );
        }
    }

    Ok(summary)
}

fn synthetic_payload(session_id: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 64];
    payload[0..4].copy_from_slice(&session_id.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> AgentConfig {
        AgentConfig {
            wise_host: "127.0.0.1".to_string(),
            wise_port: 8081,
            wise_max_conns: 10,
            wise_max_requests: 100,
            wise_max_cache: 100,
            wise_cache_secs: 600,
            pcap_write_method: "normal".to_string(),
            pcap_write_size: 4096,
            max_file_size_bytes: 1 << 30,
            max_file_time_minutes: None,
            max_free_output_buffers: 4,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn smoke_test_exercises_both_cores_and_writes_packets() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let summary = run_smoke_test(&cfg, WriteMethod::Normal, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.sessions, 4);
        assert_eq!(summary.packets_written, 4);
        // hostname-suffix match contributes one tag and one field; CIDR
        // match contributes one tag; the wise MD5 hit contributes one tag.
        assert_eq!(summary.tags_applied, 3);
        assert_eq!(summary.fields_applied, 1);
        assert_eq!(summary.wise_deferred, 1);
    }
}
