use crate::file::{FileRecord, MatchRecord};
use crate::ip_trie::{parse_cidr, IpTrie};
use capture_types::IdentifierKind;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

/// The five per-kind associative containers, plus the file registry that
/// every match record's back-pointer must stay consistent with.
#[derive(Default)]
pub struct LocalIndex {
    all_files: HashMap<String, Rc<FileRecord>>,
    ip: IpTrie,
    domain: HashMap<String, Vec<MatchRecord>>,
    md5: HashMap<String, Vec<MatchRecord>>,
    email: HashMap<String, Vec<MatchRecord>>,
    uri: HashMap<String, Vec<MatchRecord>>,
}

impl LocalIndex {
    pub fn file_md5(&self, id: &str) -> Option<&str> {
        self.all_files.get(id).map(|f| f.md5.as_str())
    }

    pub fn contains_file(&self, id: &str) -> bool {
        self.all_files.contains_key(id)
    }

    pub fn file_count(&self) -> usize {
        self.all_files.len()
    }

    /// Removes every match record belonging to `id`, then drops the file
    /// itself. A no-op if `id` isn't present.
    pub fn unload(&mut self, id: &str) {
        let Some(file) = self.all_files.remove(id) else {
            return;
        };
        for key in &file.keys {
            match file.kind {
                IdentifierKind::Ip => {
                    if let Some((prefix, len)) = parse_cidr(key) {
                        self.ip.remove(prefix, len, id);
                    }
                }
                IdentifierKind::Domain => retain_not(&mut self.domain, key, id),
                IdentifierKind::Md5 => retain_not(&mut self.md5, key, id),
                IdentifierKind::Email => retain_not(&mut self.email, key, id),
                IdentifierKind::Uri => retain_not(&mut self.uri, key, id),
            }
        }
    }

    /// Inserts a freshly-parsed file, replacing whatever file previously
    /// occupied `id` (unloading its match records first). An element that
    /// fails to parse for its kind (currently only malformed CIDRs) is
    /// logged and skipped rather than aborting the whole file: the file
    /// still gets registered in `all_files` with whatever entries did parse,
    /// so no match record is ever left pointing at an unregistered file.
    pub fn load(
        &mut self,
        id: &str,
        md5: String,
        kind: IdentifierKind,
        tags: Vec<String>,
        entries: Vec<(String, Vec<capture_types::Operation>)>,
    ) {
        self.unload(id);

        let keys: Vec<String> = entries.iter().map(|(element, _)| element.clone()).collect();
        let file = Rc::new(FileRecord {
            id: id.to_string(),
            md5,
            kind,
            tags,
            keys,
        });

        for (element, ops) in entries {
            let record = MatchRecord {
                file: file.clone(),
                ops,
            };
            match kind {
                IdentifierKind::Ip => match parse_cidr(&element) {
                    Some((prefix, len)) => self.ip.insert(prefix, len, record),
                    None => {
                        tracing::warn!(file = %id, element = %element, "skipping malformed CIDR element");
                    }
                },
                IdentifierKind::Domain => self.domain.entry(element).or_default().push(record),
                IdentifierKind::Md5 => self.md5.entry(element).or_default().push(record),
                IdentifierKind::Email => self.email.entry(element).or_default().push(record),
                IdentifierKind::Uri => self.uri.entry(element).or_default().push(record),
            }
        }

        self.all_files.insert(id.to_string(), file);
    }

    pub fn lookup_ip(&self, addr: Ipv4Addr) -> Vec<&MatchRecord> {
        self.ip.lookup_all(addr)
    }

    /// Exact match, then (if the host has a dot) the substring after the
    /// first dot — `foo.example.com` also checks `example.com`.
    pub fn lookup_domain(&self, host: &str) -> Vec<&MatchRecord> {
        let mut out = Vec::new();
        if let Some(v) = self.domain.get(host) {
            out.extend(v.iter());
        }
        if let Some(dot) = host.find('.') {
            let suffix = &host[dot + 1..];
            if let Some(v) = self.domain.get(suffix) {
                out.extend(v.iter());
            }
        }
        out
    }

    pub fn lookup_md5(&self, digest: &str) -> Vec<&MatchRecord> {
        self.md5.get(digest).map(collect).unwrap_or_default()
    }

    pub fn lookup_email(&self, address: &str) -> Vec<&MatchRecord> {
        self.email.get(address).map(collect).unwrap_or_default()
    }

    pub fn lookup_uri(&self, uri: &str) -> Vec<&MatchRecord> {
        self.uri.get(uri).map(collect).unwrap_or_default()
    }

    /// Every match record reachable from any index, for invariant checks.
    #[cfg(test)]
    pub fn all_match_records(&self) -> Vec<&MatchRecord> {
        let mut out = Vec::new();
        out.extend(self.domain.values().flatten());
        out.extend(self.md5.values().flatten());
        out.extend(self.email.values().flatten());
        out.extend(self.uri.values().flatten());
        out.extend(self.ip.lookup_all(Ipv4Addr::UNSPECIFIED));
        out
    }
}

fn collect(v: &Vec<MatchRecord>) -> Vec<&MatchRecord> {
    v.iter().collect()
}

fn retain_not(map: &mut HashMap<String, Vec<MatchRecord>>, key: &str, file_id: &str) {
    if let Some(v) = map.get_mut(key) {
        v.retain(|r| r.file.id != file_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_types::Operation;

    #[test]
    fn reload_with_identical_md5_is_a_no_op_shape() {
        let mut index = LocalIndex::default();
        let entries = vec![("example.com".to_string(), vec![Operation::TagOp("t1".into())])];
        index.load("A", "md5-1".into(), IdentifierKind::Domain, vec!["t1".into()], entries.clone());
        let before = index.lookup_domain("example.com").len();

        index.load("A", "md5-1".into(), IdentifierKind::Domain, vec!["t1".into()], entries);
        let after = index.lookup_domain("example.com").len();
        assert_eq!(before, after);
        assert_eq!(after, 1);
    }

    #[test]
    fn unload_removes_file_and_its_records() {
        let mut index = LocalIndex::default();
        index.load(
            "A",
            "md5-1".into(),
            IdentifierKind::Md5,
            vec![],
            vec![("d41d8cd98f00b204e9800998ecf8427e".to_string(), vec![])],
        );
        assert_eq!(index.lookup_md5("d41d8cd98f00b204e9800998ecf8427e").len(), 1);

        index.unload("A");
        assert!(!index.contains_file("A"));
        assert_eq!(index.lookup_md5("d41d8cd98f00b204e9800998ecf8427e").len(), 0);
    }

    #[test]
    fn back_pointer_invariant_holds_after_load_unload_sequence() {
        let mut index = LocalIndex::default();
        index.load(
            "A",
            "1".into(),
            IdentifierKind::Email,
            vec![],
            vec![("a@example.com".to_string(), vec![])],
        );
        index.load(
            "B",
            "1".into(),
            IdentifierKind::Email,
            vec![],
            vec![("b@example.com".to_string(), vec![])],
        );
        index.unload("A");

        for record in index.all_match_records() {
            assert!(index.contains_file(&record.file.id));
        }
    }

    #[test]
    fn malformed_cidr_element_is_skipped_not_fatal_to_the_file() {
        let mut index = LocalIndex::default();
        index.load(
            "A",
            "1".into(),
            IdentifierKind::Ip,
            vec![],
            vec![
                ("not-a-cidr".to_string(), vec![]),
                ("10.0.0.0/8".to_string(), vec![]),
            ],
        );

        // The file is registered despite the one bad element, and the valid
        // element's record is reachable and correctly back-pointed.
        assert!(index.contains_file("A"));
        let hits = index.lookup_ip("10.1.2.3".parse().unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file.id, "A");

        for record in index.all_match_records() {
            assert!(index.contains_file(&record.file.id));
        }
    }
}
