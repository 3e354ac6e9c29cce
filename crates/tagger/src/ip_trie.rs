use crate::file::MatchRecord;
use std::net::Ipv4Addr;

/// A binary radix trie over 32-bit IPv4 prefixes.
///
/// Lookups return every match record reachable on the path from the root to
/// the address's leaf, i.e. all covering prefixes, not just the longest one
/// — a `/8` and a `/24` covering the same address both contribute.
#[derive(Default)]
struct TrieNode {
    children: [Option<Box<TrieNode>>; 2],
    records: Vec<MatchRecord>,
}

#[derive(Default)]
pub struct IpTrie {
    root: TrieNode,
}

/// Parses a CIDR element (`"10.0.0.0/24"`) or bare address (`"10.0.0.5"`,
/// implicitly `/32`) into a masked prefix and its length.
pub fn parse_cidr(element: &str) -> Option<(u32, u8)> {
    let (addr, len) = match element.split_once('/') {
        Some((addr, len)) => (addr, len.parse::<u8>().ok()?),
        None => (element, 32),
    };
    if len > 32 {
        return None;
    }
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix = u32::from(addr) & mask(len);
    Some((prefix, len))
}

fn mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len)
    }
}

impl IpTrie {
    pub fn insert(&mut self, prefix: u32, prefix_len: u8, record: MatchRecord) {
        let mut node = &mut self.root;
        for i in 0..prefix_len {
            let bit = bit_at(prefix, i) as usize;
            node = node.children[bit].get_or_insert_with(Box::default);
        }
        node.records.push(record);
    }

    /// Every match record along the path to `addr`, root first.
    pub fn lookup_all(&self, addr: Ipv4Addr) -> Vec<&MatchRecord> {
        let addr = u32::from(addr);
        let mut out: Vec<&MatchRecord> = self.root.records.iter().collect();
        let mut node = &self.root;
        for i in 0..32 {
            let bit = bit_at(addr, i) as usize;
            match &node.children[bit] {
                Some(child) => {
                    out.extend(child.records.iter());
                    node = child;
                }
                None => break,
            }
        }
        out
    }

    /// Removes every record belonging to `file_id` from the node at
    /// `prefix/prefix_len`. The node itself is left in place even if it ends
    /// up empty, to avoid repeated allocation churn on reload.
    pub fn remove(&mut self, prefix: u32, prefix_len: u8, file_id: &str) {
        let mut node = &mut self.root;
        for i in 0..prefix_len {
            let bit = bit_at(prefix, i) as usize;
            match node.children[bit].as_mut() {
                Some(child) => node = child,
                None => return,
            }
        }
        node.records.retain(|r| r.file.id != file_id);
    }
}

fn bit_at(value: u32, index: u8) -> u8 {
    ((value >> (31 - index)) & 1) as u8
}
