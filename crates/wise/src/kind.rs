/// The four identifier namespaces the remote cache batches lookups for.
///
/// Unlike [`capture_types::IdentifierKind`], which also covers the tagger's
/// URI index, wise only ever queries the intelligence service for these
/// four — its wire id is the value used on both `/fields` and `/get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Ip = 0,
    Domain = 1,
    Md5 = 2,
    Email = 3,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Ip, Kind::Domain, Kind::Md5, Kind::Email];

    pub fn wire_id(self) -> u8 {
        self as u8
    }

    pub fn from_wire_id(id: u8) -> Option<Kind> {
        match id {
            0 => Some(Kind::Ip),
            1 => Some(Kind::Domain),
            2 => Some(Kind::Md5),
            3 => Some(Kind::Email),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Index `Kind` directly into a 4-element array, the way the per-kind state
/// table in [`crate::cache`] does.
pub fn kind_index(kind: Kind) -> usize {
    kind.index()
}

/// Validates and normalizes a candidate domain lookup key per the service's
/// admission rules: must contain a dot, restricted to a conservative
/// charset, `http://`/`https://` scheme and a trailing `:port` are stripped,
/// and a `<`-prefixed value (the capture pipeline's placeholder for a
/// redacted/synthetic host) is rejected outright.
///
/// A domain that turns out to be all-digits-and-dots is not a domain at all
/// — the caller should redirect it to an IP lookup instead.
pub fn normalize_domain(raw: &str) -> Option<DomainLookup> {
    if raw.starts_with('<') {
        return None;
    }

    let mut s = raw;
    if let Some(rest) = s.strip_prefix("https://") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("http://") {
        s = rest;
    }
    if let Some(slash) = s.find('/') {
        s = &s[..slash];
    }
    if let Some(colon) = s.rfind(':') {
        if s[colon + 1..].chars().all(|c| c.is_ascii_digit()) && colon > 0 {
            s = &s[..colon];
        }
    }

    if s.is_empty() || !s.contains('.') {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return s.parse().ok().map(DomainLookup::Ip);
    }
    Some(DomainLookup::Domain(s.to_ascii_lowercase()))
}

/// The outcome of [`normalize_domain`]: a genuine hostname, or a bare dotted
/// quad that should be queried as an IP instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainLookup {
    Domain(String),
    Ip(std::net::Ipv4Addr),
}
