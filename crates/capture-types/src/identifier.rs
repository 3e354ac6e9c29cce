/// The five identifier namespaces a tagger File or wise item can belong to.
///
/// Each kind has its own index in the tagger's local store; wise only ever
/// batches the first four to the remote intelligence service (a URI is never
/// looked up remotely).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Ip,
    Domain,
    Md5,
    Email,
    Uri,
}

impl IdentifierKind {
    /// Maps a local index file's single-character `type` attribute to a kind.
    pub fn from_type_code(code: char) -> Option<Self> {
        match code {
            'i' => Some(IdentifierKind::Ip),
            'h' => Some(IdentifierKind::Domain),
            'm' => Some(IdentifierKind::Md5),
            'e' => Some(IdentifierKind::Email),
            'u' => Some(IdentifierKind::Uri),
            _ => None,
        }
    }

    pub fn type_code(self) -> char {
        match self {
            IdentifierKind::Ip => 'i',
            IdentifierKind::Domain => 'h',
            IdentifierKind::Md5 => 'm',
            IdentifierKind::Email => 'e',
            IdentifierKind::Uri => 'u',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_code_round_trips() {
        for kind in [
            IdentifierKind::Ip,
            IdentifierKind::Domain,
            IdentifierKind::Md5,
            IdentifierKind::Email,
            IdentifierKind::Uri,
        ] {
            assert_eq!(IdentifierKind::from_type_code(kind.type_code()), Some(kind));
        }
        assert_eq!(IdentifierKind::from_type_code('x'), None);
    }
}
