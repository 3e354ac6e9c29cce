use capture_types::{FieldHandle, FieldKind, FieldRegistry};

/// A fixed field schema standing in for the capture pipeline's real session
/// field table. Maps the handful of expression names the harness's
/// synthetic tagger documents and wise responses reference.
pub struct StaticFieldRegistry;

impl FieldRegistry for StaticFieldRegistry {
    fn resolve(&self, expr: &str) -> Option<(FieldHandle, FieldKind)> {
        match expr {
            "http.uri" => Some((FieldHandle(1), FieldKind::String)),
            "asn" => Some((FieldHandle(2), FieldKind::Integer)),
            "geoip.country" => Some((FieldHandle(3), FieldKind::String)),
            "reputation.ip" => Some((FieldHandle(4), FieldKind::Ip)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_expressions_and_rejects_unknown_ones() {
        assert_eq!(
            StaticFieldRegistry.resolve("asn"),
            Some((FieldHandle(2), FieldKind::Integer))
        );
        assert_eq!(StaticFieldRegistry.resolve("nonsense"), None);
    }
}
