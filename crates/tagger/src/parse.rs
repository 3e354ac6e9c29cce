use capture_types::{FieldKind, FieldRegistry, IdentifierKind, Operation};
use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("tagger document missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown tagger type code '{0}'")]
    UnknownType(char),
}

/// A tagger document, fully parsed except for index insertion.
#[derive(Debug)]
pub struct ParsedFile {
    pub md5: String,
    pub kind: IdentifierKind,
    pub tags: Vec<String>,
    /// `(element, operations)` — one per data line.
    pub entries: Vec<(String, Vec<Operation>)>,
}

/// Parses one document body as fetched from the store.
///
/// Unknown expression names and non-numeric values for integer/ip fields are
/// logged and skipped rather than rejecting the whole line; an unknown
/// `type` code or a missing `md5`/`type` attribute fails the whole document.
pub fn parse_document(
    id: &str,
    body: &serde_json::Value,
    registry: &dyn FieldRegistry,
) -> Result<ParsedFile, ParseError> {
    let md5 = body
        .get("md5")
        .and_then(|v| v.as_str())
        .ok_or(ParseError::MissingField("md5"))?
        .to_string();

    let type_code = body
        .get("type")
        .and_then(|v| v.as_str())
        .and_then(|s| s.chars().next())
        .ok_or(ParseError::MissingField("type"))?;
    let kind = IdentifierKind::from_type_code(type_code)
        .ok_or(ParseError::UnknownType(type_code))?;

    let tags = flex_string_list(body.get("tags"));
    let field_names = flex_string_list(body.get("fields"));
    let data_lines = flex_string_list(body.get("data"));

    let mut entries = Vec::with_capacity(data_lines.len());
    for line in &data_lines {
        let mut parts = line.split(';');
        let element = match parts.next() {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => continue,
        };

        let mut ops = Vec::new();
        for clause in parts {
            if clause.is_empty() {
                continue;
            }
            let (expr, value) = match clause.split_once('=') {
                Some(pair) => pair,
                None => {
                    tracing::warn!(file = id, clause, "tagger data clause missing '='");
                    continue;
                }
            };

            let resolved = match expr.parse::<usize>() {
                Ok(alias) => match field_names.get(alias) {
                    Some(name) => name.as_str(),
                    None => {
                        tracing::warn!(file = id, alias, "tagger field alias out of range");
                        continue;
                    }
                },
                Err(_) => expr,
            };

            if resolved == "tags" {
                ops.push(Operation::TagOp(value.to_string()));
                continue;
            }

            match registry.resolve(resolved) {
                Some((handle, FieldKind::Integer)) => match value.parse::<u32>() {
                    Ok(v) => ops.push(Operation::IntOp(handle, v)),
                    Err(_) => tracing::warn!(
                        file = id,
                        expr = resolved,
                        value,
                        "tagger integer field value not numeric"
                    ),
                },
                Some((handle, FieldKind::Ip)) => match value.parse::<Ipv4Addr>() {
                    Ok(v) => ops.push(Operation::IpOp(handle, v)),
                    Err(_) => tracing::warn!(
                        file = id,
                        expr = resolved,
                        value,
                        "tagger ip field value not a dotted quad"
                    ),
                },
                Some((handle, FieldKind::String)) => {
                    ops.push(Operation::StrOp(handle, value.to_string()))
                }
                None => tracing::warn!(file = id, expr = resolved, "tagger unknown expression"),
            }
        }
        entries.push((element, ops));
    }

    Ok(ParsedFile {
        md5,
        kind,
        tags,
        entries,
    })
}

/// Accepts either a bare comma/newline-separated string or a JSON array
/// (each element itself comma-split) and flattens to a trimmed, non-empty
/// string list. The document store's JSON is tolerant: this function never
/// fails, it just yields an empty list for anything unexpected.
fn flex_string_list(v: Option<&serde_json::Value>) -> Vec<String> {
    match v {
        None => Vec::new(),
        Some(serde_json::Value::String(s)) => split_list(s),
        Some(serde_json::Value::Array(arr)) => arr
            .iter()
            .flat_map(|item| match item {
                serde_json::Value::String(s) => split_list(s),
                other => vec![other.to_string()],
            })
            .collect(),
        Some(_) => Vec::new(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split([',', '\n'])
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}
