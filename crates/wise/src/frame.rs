use crate::kind::Kind;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("truncated wise frame")]
    Truncated(#[from] io::Error),
    #[error("unknown kind byte {0}")]
    UnknownKind(u8),
    #[error("unsupported wise protocol version {0}")]
    UnsupportedVersion(u32),
}

/// One request entry: `(u8 kind, u16 key_len, key bytes)`.
pub fn encode_request(entries: &[(Kind, String)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 16);
    for (kind, key) in entries {
        buf.write_u8(kind.wire_id()).unwrap();
        buf.write_u16::<BigEndian>(key.len() as u16).unwrap();
        buf.write_all(key.as_bytes()).unwrap();
    }
    buf
}

/// One decoded response entry: the remote field id and raw value bytes for
/// each operation the service returned for that request entry, in order.
pub type ResponseEntry = Vec<(u8, Vec<u8>)>;

pub struct Response {
    pub fields_ts: u32,
    pub version: u32,
    pub entries: Vec<ResponseEntry>,
}

/// Decodes a `/get` response: a `(u32 fields_ts, u32 version)` header
/// followed by one block per request entry, each block a `u8 num_ops`
/// count and that many `(u8 remote_field_id, u8 value_len, value bytes)`
/// triples.
pub fn decode_response(bytes: &[u8]) -> Result<Response, FrameError> {
    let mut cur = Cursor::new(bytes);
    let fields_ts = cur.read_u32::<BigEndian>()?;
    let version = cur.read_u32::<BigEndian>()?;
    if version != 0 {
        return Err(FrameError::UnsupportedVersion(version));
    }

    let mut entries = Vec::new();
    while (cur.position() as usize) < bytes.len() {
        let num_ops = cur.read_u8()?;
        let mut ops = Vec::with_capacity(num_ops as usize);
        for _ in 0..num_ops {
            let field_id = cur.read_u8()?;
            let len = cur.read_u8()? as usize;
            let mut value = vec![0u8; len];
            cur.read_exact(&mut value)?;
            ops.push((field_id, value));
        }
        entries.push(ops);
    }
    Ok(Response {
        fields_ts,
        version,
        entries,
    })
}

/// One `/fields` entry: the remote's short numeric id for a field name
/// (its position in the declaration run) and the name itself, used to
/// resolve response `remote_field_id`s back to a local
/// [`capture_types::FieldHandle`].
pub struct FieldDecl {
    pub short_id: u8,
    pub name: String,
}

pub struct FieldsFrame {
    pub fields_ts: u32,
    pub version: u32,
    pub decls: Vec<FieldDecl>,
}

/// Decodes the `/fields` negotiation frame: `(u32 fields_ts, u32 version,
/// u8 count)` then `count` × `(u16 name_len, name bytes)` entries, each
/// name NUL-terminated. A declaration's `short_id` is its position in the
/// run (0-indexed), not a byte on the wire.
pub fn decode_fields(bytes: &[u8]) -> Result<FieldsFrame, FrameError> {
    let mut cur = Cursor::new(bytes);
    let fields_ts = cur.read_u32::<BigEndian>()?;
    let version = cur.read_u32::<BigEndian>()?;
    let count = cur.read_u8()?;

    let mut decls = Vec::with_capacity(count as usize);
    for short_id in 0..count {
        let len = cur.read_u16::<BigEndian>()? as usize;
        let mut name = vec![0u8; len];
        cur.read_exact(&mut name)?;
        if name.last() == Some(&0) {
            name.pop();
        }
        let name = String::from_utf8_lossy(&name).into_owned();
        decls.push(FieldDecl { short_id, name });
    }
    Ok(FieldsFrame {
        fields_ts,
        version,
        decls,
    })
}

pub fn kind_from_wire(byte: u8) -> Result<Kind, FrameError> {
    Kind::from_wire_id(byte).ok_or(FrameError::UnknownKind(byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_decode_helpers() {
        let entries = vec![(Kind::Domain, "example.com".to_string())];
        let buf = encode_request(&entries);
        assert_eq!(buf[0], Kind::Domain.wire_id());
        assert_eq!(u16::from_be_bytes([buf[1], buf[2]]), 11);
        assert_eq!(&buf[3..], b"example.com");
    }

    #[test]
    fn response_decodes_two_entries_with_varying_op_counts() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(1000).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u8(1).unwrap();
        buf.write_u8(5).unwrap();
        buf.write_u8(3).unwrap();
        buf.write_all(b"bad").unwrap();
        buf.write_u8(0).unwrap();

        let response = decode_response(&buf).unwrap();
        assert_eq!(response.fields_ts, 1000);
        assert_eq!(response.entries.len(), 2);
        assert_eq!(response.entries[0], vec![(5u8, b"bad".to_vec())]);
        assert!(response.entries[1].is_empty());
    }

    #[test]
    fn response_with_unsupported_version_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u32::<BigEndian>(7).unwrap();
        assert!(matches!(
            decode_response(&buf),
            Err(FrameError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn fields_frame_decodes_declared_names() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(42).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u8(1).unwrap();
        buf.write_u16::<BigEndian>(9).unwrap();
        buf.write_all(b"http.uri\0").unwrap();

        let frame = decode_fields(&buf).unwrap();
        assert_eq!(frame.fields_ts, 42);
        assert_eq!(frame.version, 0);
        assert_eq!(frame.decls.len(), 1);
        assert_eq!(frame.decls[0].short_id, 0);
        assert_eq!(frame.decls[0].name, "http.uri");
    }
}
