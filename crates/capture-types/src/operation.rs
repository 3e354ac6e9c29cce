use crate::{FieldHandle, FieldValue, Session};
use std::net::Ipv4Addr;

/// An operation produced by a successful identifier lookup, ready to apply to
/// a session.
///
/// The payload's interpretation is decided once, when the operation is built
/// (at tagger-file-parse time or wise-response-decode time) rather than
/// re-dispatched against the field's declared type on every apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    IntOp(FieldHandle, u32),
    IpOp(FieldHandle, Ipv4Addr),
    StrOp(FieldHandle, String),
    TagOp(String),
}

impl Operation {
    pub fn apply(&self, session: &mut dyn Session) {
        match self {
            Operation::IntOp(handle, v) => session.apply_field(*handle, &FieldValue::Int(*v)),
            Operation::IpOp(handle, v) => session.apply_field(*handle, &FieldValue::Ip(*v)),
            Operation::StrOp(handle, v) => {
                session.apply_field(*handle, &FieldValue::Str(v.clone()))
            }
            Operation::TagOp(tag) => session.add_tag(tag),
        }
    }
}

/// Applies every operation in `ops` to `session`, in order.
pub fn apply_all(ops: &[Operation], session: &mut dyn Session) {
    for op in ops {
        op.apply(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldKind;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSession {
        tags: RefCell<Vec<String>>,
        fields: RefCell<Vec<(FieldHandle, FieldValue)>>,
    }

    impl Session for RecordingSession {
        fn add_tag(&mut self, tag: &str) {
            self.tags.borrow_mut().push(tag.to_string());
        }
        fn apply_field(&mut self, handle: FieldHandle, value: &FieldValue) {
            self.fields.borrow_mut().push((handle, value.clone()));
        }
        fn peer_addrs(&self) -> [Ipv4Addr; 2] {
            [Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED]
        }
        fn xff_addrs(&self) -> Vec<Ipv4Addr> {
            Vec::new()
        }
        fn http_hosts(&self) -> Vec<String> {
            Vec::new()
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

    #[test]
    fn apply_dispatches_by_operation_variant() {
        let mut session = RecordingSession::default();
        let handle = FieldHandle(7);
        apply_all(
            &[
                Operation::IntOp(handle, 42),
                Operation::TagOp("malware".into()),
                Operation::StrOp(handle, "hit".into()),
            ],
            &mut session,
        );

        assert_eq!(session.tags.borrow().as_slice(), ["malware"]);
        assert_eq!(
            session.fields.borrow().as_slice(),
            [
                (handle, FieldValue::Int(42)),
                (handle, FieldValue::Str("hit".into())),
            ]
        );
        let _ = FieldKind::Integer;
    }
}
