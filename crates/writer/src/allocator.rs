use crate::error::WriterError;

/// Assigns a durable file id and filesystem path for a new capture file.
///
/// Real deployments back this with the same document store the tagger
/// polls, recording each file's id, name, and node so it can later be found
/// for replay. That coordination is out of scope here; this trait is the
/// seam a host provides an implementation at.
pub trait FileAllocator: Send {
    fn create_file(&mut self, first_packet_unix_secs: i64) -> Result<(u32, String), WriterError>;
}

/// A `FileAllocator` that hands out sequential ids and paths under a fixed
/// directory, named by id. Useful for tests and as a minimal standalone
/// mode; not suitable where multiple capture nodes must agree on ids.
pub struct SequentialFileAllocator {
    dir: std::path::PathBuf,
    next_id: u32,
}

impl SequentialFileAllocator {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        SequentialFileAllocator {
            dir: dir.into(),
            next_id: 1,
        }
    }
}

impl FileAllocator for SequentialFileAllocator {
    fn create_file(&mut self, first_packet_unix_secs: i64) -> Result<(u32, String), WriterError> {
        let id = self.next_id;
        self.next_id += 1;
        let path = self
            .dir
            .join(format!("capture-{first_packet_unix_secs}-{id}.pcap"));
        Ok((id, path.to_string_lossy().into_owned()))
    }
}
