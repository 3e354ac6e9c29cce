use std::str::FromStr;
use std::time::Duration;

/// Mirrors the four `pcapWriteMethod` names: whether writes use `O_DIRECT`
/// and whether they run on a dedicated writer thread or inline with the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    Normal,
    Direct,
    Thread,
    ThreadDirect,
}

impl WriteMethod {
    pub fn uses_direct(self) -> bool {
        matches!(self, WriteMethod::Direct | WriteMethod::ThreadDirect)
    }

    pub fn uses_thread(self) -> bool {
        matches!(self, WriteMethod::Thread | WriteMethod::ThreadDirect)
    }
}

impl FromStr for WriteMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(WriteMethod::Normal),
            "direct" => Ok(WriteMethod::Direct),
            "thread" => Ok(WriteMethod::Thread),
            "thread-direct" => Ok(WriteMethod::ThreadDirect),
            other => Err(format!("unknown pcapWriteMethod '{other}'")),
        }
    }
}

/// Configuration for a [`crate::DiskWriter`], one field per key the original
/// writer reads off the global config struct.
#[derive(Debug, Clone)]
pub struct DiskWriterConfig {
    pub write_method: WriteMethod,
    /// Logical size of one output buffer before it's queued for write.
    /// Must be a multiple of the page size when `write_method` uses direct
    /// I/O.
    pub pcap_write_size: usize,
    pub max_file_size_bytes: u64,
    /// Rotate on a timer when set; checked on a 30s tick by the caller via
    /// [`crate::DiskWriter::tick_rotation_check`].
    pub max_file_time: Option<Duration>,
    pub max_free_output_buffers: usize,
    pub snaplen: u32,
    pub linktype: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_write_methods() {
        assert_eq!("normal".parse::<WriteMethod>(), Ok(WriteMethod::Normal));
        assert_eq!("direct".parse::<WriteMethod>(), Ok(WriteMethod::Direct));
        assert_eq!("thread".parse::<WriteMethod>(), Ok(WriteMethod::Thread));
        assert_eq!(
            "thread-direct".parse::<WriteMethod>(),
            Ok(WriteMethod::ThreadDirect)
        );
        assert!("bogus".parse::<WriteMethod>().is_err());
    }

    #[test]
    fn thread_and_direct_bits_are_independent() {
        assert!(!WriteMethod::Normal.uses_thread());
        assert!(!WriteMethod::Normal.uses_direct());
        assert!(WriteMethod::Thread.uses_thread());
        assert!(!WriteMethod::Thread.uses_direct());
        assert!(WriteMethod::ThreadDirect.uses_thread());
        assert!(WriteMethod::ThreadDirect.uses_direct());
    }
}
