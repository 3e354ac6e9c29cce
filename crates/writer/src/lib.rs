//! The disk writer core: double-buffered, page-aligned PCAP output with
//! file rotation and four write-method strategies (normal, direct,
//! threaded, and threaded-direct).
//!
//! [`DiskWriter`] owns everything — the active buffer, the output queue,
//! and (for the threaded write methods) the background writer thread —
//! the same way the original writer keeps a single global `output` and
//! `outputQ` pair rather than something callers share copies of.

mod allocator;
mod buffer;
mod config;
mod disk;
mod error;
mod pcap;

pub use allocator::{FileAllocator, SequentialFileAllocator};
pub use config::{DiskWriterConfig, WriteMethod};
pub use disk::{DiskWriter, PacketLocation};
pub use error::WriterError;
pub use pcap::{GLOBAL_HEADER_LEN, PACKET_HEADER_LEN};
