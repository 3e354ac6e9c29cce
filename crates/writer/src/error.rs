use std::io;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("disk writer io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(
        "pcapWriteSize ({pcap_write_size}) must be a multiple of the page size ({page_size}) \
         when using a direct pcapWriteMethod"
    )]
    UnalignedWriteSize {
        pcap_write_size: usize,
        page_size: usize,
    },
    #[error("mmap failed while allocating an output buffer: {0}")]
    BufferAlloc(io::Error),
    #[error("file allocator failed to create a new capture file: {0}")]
    Allocator(String),
}
