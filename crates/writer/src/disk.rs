use crate::allocator::FileAllocator;
use crate::buffer::{Buffer, BufferPool, RawBuf};
use crate::config::{DiskWriterConfig, WriteMethod};
use crate::error::WriterError;
use crate::pcap::{encode_packet_header, global_header, PacketHeader, GLOBAL_HEADER_LEN, PACKET_HEADER_LEN};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Seek, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Where a packet landed: the file it was written to and its byte offset
/// within that file (the offset a later reader seeks to, counting the
/// global header).
pub type PacketLocation = (u32, u64);

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn open_output_file(path: &str, direct: bool) -> Result<File, WriterError> {
    use std::ffi::CString;
    use std::os::unix::io::FromRawFd;

    let io_err = |source: std::io::Error| WriterError::Io {
        path: path.to_string(),
        source,
    };

    let cpath = CString::new(path).map_err(|_| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path contains a NUL byte",
        ))
    })?;

    let mut flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_NONBLOCK;
    #[cfg(target_os = "linux")]
    {
        flags |= libc::O_NOATIME;
        if direct {
            flags |= libc::O_DIRECT;
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = direct;

    let fd = unsafe { libc::open(cpath.as_ptr(), flags, 0o660) };
    if fd < 0 {
        return Err(io_err(std::io::Error::last_os_error()));
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Writes `buf` to `sink` to completion, opening `sink` against `buf.name`
/// on first use and closing it (with, for direct I/O, a final truncate
/// back to the logical length) once `buf.close` is set.
///
/// Mirrors the original writer thread's inner loop: looping on short
/// writes, and on the final direct-I/O write rounding up to a full page
/// (the buffer's backing allocation always has an 8KiB tail of slack for
/// exactly this) then truncating the file back down afterward.
fn drain_buffer(
    sink: &mut Option<File>,
    buf: &mut Buffer,
    write_method: WriteMethod,
    page_size: usize,
) -> Result<(), WriterError> {
    if sink.is_none() {
        tracing::info!(file = %buf.name, "opening pcap output file");
        *sink = Some(open_output_file(&buf.name, write_method.uses_direct())?);
    }
    let file = sink.as_mut().expect("just populated above");
    let io_err = |source: std::io::Error| WriterError::Io {
        path: buf.name.clone(),
        source,
    };

    while buf.pos < buf.max {
        let mut wlen = buf.max - buf.pos;
        let mut truncate_to = None;

        if buf.close && write_method.uses_direct() && wlen % page_size != 0 {
            let current = file.stream_position().map_err(io_err)?;
            truncate_to = Some(current + wlen as u64);
            wlen = wlen - (wlen % page_size) + page_size;
        }

        let n = file
            .write(&buf.as_slice()[buf.pos..buf.pos + wlen])
            .map_err(io_err)?;
        buf.pos += n;

        if let Some(len) = truncate_to {
            file.set_len(len).map_err(io_err)?;
        }
    }

    if buf.close {
        *sink = None;
    }
    Ok(())
}

enum Backend {
    Sync {
        queue: VecDeque<Buffer>,
        pool: BufferPool,
        sink: Option<File>,
    },
    Threaded {
        queue: Arc<(Mutex<VecDeque<Buffer>>, Condvar)>,
        pool: Arc<Mutex<BufferPool>>,
        #[allow(dead_code)]
        handle: JoinHandle<()>,
    },
}

impl Backend {
    fn queue_length(&self) -> usize {
        match self {
            Backend::Sync { queue, .. } => queue.len(),
            Backend::Threaded { queue, .. } => queue.0.lock().unwrap().len(),
        }
    }

    fn acquire_buffer(&mut self) -> Result<RawBuf, WriterError> {
        match self {
            Backend::Sync { pool, .. } => pool.acquire(),
            Backend::Threaded { pool, .. } => pool.lock().unwrap().acquire(),
        }
    }

    /// Enqueues `buf` for output. For the threaded backend this just wakes
    /// the writer thread; for the sync backend it immediately drains the
    /// whole queue on the caller's stack, since there's no background
    /// thread to hand it off to.
    fn enqueue(
        &mut self,
        buf: Buffer,
        write_method: WriteMethod,
        page_size: usize,
    ) -> Result<usize, WriterError> {
        match self {
            Backend::Sync { queue, pool, sink } => {
                queue.push_back(buf);
                let count = queue.len();
                while let Some(mut next) = queue.pop_front() {
                    drain_buffer(sink, &mut next, write_method, page_size)?;
                    pool.release(next.into_raw());
                }
                Ok(count)
            }
            Backend::Threaded { queue, .. } => {
                let (lock, cvar) = &**queue;
                let mut q = lock.lock().unwrap();
                q.push_back(buf);
                let count = q.len();
                drop(q);
                cvar.notify_one();
                Ok(count)
            }
        }
    }

    fn spin_until_drained(&self) {
        while self.queue_length() > 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

/// The disk writer core: accumulates packets into page-sized buffers,
/// queues them for output once full, and rotates to a new file by size or
/// by a periodic time check the caller drives.
///
/// Exactly one [`DiskWriter`] is expected per capture process, matching the
/// single global `output`/`outputQ` pair in the original writer; nothing
/// here is `Sync`, and the threaded backend's internal synchronization is
/// an implementation detail, not an invitation to share one across threads.
pub struct DiskWriter {
    cfg: DiskWriterConfig,
    allocator: Box<dyn FileAllocator>,
    page_size: usize,
    backend: Backend,

    current: Buffer,
    file_id: u32,
    file_name: String,
    file_pos: u64,
    file_opened_at: Option<Instant>,
}

impl DiskWriter {
    pub fn new(
        cfg: DiskWriterConfig,
        allocator: Box<dyn FileAllocator>,
    ) -> Result<Self, WriterError> {
        let page_size = page_size();
        if cfg.write_method.uses_direct() && cfg.pcap_write_size % page_size != 0 {
            return Err(WriterError::UnalignedWriteSize {
                pcap_write_size: cfg.pcap_write_size,
                page_size,
            });
        }

        let buf_len = cfg.pcap_write_size + 8192;
        let backend = if cfg.write_method.uses_thread() {
            let queue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
            let pool = Arc::new(Mutex::new(BufferPool::new(
                buf_len,
                cfg.max_free_output_buffers,
            )));
            let write_method = cfg.write_method;
            let thread_queue = Arc::clone(&queue);
            let thread_pool = Arc::clone(&pool);
            let handle = std::thread::Builder::new()
                .name("disk-writer".into())
                .spawn(move || writer_thread_loop(thread_queue, thread_pool, write_method, page_size))
                .expect("failed to spawn disk writer thread");
            Backend::Threaded {
                queue,
                pool,
                handle,
            }
        } else {
            Backend::Sync {
                queue: VecDeque::new(),
                pool: BufferPool::new(buf_len, cfg.max_free_output_buffers),
                sink: None,
            }
        };

        let current = Buffer::new(RawBuf::alloc(buf_len)?, cfg.pcap_write_size);
        Ok(DiskWriter {
            cfg,
            allocator,
            page_size,
            backend,
            current,
            file_id: 0,
            file_name: String::new(),
            file_pos: 0,
            file_opened_at: None,
        })
    }

    pub fn queue_length(&self) -> usize {
        self.backend.queue_length()
    }

    pub fn current_file_name(&self) -> Option<&str> {
        if self.file_name.is_empty() {
            None
        } else {
            Some(&self.file_name)
        }
    }

    fn start_file(&mut self, first_packet_unix_secs: i64) -> Result<(), WriterError> {
        let (id, name) = self.allocator.create_file(first_packet_unix_secs)?;
        self.file_id = id;
        self.file_name = name;
        self.file_pos = GLOBAL_HEADER_LEN as u64;
        self.file_opened_at = Some(Instant::now());

        let header = global_header(self.cfg.snaplen, self.cfg.linktype);
        self.current.as_mut_slice()[..GLOBAL_HEADER_LEN].copy_from_slice(&header);
        self.current.pos = GLOBAL_HEADER_LEN;
        Ok(())
    }

    /// Writes one packet, opening a new file first if none is active.
    /// Returns where the packet landed so the caller can record a
    /// back-reference to it. Flushes the current buffer if it's now past
    /// its logical size, and rotates to a new file once the active file
    /// crosses `max_file_size_bytes`.
    pub fn write_packet(
        &mut self,
        ts_sec: u32,
        ts_usec: u32,
        caplen: u32,
        len: u32,
        payload: &[u8],
    ) -> Result<PacketLocation, WriterError> {
        if self.file_name.is_empty() {
            self.start_file(ts_sec as i64)?;
        }

        let header = encode_packet_header(&PacketHeader {
            ts_sec,
            ts_usec,
            caplen,
            len,
        });
        let pos = self.current.pos;
        self.current.as_mut_slice()[pos..pos + PACKET_HEADER_LEN].copy_from_slice(&header);
        self.current.pos += PACKET_HEADER_LEN;
        let pos = self.current.pos;
        self.current.as_mut_slice()[pos..pos + caplen as usize]
            .copy_from_slice(&payload[..caplen as usize]);
        self.current.pos += caplen as usize;

        if self.current.pos > self.current.max {
            self.flush(false)?;
        }

        let location = (self.file_id, self.file_pos);
        self.file_pos += (PACKET_HEADER_LEN as u64) + caplen as u64;

        if self.file_pos >= self.cfg.max_file_size_bytes {
            self.flush(true)?;
            self.file_name.clear();
        }

        Ok(location)
    }

    /// Queues the current buffer for output. `all` closes out the active
    /// file (the final flush of its lifetime); otherwise any bytes past
    /// `max` spill into the next buffer rather than being dropped.
    pub fn flush(&mut self, all: bool) -> Result<(), WriterError> {
        let fits_in_one_buffer = self.current.pos <= self.current.max;
        let closing = all || fits_in_one_buffer;

        let mut next = Buffer::new(self.backend.acquire_buffer()?, self.cfg.pcap_write_size);
        if closing {
            self.current.max = self.current.pos;
        } else {
            let spill = self.current.pos - self.current.max;
            next.as_mut_slice()[..spill]
                .copy_from_slice(&self.current.as_slice()[self.current.max..self.current.pos]);
            next.pos = spill;
        }

        self.current.close = closing;
        self.current.name = self.file_name.clone();
        // `pos` now switches roles, from "bytes accumulated" to "bytes
        // written so far" — it must restart at 0 for the drain loop.
        self.current.pos = 0;
        let outgoing = std::mem::replace(&mut self.current, next);

        let count = self
            .backend
            .enqueue(outgoing, self.cfg.write_method, self.page_size)?;
        if count >= 100 && count % 50 == 0 {
            tracing::warn!(count, "disk writer output queue backing up, disk too slow?");
        }
        Ok(())
    }

    /// A 30s-tick rotation check: closes the active file if it's been open
    /// longer than `max_file_time`, matching the original's periodic timer
    /// callback rather than a size threshold.
    pub fn tick_rotation_check(&mut self, now: Instant) -> Result<(), WriterError> {
        let Some(max_file_time) = self.cfg.max_file_time else {
            return Ok(());
        };
        let Some(opened_at) = self.file_opened_at else {
            return Ok(());
        };
        if self.file_pos > GLOBAL_HEADER_LEN as u64 && now.duration_since(opened_at) >= max_file_time
        {
            self.flush(true)?;
            self.file_name.clear();
        }
        Ok(())
    }

    /// Closes out the active file and blocks until every queued buffer has
    /// actually been written. The spin-sleep loop (rather than a condvar
    /// wait) mirrors the original shutdown path exactly.
    pub fn exit(&mut self) -> Result<(), WriterError> {
        self.flush(true)?;
        self.file_name.clear();
        self.backend.spin_until_drained();
        Ok(())
    }
}

fn writer_thread_loop(
    queue: Arc<(Mutex<VecDeque<Buffer>>, Condvar)>,
    pool: Arc<Mutex<BufferPool>>,
    write_method: WriteMethod,
    page_size: usize,
) {
    let mut sink: Option<File> = None;
    loop {
        let mut buf = {
            let (lock, cvar) = &*queue;
            let mut q = lock.lock().unwrap();
            while q.is_empty() {
                q = cvar.wait(q).unwrap();
            }
            q.pop_front().expect("queue non-empty after wait")
        };

        if let Err(err) = drain_buffer(&mut sink, &mut buf, write_method, page_size) {
            tracing::error!(error = %err, "disk writer thread failed, exiting process");
            std::process::exit(2);
        }
        pool.lock().unwrap().release(buf.into_raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SequentialFileAllocator;
    use pretty_assertions::assert_eq;

    fn cfg(max_file_size_bytes: u64) -> DiskWriterConfig {
        DiskWriterConfig {
            write_method: WriteMethod::Normal,
            pcap_write_size: 4096,
            max_file_size_bytes,
            max_file_time: None,
            max_free_output_buffers: 4,
            snaplen: 65535,
            linktype: 1,
        }
    }

    #[test]
    fn first_packet_creates_a_file_with_the_global_header_and_returns_offset_24() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Box::new(SequentialFileAllocator::new(dir.path()));
        let mut writer = DiskWriter::new(cfg(1 << 30), allocator).unwrap();

        let (file_id, offset) = writer.write_packet(1_700_000_000, 0, 4, 4, b"abcd").unwrap();
        assert_eq!(file_id, 1);
        assert_eq!(offset, GLOBAL_HEADER_LEN as u64);
    }

    #[test]
    fn successive_packets_get_sequential_offsets_accounting_for_header_and_caplen() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Box::new(SequentialFileAllocator::new(dir.path()));
        let mut writer = DiskWriter::new(cfg(1 << 30), allocator).unwrap();

        let (_, first) = writer.write_packet(1, 0, 4, 4, b"abcd").unwrap();
        let (_, second) = writer.write_packet(1, 0, 10, 10, b"0123456789").unwrap();
        assert_eq!(first, GLOBAL_HEADER_LEN as u64);
        assert_eq!(second, first + PACKET_HEADER_LEN as u64 + 4);
    }

    #[test]
    fn exceeding_max_file_size_rotates_to_a_new_file_id() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Box::new(SequentialFileAllocator::new(dir.path()));
        // Small enough that the very first packet already crosses it.
        let mut writer = DiskWriter::new(cfg(30), allocator).unwrap();

        let (first_id, _) = writer.write_packet(1, 0, 4, 4, b"abcd").unwrap();
        assert_eq!(writer.current_file_name(), None);
        let (second_id, _) = writer.write_packet(1, 0, 4, 4, b"abcd").unwrap();

        assert_eq!(first_id, 1);
        assert_eq!(second_id, 2);
    }

    #[test]
    fn direct_write_method_rejects_an_unaligned_pcap_write_size() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Box::new(SequentialFileAllocator::new(dir.path()));
        let mut bad = cfg(1 << 30);
        bad.write_method = WriteMethod::Direct;
        bad.pcap_write_size = 4097; // not a multiple of any real page size

        assert!(matches!(
            DiskWriter::new(bad, allocator),
            Err(WriterError::UnalignedWriteSize { .. })
        ));
    }

    #[test]
    fn exit_flushes_the_active_file_and_it_is_readable_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let allocator = Box::new(SequentialFileAllocator::new(&path));
        let mut writer = DiskWriter::new(cfg(1 << 30), allocator).unwrap();

        writer.write_packet(1, 0, 4, 4, b"abcd").unwrap();
        let name = writer.current_file_name().unwrap().to_string();
        writer.exit().unwrap();

        let bytes = std::fs::read(&name).unwrap();
        assert_eq!(bytes.len(), GLOBAL_HEADER_LEN + PACKET_HEADER_LEN + 4);
        assert_eq!(&bytes[0..4], &0xa1b2_c3d4u32.to_le_bytes());
        assert_eq!(&bytes[GLOBAL_HEADER_LEN + 8..GLOBAL_HEADER_LEN + 12], &4u32.to_le_bytes());
        assert_eq!(&bytes[GLOBAL_HEADER_LEN + PACKET_HEADER_LEN..], b"abcd");
    }

    #[test]
    fn queue_backpressure_warning_threshold_does_not_fire_for_a_healthy_queue() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Box::new(SequentialFileAllocator::new(dir.path()));
        let mut writer = DiskWriter::new(cfg(1 << 30), allocator).unwrap();
        writer.write_packet(1, 0, 4, 4, b"abcd").unwrap();
        // The sync backend drains inline, so the queue never actually backs
        // up under normal operation; this just documents that expectation.
        assert_eq!(writer.queue_length(), 0);
    }
}
