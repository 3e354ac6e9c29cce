use crate::error::WriterError;
use std::ptr::NonNull;

/// An anonymous, page-aligned `mmap`'d region. Page alignment is what makes
/// the buffer usable with `O_DIRECT`, which rejects unaligned addresses;
/// `Vec<u8>` gives no such guarantee.
pub(crate) struct RawBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// The pointer is never aliased while in flight: a `RawBuf` moves from the
// caller that fills it to the writer thread that drains it, never both at
// once. That ownership transfer is what makes `Send` sound here; nothing
// makes it `Sync`.
unsafe impl Send for RawBuf {}

impl RawBuf {
    pub(crate) fn alloc(len: usize) -> Result<Self, WriterError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(WriterError::BufferAlloc(std::io::Error::last_os_error()));
        }
        Ok(RawBuf {
            ptr: NonNull::new(ptr as *mut u8).expect("mmap returned a null non-failure pointer"),
            len,
        })
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// A segment of PCAP output: the packet bytes accumulated since the last
/// flush, plus the bookkeeping the writer needs to place and close it.
pub(crate) struct Buffer {
    raw: RawBuf,
    pub pos: usize,
    pub max: usize,
    /// The file this buffer's bytes belong to. Set on every flush, mirroring
    /// the original writer (which re-stamps the current output file name on
    /// each queued segment, not just the final one).
    pub name: String,
    /// True if this is the last buffer for `name`; the writer closes (and,
    /// for direct I/O, truncates) the file after writing it.
    pub close: bool,
}

impl Buffer {
    pub(crate) fn new(raw: RawBuf, max: usize) -> Self {
        Buffer {
            raw,
            pos: 0,
            max,
            name: String::new(),
            close: false,
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        self.raw.as_slice()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        self.raw.as_mut_slice()
    }

    pub(crate) fn into_raw(self) -> RawBuf {
        self.raw
    }
}

/// The free-list of already-`mmap`'d buffers, reused across files instead
/// of being `munmap`'d and re-`mmap`'d every rotation. Buffers beyond
/// `max_free` are dropped (and so `munmap`'d) instead of retained.
pub(crate) struct BufferPool {
    free: Vec<RawBuf>,
    max_free: usize,
    buf_len: usize,
}

impl BufferPool {
    pub(crate) fn new(buf_len: usize, max_free: usize) -> Self {
        BufferPool {
            free: Vec::new(),
            max_free,
            buf_len,
        }
    }

    pub(crate) fn acquire(&mut self) -> Result<RawBuf, WriterError> {
        match self.free.pop() {
            Some(buf) => Ok(buf),
            None => RawBuf::alloc(self.buf_len),
        }
    }

    pub(crate) fn release(&mut self, buf: RawBuf) {
        if self.free.len() < self.max_free {
            self.free.push(buf);
        }
        // else: `buf` drops here and its `Drop` impl munmaps it.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_released_buffers_instead_of_remapping() {
        let mut pool = BufferPool::new(4096, 2);
        let a = pool.acquire().unwrap();
        let a_ptr = a.as_slice().as_ptr();
        pool.release(a);

        let b = pool.acquire().unwrap();
        assert_eq!(b.as_slice().as_ptr(), a_ptr);
    }

    #[test]
    fn pool_drops_buffers_beyond_max_free() {
        let mut pool = BufferPool::new(4096, 1);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b); // dropped, not retained: free list already at capacity
        assert_eq!(pool.free.len(), 1);
    }

    #[test]
    fn buffer_write_region_is_addressable_up_to_raw_capacity() {
        let raw = RawBuf::alloc(4096).unwrap();
        let mut buf = Buffer::new(raw, 2048);
        buf.as_mut_slice()[4095] = 7;
        assert_eq!(buf.as_slice()[4095], 7);
    }
}
