//! Aligned page buffers and the raw block read/write primitive.
//!
//! This is the one piece of the cache that actually touches the backing
//! file. Everything above it (the cache engine, the public API) only ever
//! deals in whole pages identified by a block number; this module turns
//! that into a seek + a single `read`/`write` syscall.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// An owned, page-aligned buffer used as a cache frame's backing storage.
///
/// Alignment is required so the buffer can be handed to direct
/// (unbuffered) I/O without the kernel rejecting it; callers that never
/// enable direct mode get the same type for uniformity.
pub struct AlignedPage {
    ptr: *mut u8,
    size: usize,
    layout: Layout,
}

impl AlignedPage {
    /// Allocate a zero-filled buffer of `size` bytes aligned to
    /// `max(size, align_of::<usize>())`, per spec (alignment >= max(P,
    /// pointer-size)).
    pub fn new(size: usize) -> io::Result<Self> {
        let alignment = size.max(std::mem::size_of::<usize>());
        let layout = Layout::from_size_align(size, alignment)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: layout is non-zero-sized (page sizes are always > 0) and
        // alloc_zeroed returning null is checked below.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "page allocation failed"));
        }

        Ok(Self { ptr, size, layout })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for `size` bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for `size` bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

impl Drop for AlignedPage {
    fn drop(&mut self) {
        // SAFETY: ptr/layout were produced together by `alloc_zeroed` above
        // and never mutated afterward.
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

// SAFETY: AlignedPage owns its buffer exclusively; no aliasing across
// threads is possible without synchronization the caller already provides
// (the cache's single coarse lock).
unsafe impl Send for AlignedPage {}
unsafe impl Sync for AlignedPage {}

/// Open (creating if absent, mode 0644) the backing file for a cache
/// handle. When `direct` is set, attempts an unbuffered open first and
/// transparently falls back to a buffered open if the filesystem rejects
/// it (e.g. tmpfs without `O_DIRECT` support).
pub fn open_backing_file(path: &Path, direct: bool) -> io::Result<(File, u64)> {
    let file = if direct {
        open_direct(path).or_else(|_| open_buffered(path))?
    } else {
        open_buffered(path)?
    };

    let size = file.metadata()?.len();
    Ok((file, size))
}

fn open_buffered(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true);
    #[cfg(unix)]
    opts.mode(0o644);
    opts.open(path)
}

#[cfg(unix)]
fn open_direct(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).mode(0o644);
    opts.custom_flags(libc::O_DIRECT);
    opts.open(path)
}

#[cfg(windows)]
fn open_direct(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    // FILE_FLAG_NO_BUFFERING
    const FILE_FLAG_NO_BUFFERING: u32 = 0x2000_0000;
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true);
    opts.custom_flags(FILE_FLAG_NO_BUFFERING);
    opts.open(path)
}

#[cfg(not(any(unix, windows)))]
fn open_direct(path: &Path) -> io::Result<File> {
    open_buffered(path)
}

/// Read one block at `block * buf.len()` into `buf`. A short read
/// (including zero, e.g. at or past physical EOF) is returned as-is — the
/// caller is expected to have zero-filled `buf` beforehand and to bound
/// what it copies out by the file's logical size.
pub fn read_block(file: &mut File, block: u64, buf: &mut [u8]) -> io::Result<usize> {
    let offset = block * buf.len() as u64;
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

/// Write one full block of `buf.len()` bytes at `block * buf.len()`.
pub fn write_block(file: &mut File, block: u64, buf: &[u8]) -> io::Result<()> {
    let offset = block * buf.len() as u64;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}
