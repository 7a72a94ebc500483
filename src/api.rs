//! The public file API: `open`/`close`/`read`/`write`/`lseek`/`fsync`/
//! stats, all implemented over one coarse lock guarding the engine, the
//! file-handle table, and the direct-I/O flag together.
//!
//! The lock is held across blocking I/O (a block read on miss, a block
//! write on eviction flush, `fsync`) — deliberately: this cache trades
//! multi-threaded scalability for a single, easy-to-reason-about
//! invariant surface over a partitioned, higher-throughput design.

use std::path::Path;

use parking_lot::Mutex;

use crate::buffer::CacheEngine;
use crate::common::Handle;
use crate::error::{CacheError, Result};
use crate::handle::{FileTable, DEFAULT_MAX_OPEN_FILES};
use crate::stats::CacheStats;
use crate::storage::open_backing_file;

/// Defaults substituted by `init`/lazy-`open` when the caller passes 0.
pub const DEFAULT_CACHE_SIZE_PAGES: usize = 64;
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Reference point for `lseek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Cache-wide configuration, the only configuration surface this crate
/// has — no environment variables, no config files.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub cache_size_pages: usize,
    pub page_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_size_pages: DEFAULT_CACHE_SIZE_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

struct Inner {
    engine: CacheEngine,
    files: FileTable,
    direct_mode: bool,
}

struct State {
    inner: Option<Inner>,
}

/// A virtual page cache instance. Owned by the caller — not a hidden
/// process-wide global — so tests (and callers who want more than one
/// cache) can create as many as they like. Every public method takes
/// `&self`; internal mutability lives behind one `parking_lot::Mutex`.
pub struct VirtualPageCache {
    state: Mutex<State>,
}

impl Default for VirtualPageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPageCache {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { inner: None }) }
    }

    /// Initializes the cache with `cache_size_pages` frames of
    /// `page_size` bytes each. `0` substitutes the documented defaults.
    /// Fails `AlreadyInitialized` if already initialized; `InvalidArgument`
    /// if `page_size` isn't a multiple of 512.
    pub fn init(&self, cache_size_pages: usize, page_size: usize) -> Result<()> {
        let mut state = self.state.lock();
        Self::init_locked(&mut state, cache_size_pages, page_size)
    }

    pub fn init_with_config(&self, config: CacheConfig) -> Result<()> {
        self.init(config.cache_size_pages, config.page_size)
    }

    fn init_locked(state: &mut State, cache_size_pages: usize, page_size: usize) -> Result<()> {
        if state.inner.is_some() {
            return Err(CacheError::AlreadyInitialized);
        }

        let cache_size_pages = if cache_size_pages == 0 { DEFAULT_CACHE_SIZE_PAGES } else { cache_size_pages };
        let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };

        if page_size % 512 != 0 {
            return Err(CacheError::InvalidArgument(
                "page_size must be a multiple of 512".to_string(),
            ));
        }

        let engine = CacheEngine::new(cache_size_pages, page_size)
            .map_err(|e| CacheError::OutOfMemory(e.to_string()))?;
        let files = FileTable::new(DEFAULT_MAX_OPEN_FILES);

        log::debug!("cache initialized: {cache_size_pages} pages of {page_size} bytes");
        state.inner = Some(Inner { engine, files, direct_mode: true });
        Ok(())
    }

    /// Idempotent. Flushes and closes every in-use file slot, then frees
    /// every frame buffer. Always releases everything, even if a flush
    /// along the way fails.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        let Some(mut inner) = state.inner.take() else {
            return;
        };

        for handle in inner.files.in_use_handles() {
            if let Err(e) = inner.engine.flush_file(handle, &mut inner.files) {
                log::warn!("destroy: flush of handle {handle} failed: {e}");
            }
            let _ = inner.files.close(handle);
        }
        log::debug!("cache destroyed");
    }

    /// Records the direct-I/O flag consulted by subsequent `open` calls.
    /// A no-op before the first `init`/lazy-init, matching the flag's
    /// lifetime being tied to an initialized cache instance.
    pub fn set_direct_mode(&self, enable: bool) {
        let mut state = self.state.lock();
        if let Some(inner) = state.inner.as_mut() {
            inner.direct_mode = enable;
        }
    }

    /// Opens (creating if absent) the backing file at `path`, lazily
    /// initializing the cache with defaults if `init` hasn't been called.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Handle> {
        let mut state = self.state.lock();
        if state.inner.is_none() {
            Self::init_locked(&mut state, 0, 0)?;
        }
        let inner = state.inner.as_mut().expect("just initialized");

        let handle = inner.files.find_free_slot().ok_or(CacheError::TooManyOpenFiles)?;
        let (file, size) = open_backing_file(path.as_ref(), inner.direct_mode)?;
        inner.files.open(handle, file, size, path.as_ref().to_path_buf());

        log::debug!("opened handle={handle} path={:?} size={size}", path.as_ref());
        Ok(handle)
    }

    /// Flushes and invalidates the handle's frames, then closes the
    /// backing file and frees the slot. The slot is released even if the
    /// flush fails — the error is still surfaced to the caller.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;

        if !inner.files.is_open(handle) {
            return Err(CacheError::BadHandle);
        }

        let flush_result = inner.engine.flush_file(handle, &mut inner.files);
        inner.engine.invalidate_file(handle);
        inner.files.close(handle);

        if let Err(ref e) = flush_result {
            log::warn!("close: flush of handle {handle} failed: {e}");
        }
        flush_result
    }

    /// Repositions the handle's logical offset. Negative results fail
    /// `InvalidArgument`. Seeking past end of file is permitted and does
    /// not extend it.
    pub fn lseek(&self, handle: Handle, offset: i64, whence: Whence) -> Result<u64> {
        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;

        if !inner.files.is_open(handle) {
            return Err(CacheError::BadHandle);
        }

        let base: i128 = match whence {
            Whence::Start => 0,
            Whence::Current => inner.files.offset(handle) as i128,
            Whence::End => inner.files.size(handle) as i128,
        };

        let new_offset = base + offset as i128;
        if new_offset < 0 {
            return Err(CacheError::InvalidArgument("resulting offset is negative".to_string()));
        }

        let new_offset = new_offset as u64;
        inner.files.set_offset(handle, new_offset);
        Ok(new_offset)
    }

    /// Flushes every dirty frame of `handle` through the block-I/O
    /// primitive, then forces the backing file durable. Any error from
    /// either step surfaces, leaving failed frames dirty for a retry.
    pub fn fsync(&self, handle: Handle) -> Result<()> {
        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;

        if !inner.files.is_open(handle) {
            return Err(CacheError::BadHandle);
        }

        inner.engine.flush_file(handle, &mut inner.files)?;
        let file = inner.files.file_mut(handle).expect("slot is open");
        file.sync_all()?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes starting at the handle's current
    /// offset, advancing it. Returns the number of bytes actually read —
    /// short reads at EOF are normal, not errors. A mid-read failure with
    /// partial progress returns the partial count instead of an error.
    pub fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;
        if !inner.files.is_open(handle) {
            return Err(CacheError::BadHandle);
        }

        let page_size = inner.engine.page_size() as u64;
        let mut bytes_read = 0usize;

        while bytes_read < buf.len() {
            let offset = inner.files.offset(handle);
            let size = inner.files.size(handle);
            if offset >= size {
                break;
            }

            let block = offset / page_size;
            let in_block = (offset % page_size) as usize;

            let idx = match inner.engine.get(handle, block, true, &mut inner.files) {
                Ok(idx) => idx,
                Err(e) => {
                    return if bytes_read > 0 { Ok(bytes_read) } else { Err(e) };
                }
            };

            let available_in_page = page_size as usize - in_block;
            let remaining = buf.len() - bytes_read;
            let remaining_in_file = (size - offset) as usize;
            let to_copy = available_in_page.min(remaining).min(remaining_in_file);
            if to_copy == 0 {
                break;
            }

            let data = inner.engine.frame_data(idx);
            buf[bytes_read..bytes_read + to_copy].copy_from_slice(&data[in_block..in_block + to_copy]);

            bytes_read += to_copy;
            inner.files.set_offset(handle, offset + to_copy as u64);
        }

        Ok(bytes_read)
    }

    /// Writes `buf` starting at the handle's current offset, advancing it
    /// and extending the logical file size on write-past-end. A
    /// partial-block write only loads the target page first when it must
    /// preserve bytes the write doesn't fully overwrite.
    pub fn write(&self, handle: Handle, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;
        if !inner.files.is_open(handle) {
            return Err(CacheError::BadHandle);
        }

        let page_size = inner.engine.page_size() as u64;
        let mut bytes_written = 0usize;

        while bytes_written < buf.len() {
            let offset = inner.files.offset(handle);
            let size = inner.files.size(handle);

            let block = offset / page_size;
            let in_block = (offset % page_size) as usize;
            let remaining = buf.len() - bytes_written;

            let need_load = in_block != 0 || (remaining < page_size as usize && offset < size);

            let idx = match inner.engine.get(handle, block, need_load, &mut inner.files) {
                Ok(idx) => idx,
                Err(e) => {
                    return if bytes_written > 0 { Ok(bytes_written) } else { Err(e) };
                }
            };

            let available_in_page = page_size as usize - in_block;
            let to_copy = available_in_page.min(remaining);

            let data = inner.engine.frame_data_mut(idx);
            data[in_block..in_block + to_copy]
                .copy_from_slice(&buf[bytes_written..bytes_written + to_copy]);
            inner.engine.mark_dirty(idx);

            bytes_written += to_copy;
            let new_offset = offset + to_copy as u64;
            inner.files.set_offset(handle, new_offset);
            inner.files.set_size_if_larger(handle, new_offset);
        }

        Ok(bytes_written)
    }

    /// Atomic snapshot of the cache's monotonic counters.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let mut state = self.state.lock();
        let inner = state.inner.as_mut().ok_or(CacheError::Uninitialized)?;
        Ok(CacheStats {
            cache_hits: inner.engine.cache_hits,
            cache_misses: inner.engine.cache_misses,
            pages_evicted: inner.engine.pages_evicted,
            pages_written_back: inner.engine.pages_written_back,
            current_pages_used: inner.engine.pages_used() as u64,
        })
    }

    /// Resets the hit/miss/eviction/write-back counters. A no-op before
    /// the cache is initialized.
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        if let Some(inner) = state.inner.as_mut() {
            inner.engine.cache_hits = 0;
            inner.engine.cache_misses = 0;
            inner.engine.pages_evicted = 0;
            inner.engine.pages_written_back = 0;
        }
    }
}
