//! The cache engine: lookup, insertion, eviction, and write-back over the
//! frame arena, the hash index, and the eviction queue.
//!
//! All methods assume the caller already holds the cache's single lock
//! (see `crate::api`); none of them synchronize internally.

use std::fs::File;

use crate::buffer::frame::{Frame, Owner};
use crate::buffer::index::HashIndex;
use crate::buffer::queue::EvictionQueue;
use crate::common::{BlockNum, FrameIdx, Handle, NONE};
use crate::storage::{read_block, write_block};

/// Resolves a handle to the backing file the engine should read from or
/// write back to. `api::FileTable` implements this directly; the
/// indirection keeps the engine free of file-table layout decisions and
/// lets tests wire up a bare in-memory map of handle to `File`.
pub trait BackingFiles {
    fn file_mut(&mut self, handle: Handle) -> Option<&mut File>;
}

pub struct CacheEngine {
    frames: Vec<Frame>,
    free_head: FrameIdx,
    queue: EvictionQueue,
    index: HashIndex,
    page_size: usize,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub pages_evicted: u64,
    pub pages_written_back: u64,
}

impl CacheEngine {
    /// Allocate `num_frames` page-sized frames. Bails out (dropping any
    /// frames already pushed, which frees their buffers) if an
    /// allocation fails partway through.
    pub fn new(num_frames: usize, page_size: usize) -> std::io::Result<Self> {
        let mut frames = Vec::with_capacity(num_frames);
        for _ in 0..num_frames {
            frames.push(Frame::new(page_size)?);
        }

        let mut free_head = NONE;
        for i in (0..frames.len()).rev() {
            frames[i].link_next = free_head;
            free_head = i as FrameIdx;
        }

        Ok(Self {
            frames,
            free_head,
            queue: EvictionQueue::new(),
            index: HashIndex::new(),
            page_size,
            cache_hits: 0,
            cache_misses: 0,
            pages_evicted: 0,
            pages_written_back: 0,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages_used(&self) -> usize {
        self.queue.len()
    }

    pub fn frame_data(&self, idx: FrameIdx) -> &[u8] {
        self.frames[idx as usize].data.as_slice()
    }

    pub fn frame_data_mut(&mut self, idx: FrameIdx) -> &mut [u8] {
        self.frames[idx as usize].data.as_mut_slice()
    }

    pub fn mark_dirty(&mut self, idx: FrameIdx) {
        let f = &mut self.frames[idx as usize];
        f.dirty = true;
        f.reference_bit = true;
    }

    /// §4.3 `find`: look up `(handle, block)`. On hit, sets the reference
    /// bit and counts a hit.
    pub fn find(&mut self, handle: Handle, block: BlockNum) -> Option<FrameIdx> {
        let found = self.index.lookup(&self.frames, handle, block);
        if let Some(idx) = found {
            self.frames[idx as usize].reference_bit = true;
            self.cache_hits += 1;
        }
        found
    }

    /// §4.3 `get`: find-or-load a frame for `(handle, block)`.
    pub fn get(
        &mut self,
        handle: Handle,
        block: BlockNum,
        load: bool,
        backing: &mut dyn BackingFiles,
    ) -> crate::error::Result<FrameIdx> {
        if let Some(idx) = self.find(handle, block) {
            return Ok(idx);
        }
        self.cache_misses += 1;

        let idx = self.evict(backing)?;

        self.frames[idx as usize].owner = Some(Owner { handle, block });
        self.frames[idx as usize].valid = true;
        self.frames[idx as usize].dirty = false;
        self.frames[idx as usize].reference_bit = true;

        self.index.insert(&mut self.frames, idx);
        self.queue.push_back(&mut self.frames, idx);

        if load {
            self.frames[idx as usize].data.zero();
            match backing.file_mut(handle) {
                Some(file) => {
                    // A short (or zero) read past physical EOF is
                    // tolerated: the buffer is already zero-filled and
                    // the public API bounds every copy out of it by the
                    // file's cached logical size.
                    let _ = read_block(file, block, self.frames[idx as usize].data.as_mut_slice());
                }
                None => {
                    self.roll_back_insertion(idx);
                    return Err(crate::error::CacheError::BadHandle);
                }
            }
        } else {
            self.frames[idx as usize].data.zero();
        }

        Ok(idx)
    }

    fn roll_back_insertion(&mut self, idx: FrameIdx) {
        self.index.remove(&mut self.frames, idx);
        self.queue.remove(&mut self.frames, idx);
        self.frames[idx as usize].reset();
        self.frames[idx as usize].link_next = self.free_head;
        self.free_head = idx;
    }

    /// §4.3 `evict`: produce a free frame, flushing dirty victims and
    /// sweeping the eviction queue with Second-Chance as needed.
    pub fn evict(&mut self, backing: &mut dyn BackingFiles) -> crate::error::Result<FrameIdx> {
        if self.free_head != NONE {
            let idx = self.free_head;
            self.free_head = self.frames[idx as usize].link_next;
            self.frames[idx as usize].link_next = NONE;
            return Ok(idx);
        }

        // Bounded to 2 full passes: every pass through a referenced frame
        // clears its bit, so a victim is found within `2 * count` steps
        // absent write errors (spec §4.3 termination argument).
        let sweep_limit = self.queue.len().saturating_mul(2).max(1);
        for _ in 0..sweep_limit {
            let idx = match self.queue.pop_front(&mut self.frames) {
                Some(idx) => idx,
                None => break,
            };

            if self.frames[idx as usize].reference_bit {
                self.frames[idx as usize].reference_bit = false;
                self.queue.push_back(&mut self.frames, idx);
                continue;
            }

            if self.frames[idx as usize].dirty {
                if self.flush(idx, backing).is_err() {
                    log::warn!("write-back failed during eviction; re-queuing frame {idx}");
                    self.queue.push_back(&mut self.frames, idx);
                    continue;
                }
            }

            self.index.remove(&mut self.frames, idx);
            self.frames[idx as usize].reset();
            self.pages_evicted += 1;
            return Ok(idx);
        }

        log::warn!("cache exhausted: full Second-Chance sweep made no progress");
        Err(crate::error::CacheError::OutOfMemory(
            "no evictable frame after a full sweep".to_string(),
        ))
    }

    /// §4.3 `flush`: write back a frame if valid and dirty.
    pub fn flush(&mut self, idx: FrameIdx, backing: &mut dyn BackingFiles) -> crate::error::Result<()> {
        let (valid, dirty) = {
            let f = &self.frames[idx as usize];
            (f.valid, f.dirty)
        };
        if !valid || !dirty {
            return Ok(());
        }

        let owner = self.frames[idx as usize].owner.expect("valid frame has an owner");
        let file = backing
            .file_mut(owner.handle)
            .ok_or(crate::error::CacheError::BadHandle)?;
        write_block(file, owner.block, self.frames[idx as usize].data.as_slice())?;

        self.frames[idx as usize].dirty = false;
        self.pages_written_back += 1;
        Ok(())
    }

    /// §4.3 `flush_file`: flush every valid, dirty frame owned by
    /// `handle`. Continues past individual failures, returning the first
    /// error encountered (if any) once all frames have been attempted.
    pub fn flush_file(
        &mut self,
        handle: Handle,
        backing: &mut dyn BackingFiles,
    ) -> crate::error::Result<()> {
        let mut first_err = None;
        let indices: Vec<FrameIdx> = (0..self.frames.len() as FrameIdx)
            .filter(|&i| {
                let f = &self.frames[i as usize];
                f.valid && f.dirty && f.owner.map(|o| o.handle) == Some(handle)
            })
            .collect();

        for idx in indices {
            if let Err(e) = self.flush(idx, backing) {
                log::warn!("flush of frame {idx} for handle {handle} failed: {e}");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// §4.3 `invalidate_file`: drop every frame owned by `handle` without
    /// flushing. Callers who need durability must flush first.
    pub fn invalidate_file(&mut self, handle: Handle) {
        let indices: Vec<FrameIdx> = (0..self.frames.len() as FrameIdx)
            .filter(|&i| {
                let f = &self.frames[i as usize];
                f.valid && f.owner.map(|o| o.handle) == Some(handle)
            })
            .collect();

        for idx in indices {
            self.index.remove(&mut self.frames, idx);
            self.queue.remove(&mut self.frames, idx);
            self.frames[idx as usize].reset();
            self.frames[idx as usize].link_next = self.free_head;
            self.free_head = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    struct TestFiles(HashMap<Handle, File>);
    impl BackingFiles for TestFiles {
        fn file_mut(&mut self, handle: Handle) -> Option<&mut File> {
            self.0.get_mut(&handle)
        }
    }

    fn test_files(handles: &[Handle]) -> TestFiles {
        let mut map = HashMap::new();
        for &h in handles {
            let tmp = NamedTempFile::new().unwrap();
            map.insert(h, tmp.reopen().unwrap());
        }
        TestFiles(map)
    }

    #[test]
    fn miss_then_hit() {
        let mut engine = CacheEngine::new(4, 64).unwrap();
        let mut backing = test_files(&[1]);

        assert!(engine.find(1, 0).is_none());
        let idx = engine.get(1, 0, false, &mut backing).unwrap();
        assert_eq!(engine.cache_misses, 1);

        let idx2 = engine.get(1, 0, false, &mut backing).unwrap();
        assert_eq!(idx, idx2);
        assert_eq!(engine.cache_hits, 1);
    }

    #[test]
    fn eviction_after_capacity_exhausted() {
        let mut engine = CacheEngine::new(2, 64).unwrap();
        let mut backing = test_files(&[1]);

        engine.get(1, 0, false, &mut backing).unwrap();
        engine.get(1, 1, false, &mut backing).unwrap();
        engine.get(1, 2, false, &mut backing).unwrap();
        assert!(engine.pages_evicted >= 1);
        assert_eq!(engine.pages_used(), 2);
    }

    #[test]
    fn second_chance_protects_recently_referenced() {
        let mut engine = CacheEngine::new(2, 64).unwrap();
        let mut backing = test_files(&[1]);

        engine.get(1, 0, false, &mut backing).unwrap();
        engine.get(1, 1, false, &mut backing).unwrap();
        engine.find(1, 0);
        let evicted_before = engine.pages_evicted;
        engine.get(1, 2, false, &mut backing).unwrap();
        assert!(engine.pages_evicted > evicted_before);
    }

    #[test]
    fn flush_writes_dirty_frame_and_clears_dirty() {
        let mut engine = CacheEngine::new(1, 8).unwrap();
        let mut backing = test_files(&[1]);

        let idx = engine.get(1, 0, false, &mut backing).unwrap();
        engine.frame_data_mut(idx).copy_from_slice(b"12345678");
        engine.mark_dirty(idx);

        engine.flush(idx, &mut backing).unwrap();
        assert_eq!(engine.pages_written_back, 1);

        let mut readback = [0u8; 8];
        let file = backing.file_mut(1).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_exact(&mut readback).unwrap();
        assert_eq!(&readback, b"12345678");
    }

    #[test]
    fn eviction_flushes_dirty_victim_before_reuse() {
        let mut engine = CacheEngine::new(1, 8).unwrap();
        let mut backing = test_files(&[1]);

        let idx = engine.get(1, 0, false, &mut backing).unwrap();
        engine.frame_data_mut(idx).copy_from_slice(b"AAAAAAAA");
        engine.mark_dirty(idx);

        // With one frame total, the next distinct block forces a sweep:
        // pass 1 clears the insertion-time reference bit and re-queues;
        // pass 2 finds it unreferenced, dirty, and flushes it.
        engine.get(1, 1, false, &mut backing).unwrap();
        assert_eq!(engine.pages_written_back, 1);

        let mut readback = [0u8; 8];
        let file = backing.file_mut(1).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_exact(&mut readback).unwrap();
        assert_eq!(&readback, b"AAAAAAAA");
    }

    #[test]
    fn invalidate_file_drops_its_frames() {
        let mut engine = CacheEngine::new(2, 8).unwrap();
        let mut backing = test_files(&[1]);

        engine.get(1, 0, false, &mut backing).unwrap();
        engine.invalidate_file(1);
        assert!(engine.find(1, 0).is_none());
        assert_eq!(engine.pages_used(), 0);
    }

    #[test]
    fn flush_is_noop_for_clean_frame() {
        let mut engine = CacheEngine::new(1, 8).unwrap();
        let mut backing = test_files(&[1]);
        let idx = engine.get(1, 0, false, &mut backing).unwrap();
        backing.file_mut(1).unwrap().write_all(b"untouched").unwrap();
        engine.flush(idx, &mut backing).unwrap();
        assert_eq!(engine.pages_written_back, 0);
    }
}
