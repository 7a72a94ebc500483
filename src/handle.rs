//! The file-handle table: a fixed array of open-file slots. The index
//! into this array is the handle callers use for every other operation.

use std::fs::File;
use std::path::PathBuf;

use crate::buffer::BackingFiles;
use crate::common::Handle;

/// Default capacity of the file-handle table.
pub const DEFAULT_MAX_OPEN_FILES: usize = 256;

struct FileSlot {
    in_use: bool,
    file: Option<File>,
    file_offset: u64,
    file_size: u64,
    path: Option<PathBuf>,
}

impl FileSlot {
    fn empty() -> Self {
        Self { in_use: false, file: None, file_offset: 0, file_size: 0, path: None }
    }
}

pub struct FileTable {
    slots: Vec<FileSlot>,
}

impl FileTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, FileSlot::empty);
        Self { slots }
    }

    pub fn find_free_slot(&self) -> Option<Handle> {
        self.slots.iter().position(|s| !s.in_use).map(|i| i as Handle)
    }

    pub fn is_open(&self, handle: Handle) -> bool {
        self.slots.get(handle as usize).map(|s| s.in_use).unwrap_or(false)
    }

    /// Handles of every currently-open slot, in slot order.
    pub fn in_use_handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_use)
            .map(|(i, _)| i as Handle)
            .collect()
    }

    pub fn open(&mut self, handle: Handle, file: File, file_size: u64, path: PathBuf) {
        let slot = &mut self.slots[handle as usize];
        slot.in_use = true;
        slot.file = Some(file);
        slot.file_offset = 0;
        slot.file_size = file_size;
        slot.path = Some(path);
    }

    /// Clears a slot back to free. Returns the backing `File` so the
    /// caller can close it (dropping it is closing it, but the caller may
    /// want the `io::Result` from an explicit `sync_all`/flush first).
    pub fn close(&mut self, handle: Handle) -> Option<File> {
        let slot = &mut self.slots[handle as usize];
        slot.in_use = false;
        slot.file_offset = 0;
        slot.file_size = 0;
        slot.path = None;
        slot.file.take()
    }

    pub fn offset(&self, handle: Handle) -> u64 {
        self.slots[handle as usize].file_offset
    }

    pub fn size(&self, handle: Handle) -> u64 {
        self.slots[handle as usize].file_size
    }

    pub fn set_offset(&mut self, handle: Handle, offset: u64) {
        self.slots[handle as usize].file_offset = offset;
    }

    pub fn set_size_if_larger(&mut self, handle: Handle, offset: u64) {
        let slot = &mut self.slots[handle as usize];
        if offset > slot.file_size {
            slot.file_size = offset;
        }
    }

    pub fn file_mut(&mut self, handle: Handle) -> Option<&mut File> {
        self.slots.get_mut(handle as usize).and_then(|s| s.file.as_mut())
    }
}

impl BackingFiles for FileTable {
    fn file_mut(&mut self, handle: Handle) -> Option<&mut File> {
        FileTable::file_mut(self, handle)
    }
}
