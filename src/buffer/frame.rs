//! A single page frame: one of the cache's `C` fixed buffer slots.

use crate::common::{BlockNum, FrameIdx, Handle, NONE};
use crate::storage::AlignedPage;

/// What a frame currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub handle: Handle,
    pub block: BlockNum,
}

/// One cache frame.
///
/// `link_next` serves double duty as either the frame's hash-bucket chain
/// link (when resident and indexed) or its free-list link (when free) —
/// the two uses never overlap, since a frame is always in exactly one of
/// those states.
pub struct Frame {
    pub owner: Option<Owner>,
    pub data: AlignedPage,
    pub valid: bool,
    pub dirty: bool,
    pub reference_bit: bool,

    /// Eviction-queue links, valid only while resident.
    pub queue_prev: FrameIdx,
    pub queue_next: FrameIdx,

    /// Hash-bucket chain link (resident) or free-list link (free).
    pub link_next: FrameIdx,
}

impl Frame {
    pub fn new(page_size: usize) -> std::io::Result<Self> {
        Ok(Self {
            owner: None,
            data: AlignedPage::new(page_size)?,
            valid: false,
            dirty: false,
            reference_bit: false,
            queue_prev: NONE,
            queue_next: NONE,
            link_next: NONE,
        })
    }

    /// Reset a frame to its free state. Does not touch `link_next` — the
    /// caller threads it onto the free list.
    pub fn reset(&mut self) {
        self.owner = None;
        self.valid = false;
        self.dirty = false;
        self.reference_bit = false;
        self.queue_prev = NONE;
        self.queue_next = NONE;
    }
}
