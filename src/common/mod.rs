//! Shared types used across the cache's modules.

/// A file handle: a small non-negative integer indexing into the
/// file-handle table. Stable for a slot's lifetime, reused after `close`.
pub type Handle = u32;

/// A logical block number within a file (`byte_offset / page_size`).
pub type BlockNum = u64;

/// Index of a frame within the frame arena.
pub type FrameIdx = u32;

/// Sentinel meaning "no frame" / "no next link" in index-based lists.
pub const NONE: FrameIdx = u32::MAX;
