//! The block-I/O primitive the cache engine calls on a miss or a flush.

mod block_io;

pub use block_io::{open_backing_file, read_block, write_block, AlignedPage};
