//! A virtual page cache: a user-space, write-back page cache sitting
//! between application code and a block-addressable backing file,
//! exposing a POSIX-shaped `open`/`close`/`read`/`write`/`lseek`/`fsync`
//! surface over a fixed-size pool of page frames reclaimed by
//! Second-Chance (CLOCK) when the pool fills up.

pub mod api;
pub mod buffer;
pub mod common;
pub mod error;
pub mod handle;
pub mod stats;
pub mod storage;

pub use api::{CacheConfig, VirtualPageCache, Whence};
pub use error::{CacheError, Result};
pub use stats::CacheStats;
