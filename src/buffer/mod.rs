//! The page-frame pool: the arena, its index, its eviction queue, and the
//! engine that ties them together.

mod engine;
mod frame;
mod index;
mod queue;

pub use engine::{BackingFiles, CacheEngine};
pub use frame::Owner;
pub use index::HASH_BUCKETS;
