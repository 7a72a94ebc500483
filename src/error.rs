use thiserror::Error;

/// Error kinds returned by the virtual page cache's public API.
///
/// Variants line up with the error kinds named by the cache's invariants:
/// misuse (`InvalidArgument`, `BadHandle`), resource exhaustion
/// (`TooManyOpenFiles`, `OutOfMemory`), lifecycle misuse
/// (`AlreadyInitialized`, `Uninitialized`), and anything the backing store
/// reports (`Io`).
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache is already initialized")]
    AlreadyInitialized,

    #[error("cache has not been initialized")]
    Uninitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad handle")]
    BadHandle,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
