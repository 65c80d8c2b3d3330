//! Response caching: request fingerprinting plus a two-level
//! (memory + disk) byte store.

mod disk;
mod key;
mod memory;
mod two_level;

pub use disk::DiskCache;
pub use key::{keyword_digest, CacheKeyBuilder};
pub use memory::MemoryCache;
pub use two_level::TwoLevelCache;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}
