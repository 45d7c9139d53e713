//! # Monstera Cache
//!
//! Bounded, keyed store for shared API client instances.
//!
//! ## Features
//!
//! - **LRU eviction**: the least recently used entry is dropped when the cache is full
//! - **Statistics**: hit/miss counters and entry age snapshot via [`CacheStats`]
//! - **Age sweeping**: optional background task removing entries older than a limit
//! - **Thread safety**: all operations take `&self` and may be called from any task

pub mod cache;
pub mod error;
pub mod stats;
mod sweeper;

pub use cache::{CacheEntry, ClientCache, DEFAULT_MAX_SIZE};
pub use error::CacheError;
pub use stats::CacheStats;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
