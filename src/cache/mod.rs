//! Trendline cache layer
//!
//! A small key-value abstraction ([`KvCache`]) with two backends:
//!
//! - **memory**: in-process LRU with TTLs and an ordered key index for scans
//! - **redis**: a shared Redis instance through a connection manager
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "memory"          # or "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! namespace = "trendline:recommendation"
//! scan_page_size = 100
//! memory_capacity = 10000
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod memory;
mod redis;
mod store;

pub use config::CacheConfig;
pub use keys::CacheNamespace;
pub use memory::MemoryCache;
pub use self::redis::RedisCache;
pub use store::{CacheError, KvCache, ScanCursor, ScanPage};
