// bufpool - self-calibrating byte buffer pool
// Buffers sized from observed demand, recycled through a size-classed slab store

#![warn(rust_2018_idioms)]

//! ```
//! use bufpool::AdaptivePool;
//! use std::io::Write;
//!
//! let pool = AdaptivePool::default();
//!
//! let mut buf = pool.get();
//! buf.write_all(b"{\"id\":42}").unwrap();
//! assert_eq!(buf.as_str().unwrap(), "{\"id\":42}");
//! pool.put(buf);
//! ```

pub mod buffer;
pub mod config;
pub mod pool;
pub mod slab;

// Re-exports for convenience
pub use buffer::Buffer;
pub use crate::config::{BufpoolConfig, PoolConfig, StoreConfig};
pub use pool::{AdaptivePool, Calibration, PoolRegistry, PoolStats};
pub use slab::{SlabStore, StoreStats};

/// bufpool error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Invalid UTF-8: {0}")]
        Utf8(#[from] std::str::Utf8Error),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
