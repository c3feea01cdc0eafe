//! # Bloomd - Concurrent Bloom Filter Management
//!
//! Bloomd maintains a collection of named, persistent bloom filters behind a
//! single concurrent manager. Lookups run against immutable namespace
//! snapshots so they never block filter creation or removal, while a
//! background vacuum reclaims retired snapshots once every registered worker
//! has moved past them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bloomd::{Config, FilterManager};
//!
//! let mut config = Config::default();
//! config.data_dir = "/var/lib/bloomd".into();
//!
//! let manager = FilterManager::open(config)?;
//! manager.create("events", None)?;
//!
//! let keys: [&[u8]; 2] = [b"alpha", b"beta"];
//! let mut results = [false; 2];
//! manager.set_keys("events", &keys, &mut results)?;
//!
//! let probes: [&[u8]; 2] = [b"alpha", b"gamma"];
//! manager.check_keys("events", &probes, &mut results)?;
//! assert_eq!(results, [true, false]);
//! # Ok::<(), bloomd::FilterError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Filter Layer**: scalable bloom filters with crc-checked on-disk
//!   snapshots that can be faulted out of memory ("proxied") and back in
//! - **Manager Layer**: versioned namespace snapshots, two-level locking
//!   (one writer over the namespace, reader/writer per filter)
//! - **Vacuum**: a background thread that destroys snapshots older than
//!   every client's checkpointed version

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod manager;

// Re-export the main public API
pub use crate::config::{Config, FilterConfig};
pub use crate::error::{FilterError, Result};
pub use crate::filter::{CounterSnapshot, Filter};
pub use crate::manager::FilterManager;
