//! Bounded pool of long-lived browser worker processes.
//!
//! A feature checks out one [`Session`] from an [`InstancePool`] and keeps it
//! across independent commands. Sessions are identified by an `(index, tag)`
//! pair and may be evicted by the pool at any time (idle timeout, shutdown),
//! so holders must [`InstancePool::retrieve`] before every use.
//!
//! Spawning and talking to the actual worker process is delegated to a
//! [`Launcher`]; [`memory::MemoryLauncher`] is an in-process stand-in.

pub mod error;
pub mod memory;
pub mod pool;
pub mod types;

pub use {
    error::BrowserError,
    pool::{InstancePool, Launcher, Renderer, Session},
    types::{ControlKey, ElementInfo, PageInfo, PoolConfig, format_elements},
};
