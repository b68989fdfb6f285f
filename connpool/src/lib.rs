//! connpool: bounded permission pool for expensive, interchangeable resources.
//!
//! A [`PermissionPool`] caps how many [`Permission`]s are checked out at once,
//! recycles released capacity through a bounded idle cache, and parks callers
//! that arrive while the pool is saturated until capacity is handed to them
//! or their wait times out.

mod config;
mod error;
mod permission;
mod pool;
pub mod telemetry;

pub use config::PoolConfig;
pub use error::AcquireError;
pub use permission::{GRANTED, Permission, PermissionId};
pub use pool::{PermissionPool, PoolStats, PooledPermission, ReleaseOutcome};
pub use tokio_util::sync::CancellationToken;
