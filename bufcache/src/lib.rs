//! bufcache: size-classed cache of reusable vectors.
//!
//! Buffers are bucketed into classes whose nominal capacities grow
//! geometrically (`min_size`, `min_size * factor`, ... up to `max_size`).
//! Allocation picks the smallest class that fits; freeing files a buffer
//! under the largest class it can fully serve. Requests beyond the largest
//! class bypass the cache.
//!
//! There is no global instance: construct a [`SizeClassPool`] and share it.

mod class;
mod pool;

pub use pool::{SizeClassConfig, SizeClassError, SizeClassPool};
