//! In-process KPI cache: a TTL map, key derivation and a typed cache-aside
//! wrapper.

pub mod aside;
pub mod key;
pub mod ttl;

pub use aside::CacheAside;
pub use key::{CacheParams, derive_key};
pub use ttl::{CacheStats, TtlCache};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A call parameter could not be encoded into a cache key.
    #[error("cache key parameter `{param}` is not serializable: {reason}")]
    KeySerialization { param: String, reason: String },
}
