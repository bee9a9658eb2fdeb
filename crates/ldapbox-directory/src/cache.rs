//! Name-service cache invalidation.

use std::sync::Arc;
use tracing::debug;

use crate::backend::{CacheDatabase, Host};
use crate::Result;

/// Drops the cached `passwd` and `group` lookups so the OS sees directory changes at once.
#[derive(Clone)]
pub struct CacheInvalidator {
    host: Arc<dyn Host>,
}

impl CacheInvalidator {
    /// Creates an invalidator over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Invalidates every cache segment, `passwd` first.
    ///
    /// # Errors
    ///
    /// Propagates the first failed invalidation.
    pub async fn flush(&self) -> Result<()> {
        for database in CacheDatabase::ALL {
            debug!(database = database.as_str(), "invalidating name-service cache");
            self.host.invalidate_cache(database).await?;
        }
        Ok(())
    }
}
